//! Configuration management for the QR MCP Server
//!
//! Handles defaults, limits, and environment variable overrides.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default listen port
pub const DEFAULT_PORT: u16 = 9999;

/// Default listen host
pub const DEFAULT_HOST: &str = "localhost";

/// QR error correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCorrectionLevel {
    /// ~7% recovery
    L,
    /// ~15% recovery
    M,
    /// ~25% recovery
    Q,
    /// ~30% recovery
    H,
}

impl ErrorCorrectionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCorrectionLevel::L => "L",
            ErrorCorrectionLevel::M => "M",
            ErrorCorrectionLevel::Q => "Q",
            ErrorCorrectionLevel::H => "H",
        }
    }
}

impl From<ErrorCorrectionLevel> for qrcode::EcLevel {
    fn from(level: ErrorCorrectionLevel) -> Self {
        match level {
            ErrorCorrectionLevel::L => qrcode::EcLevel::L,
            ErrorCorrectionLevel::M => qrcode::EcLevel::M,
            ErrorCorrectionLevel::Q => qrcode::EcLevel::Q,
            ErrorCorrectionLevel::H => qrcode::EcLevel::H,
        }
    }
}

impl FromStr for ErrorCorrectionLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(ErrorCorrectionLevel::L),
            "M" => Ok(ErrorCorrectionLevel::M),
            "Q" => Ok(ErrorCorrectionLevel::Q),
            "H" => Ok(ErrorCorrectionLevel::H),
            _ => Err(ConfigError::InvalidValue {
                var: "error correction level".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ErrorCorrectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// QR output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Svg,
    Base64,
    Terminal,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
            OutputFormat::Base64 => "base64",
            OutputFormat::Terminal => "terminal",
        }
    }

    /// MIME type of the rendered payload
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Svg => "image/svg+xml",
            OutputFormat::Base64 | OutputFormat::Terminal => "text/plain",
        }
    }

    /// File extension used when persisting this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
            OutputFormat::Base64 | OutputFormat::Terminal => "txt",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "svg" => Ok(OutputFormat::Svg),
            "base64" => Ok(OutputFormat::Base64),
            "terminal" => Ok(OutputFormat::Terminal),
            _ => Err(ConfigError::InvalidValue {
                var: "format".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the QR MCP Server
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Maximum number of tool calls executing at once
    pub max_concurrent_requests: usize,

    pub default_error_correction_level: ErrorCorrectionLevel,
    pub default_format: OutputFormat,
    pub default_size: u32,
    pub default_margin: u32,
    pub default_color: String,
    pub default_background_color: String,

    /// Upper bound for the `size` option, in pixels
    pub max_qr_code_size: u32,

    pub enable_logging: bool,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Logo hosts allowed for remote fetches (`None` allows every host)
    pub allowed_domains: Option<Vec<String>>,

    /// Logo hosts always rejected
    pub disallowed_domains: Vec<String>,

    /// Maximum logo payload, in bytes
    pub max_logo_size: u64,

    /// Deadline for a remote logo fetch
    pub logo_fetch_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_concurrent_requests: 10,
            default_error_correction_level: ErrorCorrectionLevel::M,
            default_format: OutputFormat::Png,
            default_size: 300,
            default_margin: 4,
            default_color: "#000000".to_string(),
            default_background_color: "#ffffff".to_string(),
            max_qr_code_size: 1000,
            enable_logging: true,
            log_level: "info".to_string(),
            allowed_domains: None,
            disallowed_domains: Vec::new(),
            max_logo_size: 1024 * 1024,
            logo_fetch_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Create a configuration from defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) if p > 0 => config.port = p,
                _ => tracing::warn!(
                    "Invalid port number: {}. Using default port {} instead.",
                    port,
                    DEFAULT_PORT
                ),
            }
        }

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(v) = lookup("MAX_CONCURRENT_REQUESTS") {
            config.max_concurrent_requests = parse_var("MAX_CONCURRENT_REQUESTS", &v)?;
        }
        if let Some(v) = lookup("DEFAULT_ERROR_CORRECTION_LEVEL") {
            config.default_error_correction_level = v.parse()?;
        }
        if let Some(v) = lookup("DEFAULT_FORMAT") {
            config.default_format = v.parse()?;
        }
        if let Some(v) = lookup("DEFAULT_SIZE") {
            config.default_size = parse_var("DEFAULT_SIZE", &v)?;
        }
        if let Some(v) = lookup("DEFAULT_MARGIN") {
            config.default_margin = parse_var("DEFAULT_MARGIN", &v)?;
        }
        if let Some(v) = lookup("DEFAULT_COLOR") {
            config.default_color = v;
        }
        if let Some(v) = lookup("DEFAULT_BACKGROUND_COLOR") {
            config.default_background_color = v;
        }
        if let Some(v) = lookup("MAX_QR_CODE_SIZE") {
            config.max_qr_code_size = parse_var("MAX_QR_CODE_SIZE", &v)?;
        }
        if let Some(v) = lookup("ENABLE_LOGGING") {
            config.enable_logging = v.trim() == "true";
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("ALLOWED_DOMAINS") {
            config.allowed_domains = Some(split_domains(&v));
        }
        if let Some(v) = lookup("DISALLOWED_DOMAINS") {
            config.disallowed_domains = split_domains(&v);
        }
        if let Some(v) = lookup("MAX_LOGO_SIZE") {
            config.max_logo_size = parse_var("MAX_LOGO_SIZE", &v)?;
        }
        if let Some(v) = lookup("LOGO_FETCH_TIMEOUT_SECS") {
            config.logo_fetch_timeout = Duration::from_secs(parse_var("LOGO_FETCH_TIMEOUT_SECS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the rest of the server relies on
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidConfig {
                message: "max concurrent requests must be at least 1".to_string(),
            }
            .into());
        }
        if self.default_size == 0 || self.default_size > self.max_qr_code_size {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "default size {} must be between 1 and {}",
                    self.default_size, self.max_qr_code_size
                ),
            }
            .into());
        }
        Ok(())
    }

    /// Apply the logo domain policy to a hostname.
    ///
    /// Both lists use exact hostname matches. The deny list wins over the allow list.
    pub fn is_domain_allowed(&self, host: &str) -> bool {
        if let Some(ref allowed) = self.allowed_domains {
            if !allowed.iter().any(|d| d == host) {
                return false;
            }
        }
        !self.disallowed_domains.iter().any(|d| d == host)
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> std::result::Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn split_domains(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect()
}
