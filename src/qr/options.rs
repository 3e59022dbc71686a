//! QR generation options
//!
//! Caller-supplied options are merged with server defaults into an
//! immutable [`ResolvedOptions`] record before rendering.

use std::fmt;
use std::str::FromStr;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ErrorCorrectionLevel, OutputFormat};
use crate::error::{QrMcpError, Result, ValidationError};

/// Fraction of the QR edge a logo covers when no size is given
pub const DEFAULT_LOGO_RATIO: f64 = 0.2;

/// Caller-supplied options; every field falls back to a server default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_correction_level: Option<ErrorCorrectionLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,

    /// Pixels for PNG, rendered width/height for SVG
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,

    /// Quiet zone, in modules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<u32>,

    /// Dark module color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Light module color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<LogoOptions>,
}

/// Logo to place in the center of the code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoOptions {
    /// Remote URL, data URI, or local path
    pub image: String,

    /// Percentage (1-100) of the QR code's edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

impl LogoOptions {
    /// Logo edge length for a code whose bounding box is `width` x `height`
    pub fn edge_length(&self, width: f64, height: f64) -> f64 {
        let ratio = self
            .size
            .map(|pct| f64::from(pct) / 100.0)
            .unwrap_or(DEFAULT_LOGO_RATIO);
        ratio * width.min(height)
    }
}

/// Fully resolved options
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub error_correction_level: ErrorCorrectionLevel,
    pub format: OutputFormat,
    pub size: u32,
    pub margin: u32,
    pub color: HexColor,
    pub background_color: HexColor,
    pub logo: Option<LogoOptions>,
}

/// Merge caller options with the configured defaults and check limits
pub fn resolve(options: &QrOptions, config: &Config) -> Result<ResolvedOptions> {
    let size = options.size.unwrap_or(config.default_size);
    if size > config.max_qr_code_size {
        return Err(ValidationError::SizeExceedsMaximum {
            max: config.max_qr_code_size,
        }
        .into());
    }
    if size == 0 {
        return Err(invalid("size", "must be at least 1"));
    }

    if let Some(ref logo) = options.logo {
        if logo.image.trim().is_empty() {
            return Err(invalid("logo", "image reference must not be empty"));
        }
        if let Some(pct) = logo.size {
            if !(1..=100).contains(&pct) {
                return Err(invalid("logoSize", "must be between 1 and 100"));
            }
        }
    }

    let color = options.color.as_deref().unwrap_or(&config.default_color);
    let background_color = options
        .background_color
        .as_deref()
        .unwrap_or(&config.default_background_color);

    Ok(ResolvedOptions {
        error_correction_level: options
            .error_correction_level
            .unwrap_or(config.default_error_correction_level),
        format: options.format.unwrap_or(config.default_format),
        size,
        margin: options.margin.unwrap_or(config.default_margin),
        color: color.parse()?,
        background_color: background_color.parse()?,
        logo: options.logo.clone(),
    })
}

fn invalid(name: &str, message: &str) -> QrMcpError {
    ValidationError::InvalidParameter {
        name: name.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// A `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa` color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexColor(pub Rgba<u8>);

impl HexColor {
    pub fn rgba(&self) -> Rgba<u8> {
        self.0
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    /// `#rrggbb`, without alpha
    pub fn to_rgb_hex(&self) -> String {
        let [r, g, b, _] = self.0 .0;
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

impl FromStr for HexColor {
    type Err = QrMcpError;

    fn from_str(s: &str) -> Result<Self> {
        let err = || ValidationError::InvalidColor {
            value: s.to_string(),
        };

        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err().into());
        }

        let expanded: String = match hex.len() {
            3 | 4 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => hex.to_string(),
            _ => return Err(err().into()),
        };

        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| err());
        let alpha = if expanded.len() == 8 { channel(6)? } else { 255 };

        Ok(HexColor(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha])))
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alpha() == 255 {
            f.write_str(&self.to_rgb_hex())
        } else {
            write!(f, "{}{:02x}", self.to_rgb_hex(), self.alpha())
        }
    }
}
