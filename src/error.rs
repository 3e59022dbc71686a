//! Error types for the QR MCP Server
//!
//! This module defines the error hierarchy for all operations in the server.

use thiserror::Error;

/// Main error type for the QR MCP Server
#[derive(Error, Debug)]
pub enum QrMcpError {
    /// Bad or missing input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Matrix or raster generation failures
    #[error("QR code generation error: {0}")]
    Encoding(#[from] EncodingError),

    /// Remote logo fetch failures
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Render task panicked or was cancelled
    #[error("Render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Text is required")]
    TextRequired,

    #[error("QR code size exceeds maximum ({max}px)")]
    SizeExceedsMaximum { max: u32 },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Invalid color: {value} (expected #rgb, #rgba, #rrggbb or #rrggbbaa)")]
    InvalidColor { value: String },

    #[error("Domain not allowed: {host}")]
    DomainNotAllowed { host: String },

    #[error("Invalid logo: {message}")]
    InvalidLogo { message: String },

    #[error("Logo size exceeds maximum ({max} bytes)")]
    LogoTooLarge { max: u64 },
}

/// Failures from the delegated encoding libraries
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("{0}")]
    Matrix(String),

    #[error("{0}")]
    Image(String),

    #[error("{0}")]
    Svg(String),
}

/// Logo fetch errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Invalid logo URL: {url}")]
    InvalidUrl { url: String },

    #[error("Failed to fetch logo: {status}")]
    FetchFailed { status: String },

    #[error("Invalid content type: {content_type}")]
    InvalidContentType { content_type: String },

    #[error("Error fetching logo: {message}")]
    Request { message: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// Result type alias for QR MCP operations
pub type Result<T> = std::result::Result<T, QrMcpError>;

/// Decode/encode failures from the image crate surface as encoding errors
impl From<image::ImageError> for EncodingError {
    fn from(err: image::ImageError) -> Self {
        EncodingError::Image(err.to_string())
    }
}

impl From<image::ImageError> for QrMcpError {
    fn from(err: image::ImageError) -> Self {
        QrMcpError::Encoding(EncodingError::from(err))
    }
}

impl From<qrcode::types::QrError> for QrMcpError {
    fn from(err: qrcode::types::QrError) -> Self {
        QrMcpError::Encoding(EncodingError::Matrix(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValidationError::SizeExceedsMaximum { max: 1000 };
        assert!(err.to_string().contains("exceeds maximum"));
        assert!(err.to_string().contains("1000px"));
    }

    #[test]
    fn test_error_conversion() {
        let err: QrMcpError = ValidationError::TextRequired.into();
        assert!(matches!(err, QrMcpError::Validation(_)));
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn test_encoding_error_is_wrapped() {
        let err: QrMcpError = qrcode::types::QrError::DataTooLong.into();
        assert!(err.to_string().starts_with("QR code generation error: "));
    }
}
