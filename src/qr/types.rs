//! QR generation result

use serde::{Deserialize, Serialize};

use crate::config::OutputFormat;

/// One rendered QR code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrResult {
    /// PNG: base64 data URI; SVG: document text; terminal: block text;
    /// base64: base64 of the UTF-8 block text
    pub data: String,

    pub mime_type: String,

    pub format: OutputFormat,

    /// Requested size in pixels
    pub size: u32,

    /// Text encoded in the code
    pub content: String,

    /// Generation time, milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl QrResult {
    /// Payload suitable for an MCP image block: raw base64, no data URI prefix
    pub fn image_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine};

        match self.format {
            OutputFormat::Png => match self.data.split_once(";base64,") {
                Some((_, payload)) => payload.to_string(),
                None => self.data.clone(),
            },
            _ => STANDARD.encode(self.data.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(format: OutputFormat, data: &str) -> QrResult {
        QrResult {
            data: data.to_string(),
            mime_type: format.mime_type().to_string(),
            format,
            size: 300,
            content: "hello".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_png_image_payload_strips_prefix() {
        let r = result(OutputFormat::Png, "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(r.image_base64(), "iVBORw0KGgo=");
    }

    #[test]
    fn test_svg_image_payload_is_base64() {
        let r = result(OutputFormat::Svg, "<svg/>");
        assert_eq!(r.image_base64(), "PHN2Zy8+");
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(result(OutputFormat::Terminal, "x")).unwrap();
        assert_eq!(value["mimeType"], "text/plain");
        assert_eq!(value["format"], "terminal");
    }
}
