//! MCP Tool definitions and handlers
//!
//! Tools are a closed set: each [`QrTool`] variant owns its name, schema and
//! handler, and dispatch is an exhaustive match.

use std::sync::Arc;

use serde::{de, Deserialize, Deserializer};
use serde_json::{json, Map, Value};
use validator::Validate;

use crate::config::{Config, ErrorCorrectionLevel, OutputFormat};
use crate::error::{McpError, Result, ValidationError};
use crate::mcp::types::{CallToolResult, Tool};
use crate::qr::persist::expand_home;
use crate::qr::{LogoOptions, QrGenerator, QrOptions};

/// Registered tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrTool {
    /// Generate a QR code and return it inline
    Generate,
    /// Generate a QR code and write it to disk
    Save,
}

impl QrTool {
    /// Every tool, in catalog order
    pub const ALL: [QrTool; 2] = [QrTool::Generate, QrTool::Save];

    pub fn name(&self) -> &'static str {
        match self {
            QrTool::Generate => "generate_qr",
            QrTool::Save => "save_qr",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            QrTool::Generate => "Generate a QR code from text or URL",
            QrTool::Save => "Generate a QR code and save it to a file",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// JSON Schema for the tool's arguments
    pub fn input_schema(&self) -> Value {
        match self {
            QrTool::Generate => generate_qr_schema(),
            QrTool::Save => save_qr_schema(),
        }
    }

    pub fn definition(&self) -> Tool {
        Tool {
            name: self.name().to_string(),
            description: Some(self.description().to_string()),
            input_schema: self.input_schema(),
        }
    }
}

/// Arguments shared by both tools
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QrArgs {
    /// Missing text is reported by the generator as "Text is required"
    #[serde(default)]
    pub text: String,
    pub error_correction_level: Option<ErrorCorrectionLevel>,
    pub format: Option<OutputFormat>,
    #[serde(default, deserialize_with = "whole_number")]
    #[validate(range(min = 1))]
    pub size: Option<u32>,
    #[serde(default, deserialize_with = "whole_number")]
    pub margin: Option<u32>,
    pub color: Option<String>,
    pub background_color: Option<String>,
    pub logo: Option<String>,
    #[serde(default, deserialize_with = "whole_number")]
    #[validate(range(min = 1, max = 100))]
    pub logo_size: Option<u32>,
}

impl QrArgs {
    pub fn options(&self) -> QrOptions {
        QrOptions {
            error_correction_level: self.error_correction_level,
            format: self.format,
            size: self.size,
            margin: self.margin,
            color: self.color.clone(),
            background_color: self.background_color.clone(),
            logo: self.logo.as_ref().map(|image| LogoOptions {
                image: image.clone(),
                size: self.logo_size,
            }),
        }
    }
}

/// `save_qr` arguments
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveQrArgs {
    #[serde(flatten)]
    #[validate]
    pub qr: QrArgs,
    pub output_path: Option<String>,
}

/// Tool handler
#[derive(Debug, Clone)]
pub struct ToolHandler {
    generator: QrGenerator,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(config: Arc<Config>) -> Result<Self> {
        Ok(Self {
            generator: QrGenerator::new(config)?,
        })
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        QrTool::ALL.iter().map(QrTool::definition).collect()
    }

    /// Call a tool
    pub async fn call_tool(&self, tool: QrTool, args: Value) -> Result<CallToolResult> {
        match tool {
            QrTool::Generate => self.handle_generate_qr(args).await,
            QrTool::Save => self.handle_save_qr(args).await,
        }
    }

    // ==================== Tool Handlers ====================

    async fn handle_generate_qr(&self, args: Value) -> Result<CallToolResult> {
        let args: QrArgs = parse_args(args)?;

        let result = self.generator.generate(&args.text, &args.options()).await?;

        let output = match result.format {
            OutputFormat::Terminal | OutputFormat::Base64 => CallToolResult::text(result.data.clone()),
            OutputFormat::Png | OutputFormat::Svg => {
                CallToolResult::image(result.image_base64(), result.mime_type.clone())
            }
        };

        Ok(output.with_structured(json!({
            "format": result.format,
            "size": result.size,
            "content": result.content,
            "timestamp": result.timestamp,
        })))
    }

    async fn handle_save_qr(&self, args: Value) -> Result<CallToolResult> {
        let args: SaveQrArgs = parse_args(args)?;

        let output_path = args
            .output_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ValidationError::MissingField {
                field: "outputPath".to_string(),
            })?;

        let (result, path) = self
            .generator
            .generate_and_save(&args.qr.text, expand_home(output_path), &args.qr.options())
            .await?;
        let saved = path.display().to_string();

        Ok(CallToolResult::text(format!("QR code saved to {}", saved)).with_structured(json!({
            "path": saved,
            "format": result.format,
            "size": result.size,
        })))
    }
}

fn parse_args<T>(args: Value) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    // `arguments` may be omitted entirely
    let args = if args.is_null() {
        Value::Object(Map::new())
    } else {
        args
    };

    let parsed: T = serde_json::from_value(args).map_err(|e| McpError::InvalidArguments {
        message: e.to_string(),
    })?;
    parsed.validate().map_err(|e| McpError::InvalidArguments {
        message: e.to_string(),
    })?;
    Ok(parsed)
}

/// Accept any JSON number with no fractional part (`256` or `256.0`)
fn whole_number<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(n) = Option::<f64>::deserialize(deserializer)? else {
        return Ok(None);
    };

    if n.fract() != 0.0 || n < 0.0 || n > f64::from(u32::MAX) {
        return Err(de::Error::custom(format!("expected a non-negative integer, got {}", n)));
    }
    Ok(Some(n as u32))
}

// ==================== Schema Definitions ====================

fn qr_option_properties() -> Map<String, Value> {
    let properties = json!({
        "text": {
            "type": "string",
            "description": "Text or URL to encode in the QR code"
        },
        "errorCorrectionLevel": {
            "type": "string",
            "enum": ["L", "M", "Q", "H"],
            "description": "Error correction level (L: 7%, M: 15%, Q: 25%, H: 30%)"
        },
        "format": {
            "type": "string",
            "enum": ["png", "svg", "base64", "terminal"],
            "description": "Output format"
        },
        "size": {
            "type": "integer",
            "minimum": 1,
            "description": "Size of QR code in pixels (for PNG) or viewBox (for SVG)"
        },
        "margin": {
            "type": "integer",
            "minimum": 0,
            "description": "Margin around the QR code in modules"
        },
        "color": {
            "type": "string",
            "description": "Color of the QR code (dark modules)"
        },
        "backgroundColor": {
            "type": "string",
            "description": "Background color of the QR code (light modules)"
        },
        "logo": {
            "type": "string",
            "description": "URL or base64 encoded image to add as logo in the center of the QR code"
        },
        "logoSize": {
            "type": "integer",
            "minimum": 1,
            "maximum": 100,
            "description": "Size of the logo as a percentage of the QR code size (1-100)"
        }
    });

    match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn generate_qr_schema() -> Value {
    json!({
        "type": "object",
        "properties": qr_option_properties(),
        "required": ["text"]
    })
}

fn save_qr_schema() -> Value {
    let mut properties = qr_option_properties();
    properties.insert(
        "outputPath".to_string(),
        json!({
            "type": "string",
            "description": "Path where the QR code will be saved"
        }),
    );

    json!({
        "type": "object",
        "properties": properties,
        "required": ["text", "outputPath"]
    })
}
