//! QR MCP Server - Rust Implementation
//!
//! A Model Context Protocol (MCP) server for QR code generation.
//! Serves `generate_qr` and `save_qr` over JSON-RPC, or renders a single
//! code from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use qr_mcp_server::config::{Config, ErrorCorrectionLevel, OutputFormat};
use qr_mcp_server::error::Result;
use qr_mcp_server::mcp::server::McpServer;
use qr_mcp_server::qr::persist::expand_home;
use qr_mcp_server::qr::{LogoOptions, QrGenerator, QrOptions};

/// QR MCP Server
#[derive(Parser)]
#[command(name = "qr-mcp-server")]
#[command(author, version, about = "QR MCP Server - A Model Context Protocol server for QR codes")]
struct Cli {
    #[command(flatten)]
    defaults: DefaultOverrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Overrides for the configured defaults
#[derive(Args)]
struct DefaultOverrides {
    /// Listen host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Listen port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Default error correction level (L, M, Q, H)
    #[arg(long, global = true)]
    error_correction_level: Option<ErrorCorrectionLevel>,

    /// Default output format (png, svg, base64, terminal)
    #[arg(long, global = true)]
    format: Option<OutputFormat>,

    /// Default size in pixels
    #[arg(long, global = true)]
    size: Option<u32>,

    /// Default margin in modules
    #[arg(long, global = true)]
    margin: Option<u32>,

    /// Default dark module color
    #[arg(long, global = true)]
    color: Option<String>,

    /// Default light module color
    #[arg(long, global = true)]
    background_color: Option<String>,
}

impl DefaultOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(level) = self.error_correction_level {
            config.default_error_correction_level = level;
        }
        if let Some(format) = self.format {
            config.default_format = format;
        }
        if let Some(size) = self.size {
            config.default_size = size;
        }
        if let Some(margin) = self.margin {
            config.default_margin = margin;
        }
        if let Some(color) = self.color {
            config.default_color = color;
        }
        if let Some(background_color) = self.background_color {
            config.default_background_color = background_color;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the JSON-RPC server (default)
    Serve,

    /// Render a single QR code and exit
    Generate {
        /// Text or URL to encode
        #[arg(long)]
        text: String,

        /// Output file, or a directory to receive a content-named file
        #[arg(long)]
        output: Option<String>,

        /// Logo URL, data URI, or path
        #[arg(long)]
        logo: Option<String>,

        /// Logo size as a percentage of the QR code (1-100)
        #[arg(long)]
        logo_size: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = load_config()?;
    cli.defaults.apply(&mut config);
    config.validate()?;
    let config = Arc::new(config);

    init_logging(&config);

    match cli.command {
        Some(Commands::Generate {
            text,
            output,
            logo,
            logo_size,
        }) => {
            let options = QrOptions {
                logo: logo.map(|image| LogoOptions {
                    image,
                    size: logo_size,
                }),
                ..Default::default()
            };
            generate_once(config, &text, output, &options).await?;
        }
        Some(Commands::Serve) | None => run_server(config).await?,
    }

    Ok(())
}

/// Load configuration with a provisional subscriber so warnings about
/// rejected variables are not lost before logging is configured
fn load_config() -> Result<Config> {
    tracing::subscriber::with_default(bootstrap_subscriber(std::io::stderr), Config::from_env)
}

fn bootstrap_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_writer(writer)
        .finish()
}

fn init_logging(config: &Config) {
    let filter = if config.enable_logging {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::new("off")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_server(config: Arc<Config>) -> Result<()> {
    tracing::info!("QR MCP Server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        error_correction_level = %config.default_error_correction_level,
        format = %config.default_format,
        size = config.default_size,
        margin = config.default_margin,
        color = %config.default_color,
        background_color = %config.default_background_color,
        "Default QR options"
    );
    tracing::info!(
        max_qr_code_size = config.max_qr_code_size,
        max_logo_size = config.max_logo_size,
        max_concurrent_requests = config.max_concurrent_requests,
        "Limits"
    );

    let server = Arc::new(McpServer::new(config.clone())?);
    server.run_http(&config).await
}

async fn generate_once(
    config: Arc<Config>,
    text: &str,
    output: Option<String>,
    options: &QrOptions,
) -> Result<()> {
    let generator = QrGenerator::new(config)?;

    let Some(output) = output else {
        let result = generator.generate(text, options).await?;
        print!("{}", result.data);
        return Ok(());
    };

    let target: PathBuf = expand_home(&output);
    let (_, path) = if target.is_dir() || output.ends_with('/') {
        generator
            .generate_with_unique_filename(text, &target, options)
            .await?
    } else {
        generator.generate_and_save(text, &target, options).await?
    };

    eprintln!("QR code saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_warnings_are_logged() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = bootstrap_subscriber(move || writer.clone());

        let config = tracing::subscriber::with_default(subscriber, || {
            Config::from_lookup(|key| (key == "PORT").then(|| "not-a-port".to_string()))
        })
        .unwrap();

        assert_eq!(config.port, qr_mcp_server::config::DEFAULT_PORT);
        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("Invalid port number: not-a-port"));
    }

    #[test]
    fn test_cli_overrides_apply() {
        let cli = Cli::parse_from(["qr-mcp-server", "--port", "8080", "--format", "svg", "serve"]);
        let mut config = Config::default();
        cli.defaults.apply(&mut config);

        assert_eq!(config.port, 8080);
        assert_eq!(config.default_format, OutputFormat::Svg);
        assert!(matches!(cli.command, Some(Commands::Serve)));
    }
}
