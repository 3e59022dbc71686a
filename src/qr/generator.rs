//! QR generation pipeline
//!
//! resolve options → render → optional logo → optional save

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, OutputFormat};
use crate::error::{Result, ValidationError};
use crate::qr::logo::{add_logo_to_png, add_logo_to_svg, LogoLoader, LogoSource};
use crate::qr::options::{resolve, QrOptions};
use crate::qr::persist::{save_to_file, unique_filename};
use crate::qr::render::render;
use crate::qr::types::QrResult;

/// QR code generator bound to the server configuration
#[derive(Debug, Clone)]
pub struct QrGenerator {
    config: Arc<Config>,
    logos: LogoLoader,
}

impl QrGenerator {
    /// Create a new generator
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let logos = LogoLoader::new(config.clone())?;
        Ok(Self { config, logos })
    }

    /// Generate a QR code from text or URL
    pub async fn generate(&self, text: &str, options: &QrOptions) -> Result<QrResult> {
        if text.trim().is_empty() {
            return Err(ValidationError::TextRequired.into());
        }

        let resolved = resolve(options, &self.config)?;
        tracing::debug!(
            format = %resolved.format,
            size = resolved.size,
            level = %resolved.error_correction_level,
            "Rendering QR code"
        );

        // Rasterizing and compositing are CPU-bound; keep them off the async workers
        let owned_text = text.to_string();
        let render_options = resolved.clone();
        let mut data = tokio::task::spawn_blocking(move || render(&owned_text, &render_options)).await??;

        if let Some(ref logo) = resolved.logo {
            match resolved.format {
                OutputFormat::Svg => {
                    if let LogoSource::Url(url) = LogoSource::classify(&logo.image) {
                        self.logos.check_url(url)?;
                    }
                    data = add_logo_to_svg(&data, logo)?;
                }
                OutputFormat::Png => {
                    let bytes = self.logos.load(&logo.image).await?;
                    let logo = logo.clone();
                    data = tokio::task::spawn_blocking(move || add_logo_to_png(&data, &bytes, &logo)).await??;
                }
                OutputFormat::Base64 | OutputFormat::Terminal => {
                    tracing::debug!("Ignoring logo for {} output", resolved.format);
                }
            }
        }

        Ok(QrResult {
            data,
            mime_type: resolved.format.mime_type().to_string(),
            format: resolved.format,
            size: resolved.size,
            content: text.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Generate a QR code and write it to `output_path`
    pub async fn generate_and_save(
        &self,
        text: &str,
        output_path: impl AsRef<Path>,
        options: &QrOptions,
    ) -> Result<(QrResult, PathBuf)> {
        let result = self.generate(text, options).await?;
        let path = save_to_file(&result, output_path).await?;
        Ok((result, path))
    }

    /// Generate a QR code into `directory` under a content-derived filename
    pub async fn generate_with_unique_filename(
        &self,
        text: &str,
        directory: impl AsRef<Path>,
        options: &QrOptions,
    ) -> Result<(QrResult, PathBuf)> {
        let format = options.format.unwrap_or(self.config.default_format);
        let filename = unique_filename(text, options, format)?;
        self.generate_and_save(text, directory.as_ref().join(filename), options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorCorrectionLevel;
    use crate::qr::options::LogoOptions;

    fn generator() -> QrGenerator {
        QrGenerator::new(Arc::new(Config::default())).unwrap()
    }

    fn with_format(format: OutputFormat) -> QrOptions {
        QrOptions {
            format: Some(format),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_default_is_png() {
        let result = generator().generate("https://example.com", &QrOptions::default()).await.unwrap();

        assert_eq!(result.format, OutputFormat::Png);
        assert_eq!(result.mime_type, "image/png");
        assert!(result.data.starts_with("data:image/png;base64,"));
        assert_eq!(result.content, "https://example.com");
        assert_eq!(result.size, 300);
        assert!(result.timestamp > 0);
    }

    #[tokio::test]
    async fn test_mime_types_per_format() {
        let g = generator();
        for (format, mime) in [
            (OutputFormat::Png, "image/png"),
            (OutputFormat::Svg, "image/svg+xml"),
            (OutputFormat::Terminal, "text/plain"),
            (OutputFormat::Base64, "text/plain"),
        ] {
            let result = g.generate("hello", &with_format(format)).await.unwrap();
            assert_eq!(result.format, format);
            assert_eq!(result.mime_type, mime);
        }
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let g = generator();
        for text in ["", "   ", "\n\t"] {
            let err = g.generate(text, &QrOptions::default()).await.unwrap_err();
            assert!(err.to_string().contains("required"));
        }
    }

    #[tokio::test]
    async fn test_size_over_maximum_rejected() {
        let options = QrOptions {
            size: Some(2000),
            ..Default::default()
        };
        let err = generator().generate("hello", &options).await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn test_svg_logo_is_embedded() {
        let options = QrOptions {
            format: Some(OutputFormat::Svg),
            error_correction_level: Some(ErrorCorrectionLevel::H),
            logo: Some(LogoOptions {
                image: "https://example.com/logo.png".to_string(),
                size: Some(25),
            }),
            ..Default::default()
        };
        let result = generator().generate("hello", &options).await.unwrap();
        assert!(result.data.contains(r#"<image href="https://example.com/logo.png""#));
        assert!(result.data.trim_end().ends_with("/></svg>"));
    }

    #[tokio::test]
    async fn test_logo_ignored_for_terminal() {
        let options = QrOptions {
            format: Some(OutputFormat::Terminal),
            logo: Some(LogoOptions {
                image: "/does/not/exist.png".to_string(),
                size: None,
            }),
            ..Default::default()
        };
        let result = generator().generate("hello", &options).await.unwrap();
        assert_eq!(result.format, OutputFormat::Terminal);
    }

    #[tokio::test]
    async fn test_render_yields_to_runtime() {
        let g = generator();
        let options = QrOptions {
            size: Some(1000),
            ..Default::default()
        };

        let mut task = tokio_test::task::spawn(g.generate("hello", &options));
        assert!(task.poll().is_pending());

        let mut polls = 0;
        let result = loop {
            if let std::task::Poll::Ready(result) = task.poll() {
                break result;
            }
            polls += 1;
            assert!(polls < 1000, "render did not complete");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        };
        assert_eq!(result.unwrap().size, 1000);
    }

    #[tokio::test]
    async fn test_unique_filename_save() {
        let dir = tempfile::tempdir().unwrap();
        let options = with_format(OutputFormat::Svg);
        let (_, path) = generator()
            .generate_with_unique_filename("hello", dir.path(), &options)
            .await
            .unwrap();

        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(path.extension().unwrap(), "svg");
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("<svg"));
    }
}
