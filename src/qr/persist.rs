//! Writing rendered codes to disk

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::config::OutputFormat;
use crate::error::{Result, ValidationError};
use crate::qr::options::QrOptions;
use crate::qr::render::PNG_DATA_URI_PREFIX;
use crate::qr::types::QrResult;

/// Resolve a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };

    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Write a result to `path`, creating parent directories as needed.
///
/// PNG results are written as decoded image bytes; every other format is
/// written as text.
pub async fn save_to_file(result: &QrResult, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    match result.format {
        OutputFormat::Png => {
            let encoded = result
                .data
                .strip_prefix(PNG_DATA_URI_PREFIX)
                .unwrap_or(&result.data);
            let bytes = STANDARD.decode(encoded).map_err(|e| ValidationError::InvalidParameter {
                name: "data".to_string(),
                message: e.to_string(),
            })?;
            tokio::fs::write(path, bytes).await?;
        }
        OutputFormat::Svg | OutputFormat::Base64 | OutputFormat::Terminal => {
            tokio::fs::write(path, result.data.as_bytes()).await?;
        }
    }

    tracing::debug!("Saved {} QR code to {}", result.format, path.display());
    Ok(path.to_path_buf())
}

/// Content-addressed filename: `qr-<sha256 of text and options>.<ext>`
pub fn unique_filename(text: &str, options: &QrOptions, format: OutputFormat) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(serde_json::to_vec(options)?);
    let digest = hex::encode(hasher.finalize());

    Ok(format!("qr-{}.{}", &digest[..32], format.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(format: OutputFormat, data: String) -> QrResult {
        QrResult {
            mime_type: format.mime_type().to_string(),
            data,
            format,
            size: 300,
            content: "hello".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~/qr/out.png"), home.join("qr/out.png"));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("/tmp/out.png"), PathBuf::from("/tmp/out.png"));
        assert_eq!(expand_home("rel/~/x"), PathBuf::from("rel/~/x"));
    }

    #[tokio::test]
    async fn test_png_written_as_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.png");
        let bytes = vec![0x89, b'P', b'N', b'G', 1, 2, 3];
        let r = result(
            OutputFormat::Png,
            format!("{}{}", PNG_DATA_URI_PREFIX, STANDARD.encode(&bytes)),
        );

        let saved = save_to_file(&r, &path).await.unwrap();
        assert_eq!(saved, path);
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_svg_written_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.svg");
        let r = result(OutputFormat::Svg, "<svg></svg>\n".to_string());

        save_to_file(&r, &path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<svg></svg>\n");
    }

    #[test]
    fn test_unique_filename_is_stable() {
        let options = QrOptions::default();
        let a = unique_filename("hello", &options, OutputFormat::Png).unwrap();
        let b = unique_filename("hello", &options, OutputFormat::Png).unwrap();
        let c = unique_filename("other", &options, OutputFormat::Png).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("qr-"));
        assert!(a.ends_with(".png"));
        assert!(unique_filename("x", &options, OutputFormat::Terminal)
            .unwrap()
            .ends_with(".txt"));
    }
}
