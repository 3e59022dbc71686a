//! Logo compositing
//!
//! Logos come from a remote URL, an inline data URI, or a local file. SVG
//! codes get an embedded `<image>` reference; PNG codes get the logo pixels
//! composited over the center of the raster.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::config::Config;
use crate::error::{EncodingError, NetworkError, Result, ValidationError};
use crate::qr::options::LogoOptions;
use crate::qr::render::{encode_png, PNG_DATA_URI_PREFIX};

/// Redirect hops followed when fetching a remote logo
const MAX_REDIRECTS: usize = 10;

/// Where a logo reference points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoSource<'a> {
    /// `data:<mime>;base64,<payload>`
    DataUri(&'a str),
    /// `http://` or `https://`
    Url(&'a str),
    /// Anything else is read from disk
    Path(&'a str),
}

impl<'a> LogoSource<'a> {
    pub fn classify(reference: &'a str) -> Self {
        if reference.starts_with("data:") {
            LogoSource::DataUri(reference)
        } else if reference.starts_with("http://") || reference.starts_with("https://") {
            LogoSource::Url(reference)
        } else {
            LogoSource::Path(reference)
        }
    }
}

/// Loads logo bytes subject to the configured domain policy and size ceiling
#[derive(Debug, Clone)]
pub struct LogoLoader {
    http_client: reqwest::Client,
    config: Arc<Config>,
}

impl LogoLoader {
    /// Create a loader whose HTTP client honors the configured fetch timeout
    /// and applies the domain policy to every redirect hop
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.logo_fetch_timeout)
            .redirect(redirect_policy(config.clone()))
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Load the raw bytes of a logo reference
    pub async fn load(&self, reference: &str) -> Result<Vec<u8>> {
        match LogoSource::classify(reference) {
            LogoSource::DataUri(uri) => self.decode_data_uri(uri),
            LogoSource::Url(url) => self.fetch(url).await,
            LogoSource::Path(path) => self.read_file(path).await,
        }
    }

    /// Reject hosts outside the allow-list or inside the deny-list
    pub fn check_url(&self, url: &str) -> Result<reqwest::Url> {
        let parsed = reqwest::Url::parse(url).map_err(|_| NetworkError::InvalidUrl {
            url: url.to_string(),
        })?;
        let host = parsed.host_str().ok_or_else(|| NetworkError::InvalidUrl {
            url: url.to_string(),
        })?;

        if !self.config.is_domain_allowed(host) {
            tracing::warn!("Rejected logo from disallowed domain: {}", host);
            return Err(ValidationError::DomainNotAllowed {
                host: host.to_string(),
            }
            .into());
        }

        Ok(parsed)
    }

    fn decode_data_uri(&self, uri: &str) -> Result<Vec<u8>> {
        let (header, payload) = uri.split_once(',').ok_or_else(|| invalid_logo("malformed data URI"))?;
        if !header.ends_with(";base64") {
            return Err(invalid_logo("only base64 data URIs are supported"));
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| invalid_logo(&format!("invalid base64 payload: {}", e)))?;
        self.check_length(bytes.len() as u64)?;
        Ok(bytes)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.check_url(url)?;
        tracing::debug!("Fetching logo from {}", url);

        let mut response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::FetchFailed {
                status: status.to_string(),
            }
            .into());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(NetworkError::InvalidContentType { content_type }.into());
        }

        if let Some(length) = response.content_length() {
            self.check_length(length)?;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            self.check_length((bytes.len() + chunk.len()) as u64)?;
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let metadata = tokio::fs::metadata(path).await?;
        self.check_length(metadata.len())?;
        Ok(tokio::fs::read(path).await?)
    }

    fn check_length(&self, length: u64) -> Result<()> {
        if length > self.config.max_logo_size {
            return Err(ValidationError::LogoTooLarge {
                max: self.config.max_logo_size,
            }
            .into());
        }
        Ok(())
    }
}

fn invalid_logo(message: &str) -> crate::error::QrMcpError {
    ValidationError::InvalidLogo {
        message: message.to_string(),
    }
    .into()
}

/// Follow redirects only to hosts the domain policy admits
fn redirect_policy(config: Arc<Config>) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }

        let host = attempt.url().host_str().unwrap_or_default().to_string();
        if config.is_domain_allowed(&host) {
            attempt.follow()
        } else {
            tracing::warn!("Rejected logo redirect to disallowed domain: {}", host);
            attempt.error(ValidationError::DomainNotAllowed { host })
        }
    })
}

fn request_error(err: reqwest::Error) -> crate::error::QrMcpError {
    // A redirect refused by the domain policy surfaces as the policy error
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        if let Some(ValidationError::DomainNotAllowed { host }) = cause.downcast_ref::<ValidationError>() {
            return ValidationError::DomainNotAllowed { host: host.clone() }.into();
        }
        source = cause.source();
    }

    NetworkError::Request {
        message: err.to_string(),
    }
    .into()
}

/// Extract the width and height from an SVG `viewBox` attribute
pub fn svg_viewbox(svg: &str) -> Result<(f64, f64)> {
    let missing = || EncodingError::Svg("Could not extract viewBox from SVG".to_string());

    let start = svg.find("viewBox=\"").ok_or_else(missing)? + "viewBox=\"".len();
    let end = svg[start..].find('"').ok_or_else(missing)? + start;

    let values: Vec<f64> = svg[start..end]
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| missing())?;

    match values.as_slice() {
        [_, _, width, height] if *width > 0.0 && *height > 0.0 => Ok((*width, *height)),
        _ => Err(missing().into()),
    }
}

/// Center an `<image>` reference inside an SVG code
pub fn add_logo_to_svg(svg: &str, logo: &LogoOptions) -> Result<String> {
    let (width, height) = svg_viewbox(svg)?;
    let logo_size = logo.edge_length(width, height);
    let x = (width - logo_size) / 2.0;
    let y = (height - logo_size) / 2.0;

    let element = format!(
        r#"<image href="{}" x="{}" y="{}" width="{}" height="{}" />"#,
        escape_attr(&logo.image),
        round2(x),
        round2(y),
        round2(logo_size),
        round2(logo_size),
    );

    let close = svg
        .rfind("</svg>")
        .ok_or_else(|| EncodingError::Svg("SVG has no closing tag".to_string()))?;

    let mut out = String::with_capacity(svg.len() + element.len());
    out.push_str(&svg[..close]);
    out.push_str(&element);
    out.push_str(&svg[close..]);
    Ok(out)
}

/// Composite `logo_bytes` over the center of a PNG data URI
pub fn add_logo_to_png(png_data_uri: &str, logo_bytes: &[u8], logo: &LogoOptions) -> Result<String> {
    let encoded = png_data_uri
        .strip_prefix(PNG_DATA_URI_PREFIX)
        .unwrap_or(png_data_uri);
    let qr_bytes = STANDARD
        .decode(encoded)
        .map_err(|e| EncodingError::Image(format!("invalid PNG payload: {}", e)))?;

    let mut canvas = image::load_from_memory(&qr_bytes)?.to_rgba8();
    let (width, height) = canvas.dimensions();

    let logo_size = logo.edge_length(f64::from(width), f64::from(height));
    let edge = (logo_size.round() as u32).max(1);

    let logo_image = image::load_from_memory(logo_bytes)?;
    let fitted = fit_square(&logo_image, edge);

    let x = ((f64::from(width) - logo_size) / 2.0).round() as i64;
    let y = ((f64::from(height) - logo_size) / 2.0).round() as i64;
    imageops::overlay(&mut canvas, &fitted, x, y);

    let png = encode_png(&canvas)?;
    Ok(format!("{}{}", PNG_DATA_URI_PREFIX, STANDARD.encode(png)))
}

/// Scale to fit an `edge` x `edge` square, padding with transparency
fn fit_square(logo: &image::DynamicImage, edge: u32) -> RgbaImage {
    let resized = logo.resize(edge, edge, FilterType::Lanczos3).to_rgba8();
    let mut square = RgbaImage::new(edge, edge);
    let x = i64::from((edge - resized.width().min(edge)) / 2);
    let y = i64::from((edge - resized.height().min(edge)) / 2);
    imageops::overlay(&mut square, &resized, x, y);
    square
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            max_logo_size: 64,
            ..Config::default()
        })
    }

    #[test]
    fn test_classify_sources() {
        assert!(matches!(LogoSource::classify("data:image/png;base64,AA=="), LogoSource::DataUri(_)));
        assert!(matches!(LogoSource::classify("https://example.com/l.png"), LogoSource::Url(_)));
        assert!(matches!(LogoSource::classify("/tmp/logo.png"), LogoSource::Path(_)));
    }

    #[test]
    fn test_svg_viewbox() {
        let svg = r#"<svg viewBox="0 0 29 31"></svg>"#;
        assert_eq!(svg_viewbox(svg).unwrap(), (29.0, 31.0));
        assert!(svg_viewbox("<svg></svg>").is_err());
        assert!(svg_viewbox(r#"<svg viewBox="a b c d"></svg>"#).is_err());
    }

    #[test]
    fn test_add_logo_to_svg_centers_image() {
        let svg = r#"<svg viewBox="0 0 100 100"><path/></svg>"#;
        let logo = LogoOptions {
            image: "https://example.com/logo.png".to_string(),
            size: Some(30),
        };
        let out = add_logo_to_svg(svg, &logo).unwrap();
        assert!(out.ends_with(
            r#"<image href="https://example.com/logo.png" x="35" y="35" width="30" height="30" /></svg>"#
        ));
    }

    #[test]
    fn test_add_logo_to_svg_requires_viewbox() {
        let logo = LogoOptions {
            image: "x.png".to_string(),
            size: None,
        };
        assert!(add_logo_to_svg("<svg></svg>", &logo).is_err());
    }

    #[test]
    fn test_add_logo_to_png_composites_center() {
        let base = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let base_uri = format!("{}{}", PNG_DATA_URI_PREFIX, STANDARD.encode(encode_png(&base).unwrap()));
        let logo_png = encode_png(&RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]))).unwrap();

        let logo = LogoOptions {
            image: "inline".to_string(),
            size: None,
        };
        let out = add_logo_to_png(&base_uri, &logo_png, &logo).unwrap();

        let bytes = STANDARD.decode(out.strip_prefix(PNG_DATA_URI_PREFIX).unwrap()).unwrap();
        let composed = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(composed.dimensions(), (100, 100));
        assert_eq!(*composed.get_pixel(50, 50), Rgba([255, 0, 0, 255]));
        assert_eq!(*composed.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_fit_square_pads_wide_logo() {
        let wide = image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 20, Rgba([0, 0, 255, 255])));
        let square = fit_square(&wide, 20);
        assert_eq!(square.dimensions(), (20, 20));
        assert_eq!(square.get_pixel(10, 0)[3], 0);
        assert_eq!(*square.get_pixel(10, 10), Rgba([0, 0, 255, 255]));
    }

    #[tokio::test]
    async fn test_data_uri_logo() {
        let loader = LogoLoader::new(test_config()).unwrap();
        let bytes = loader.load("data:image/png;base64,AAEC").await.unwrap();
        assert_eq!(bytes, vec![0, 1, 2]);

        assert!(loader.load("data:image/png,plain").await.is_err());
    }

    #[tokio::test]
    async fn test_data_uri_over_limit() {
        let loader = LogoLoader::new(test_config()).unwrap();
        let uri = format!("data:image/png;base64,{}", STANDARD.encode([0u8; 128]));
        let err = loader.load(&uri).await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn test_disallowed_domain_rejected_before_fetch() {
        let config = Arc::new(Config {
            allowed_domains: Some(vec!["blocked.invalid".to_string()]),
            disallowed_domains: vec!["blocked.invalid".to_string()],
            ..Config::default()
        });
        let loader = LogoLoader::new(config).unwrap();

        let err = loader.load("https://blocked.invalid/logo.png").await.unwrap_err();
        assert!(err.to_string().contains("Domain not allowed: blocked.invalid"));

        let err = loader.load("https://other.invalid/logo.png").await.unwrap_err();
        assert!(err.to_string().contains("Domain not allowed: other.invalid"));
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let loader = LogoLoader::new(test_config()).unwrap();
        assert!(loader.load("/definitely/not/here.png").await.is_err());
    }
}
