//! Format-specific QR renderers
//!
//! The `qrcode` crate produces the module matrix; everything visible
//! (raster, vector, text) is drawn here from that matrix.

use std::fmt::Write as _;
use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{ImageFormat, RgbaImage};
use qrcode::{Color, QrCode};

use crate::config::{ErrorCorrectionLevel, OutputFormat};
use crate::error::Result;
use crate::qr::options::ResolvedOptions;

/// Prefix of a base64 PNG data URI
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// QR module matrix surrounded by a light quiet zone
#[derive(Debug, Clone)]
pub struct ModuleGrid {
    modules: Vec<bool>,
    width: usize,
    margin: usize,
}

impl ModuleGrid {
    /// Encode `text` at the given error correction level
    pub fn encode(text: &str, level: ErrorCorrectionLevel, margin: u32) -> Result<Self> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), level.into())?;
        let modules = code
            .to_colors()
            .into_iter()
            .map(|c| c == Color::Dark)
            .collect();

        Ok(Self {
            modules,
            width: code.width(),
            margin: margin as usize,
        })
    }

    /// Edge length in modules, quiet zone included
    pub fn dimension(&self) -> usize {
        self.width + 2 * self.margin
    }

    /// Whether the module at (x, y) is dark; coordinates include the quiet zone
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        let (Some(x), Some(y)) = (x.checked_sub(self.margin), y.checked_sub(self.margin)) else {
            return false;
        };
        if x >= self.width || y >= self.width {
            return false;
        }
        self.modules[y * self.width + x]
    }
}

/// Render `text` in the resolved format
pub fn render(text: &str, options: &ResolvedOptions) -> Result<String> {
    let grid = ModuleGrid::encode(text, options.error_correction_level, options.margin)?;

    match options.format {
        OutputFormat::Png => {
            let png = render_png(&grid, options)?;
            Ok(format!("{}{}", PNG_DATA_URI_PREFIX, STANDARD.encode(png)))
        }
        OutputFormat::Svg => Ok(render_svg(&grid, options)),
        OutputFormat::Terminal => Ok(render_terminal(&grid)),
        OutputFormat::Base64 => Ok(STANDARD.encode(render_utf8(&grid))),
    }
}

/// Rasterize to a `size` x `size` PNG.
///
/// A size smaller than the module count renders one pixel per module instead.
pub fn render_png(grid: &ModuleGrid, options: &ResolvedOptions) -> Result<Vec<u8>> {
    let modules = grid.dimension();
    let side = (options.size as usize).max(modules) as u32;
    let scale = f64::from(side) / modules as f64;

    let dark = options.color.rgba();
    let light = options.background_color.rgba();

    let image = RgbaImage::from_fn(side, side, |px, py| {
        let mx = ((f64::from(px) / scale) as usize).min(modules - 1);
        let my = ((f64::from(py) / scale) as usize).min(modules - 1);
        if grid.is_dark(mx, my) {
            dark
        } else {
            light
        }
    });

    encode_png(&image)
}

/// Encode an RGBA buffer as PNG bytes
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Emit an SVG document whose viewBox is measured in modules
pub fn render_svg(grid: &ModuleGrid, options: &ResolvedOptions) -> String {
    let n = grid.dimension();

    let mut path = String::new();
    for y in 0..n {
        let mut x = 0;
        while x < n {
            if !grid.is_dark(x, y) {
                x += 1;
                continue;
            }
            let start = x;
            while x < n && grid.is_dark(x, y) {
                x += 1;
            }
            let _ = write!(path, "M{} {}.5h{}", start, y, x - start);
        }
    }

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {n} {n}" shape-rendering="crispEdges">"#,
        size = options.size,
        n = n,
    );
    let _ = write!(
        svg,
        r#"<path fill="{}"{} d="M0 0h{n}v{n}H0z"/>"#,
        options.background_color.to_rgb_hex(),
        opacity_attr("fill-opacity", options.background_color.alpha()),
        n = n,
    );
    let _ = write!(
        svg,
        r#"<path stroke="{}"{} d="{}"/>"#,
        options.color.to_rgb_hex(),
        opacity_attr("stroke-opacity", options.color.alpha()),
        path,
    );
    svg.push_str("</svg>\n");
    svg
}

fn opacity_attr(name: &str, alpha: u8) -> String {
    if alpha == 255 {
        String::new()
    } else {
        format!(r#" {}="{:.2}""#, name, f64::from(alpha) / 255.0)
    }
}

/// Compact console rendering; light modules are drawn so the code scans on
/// dark terminal backgrounds.
pub fn render_terminal(grid: &ModuleGrid) -> String {
    half_blocks(grid, |dark| !dark)
}

/// Half-block text rendering with dark modules drawn
pub fn render_utf8(grid: &ModuleGrid) -> String {
    half_blocks(grid, |dark| dark)
}

/// Two module rows per line of text
fn half_blocks(grid: &ModuleGrid, filled: impl Fn(bool) -> bool) -> String {
    let n = grid.dimension();
    let mut out = String::with_capacity((n + 1) * n.div_ceil(2) * 3);

    for y in (0..n).step_by(2) {
        for x in 0..n {
            let top = filled(grid.is_dark(x, y));
            let bottom = filled(y + 1 < n && grid.is_dark(x, y + 1));
            out.push(match (top, bottom) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    out
}
