//! QR code generation
//!
//! Options resolution, rendering, logo compositing and file output.

pub mod generator;
pub mod logo;
pub mod options;
pub mod persist;
pub mod render;
pub mod types;

pub use generator::QrGenerator;
pub use options::{LogoOptions, QrOptions};
pub use types::QrResult;
