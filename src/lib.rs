//! QR MCP Server Library
//!
//! A Model Context Protocol (MCP) server for QR code generation.
//! Provides tools for rendering QR codes as PNG, SVG, base64 or terminal
//! text, with optional centered logos, and for saving them to disk.

pub mod config;
pub mod error;
pub mod mcp;
pub mod qr;

pub use config::Config;
pub use error::{QrMcpError, Result};
