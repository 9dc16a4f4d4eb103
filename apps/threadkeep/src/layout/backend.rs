//! The drawing backend seam between the layout engine and a concrete document format.
//!
//! Coordinates are millimetres from the top-left corner of the current page.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("image not available: {0}")]
    MissingImage(String),

    #[error("unreadable image data for {src}: {message}")]
    ImageDecode { src: String, message: String },

    #[error("failed to write document: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Guesses the encoding from the image URL.
    ///
    /// Media URLs carry the format either as a path extension or as a
    /// `format=` query parameter; anything unrecognised is treated as JPEG.
    pub fn from_src(src: &str) -> Self {
        let src = src.split('#').next().unwrap_or_default().to_ascii_lowercase();
        let (path, query) = src.split_once('?').unwrap_or((src.as_str(), ""));
        let query_png = query.split('&').any(|pair| pair == "format=png");
        if query_png || path.ends_with(".png") {
            ImageFormat::Png
        } else {
            ImageFormat::Jpeg
        }
    }
}

/// Primitive drawing and persistence operations consumed by the layout engine.
///
/// Implementations start with one open page. Every page added afterwards becomes
/// the target of subsequent drawing calls.
pub trait DrawingBackend {
    fn page_size(&self) -> PageSize;

    /// Wraps `text` into lines that fit `max_width`.
    fn split_text_to_size(&self, text: &str, max_width: f32) -> Vec<String>;

    /// Places `lines` with the first baseline at `(x, y)`, one line height apart.
    fn text(&mut self, lines: &[String], x: f32, y: f32) -> Result<(), BackendError>;

    fn add_image(&mut self, src: &str, format: ImageFormat, rect: Rect) -> Result<(), BackendError>;

    /// Sets the stroke gray level (0 = black, 255 = white) for subsequent lines.
    fn set_draw_gray(&mut self, level: u8);

    fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), BackendError>;

    fn add_page(&mut self);

    /// Persists the document, preferring `filename`, and returns the name it
    /// was actually stored under.
    fn save(&mut self, filename: &str) -> Result<String, BackendError>;
}

/// Opens a fresh backend for each export run.
pub trait BackendFactory: Send + Sync {
    type Backend: DrawingBackend + Send + 'static;

    fn create(&self) -> Result<Self::Backend, BackendError>;
}
