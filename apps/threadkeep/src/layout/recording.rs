//! In-memory backend that records draw operations instead of rendering them.

use serde::Serialize;

use crate::layout::backend::{BackendError, DrawingBackend, ImageFormat, PageSize, Rect};
use crate::layout::font_metrics::{get_metrics, PageConfig};
use crate::layout::wrap::wrap_text;

/// One recorded operation. `page` is zero-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DrawOp {
    Text {
        page: usize,
        lines: Vec<String>,
        x: f32,
        y: f32,
    },
    Image {
        page: usize,
        src: String,
        format: ImageFormat,
        rect: Rect,
    },
    Line {
        page: usize,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        gray: u8,
    },
    AddPage,
    Save {
        filename: String,
    },
}

pub struct RecordingBackend {
    config: PageConfig,
    ops: Vec<DrawOp>,
    page: usize,
    gray: u8,
}

impl RecordingBackend {
    pub fn new(config: PageConfig) -> Self {
        Self {
            config,
            ops: Vec::new(),
            page: 0,
            gray: 0,
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<DrawOp> {
        self.ops
    }

    pub fn page_count(&self) -> usize {
        self.page + 1
    }

    pub fn saved_filenames(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Save { filename } => Some(filename.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl DrawingBackend for RecordingBackend {
    fn page_size(&self) -> PageSize {
        PageSize {
            width: self.config.page_width_mm,
            height: self.config.page_height_mm,
        }
    }

    fn split_text_to_size(&self, text: &str, max_width: f32) -> Vec<String> {
        wrap_text(text, max_width, get_metrics(), self.config.font_size_pt)
    }

    fn text(&mut self, lines: &[String], x: f32, y: f32) -> Result<(), BackendError> {
        self.ops.push(DrawOp::Text {
            page: self.page,
            lines: lines.to_vec(),
            x,
            y,
        });
        Ok(())
    }

    fn add_image(&mut self, src: &str, format: ImageFormat, rect: Rect) -> Result<(), BackendError> {
        self.ops.push(DrawOp::Image {
            page: self.page,
            src: src.to_string(),
            format,
            rect,
        });
        Ok(())
    }

    fn set_draw_gray(&mut self, level: u8) {
        self.gray = level;
    }

    fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), BackendError> {
        self.ops.push(DrawOp::Line {
            page: self.page,
            x1,
            y1,
            x2,
            y2,
            gray: self.gray,
        });
        Ok(())
    }

    fn add_page(&mut self) {
        self.page += 1;
        self.ops.push(DrawOp::AddPage);
    }

    fn save(&mut self, filename: &str) -> Result<String, BackendError> {
        self.ops.push(DrawOp::Save {
            filename: filename.to_string(),
        });
        Ok(filename.to_string())
    }
}
