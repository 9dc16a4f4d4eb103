use serde::{Deserialize, Serialize};

/// One entry of a thread, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<ThreadImage>,
}

impl Post {
    /// Text that will actually be laid out: `None` for absent or blank text.
    pub fn printable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// An image attached to a post, with its natural pixel size.
///
/// Both dimensions are positive once the extractor has produced the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadImage {
    pub src: String,
    pub width: u32,
    pub height: u32,
}

impl ThreadImage {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Outcome of one export run.
///
/// Serializes as `{success: true, filename}` or `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportResult {
    pub fn saved(filename: impl Into<String>) -> Self {
        Self {
            success: true,
            filename: Some(filename.into()),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            filename: None,
            error: Some(error.to_string()),
        }
    }
}
