//! Messages exchanged between the background side and the page side of an export.

use serde::{Deserialize, Serialize};

use crate::models::thread::{ExportResult, Post};

/// A message sent to a tab, discriminated by its `action` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TabMessage {
    /// Request/response: the tab answers with a `ThreadContentResponse`.
    GetThreadContent,
    /// Fire-and-forget: the tab shows a notification, no response expected.
    PdfGenerationResult { result: ExportResult },
}

/// The tab's answer to `getThreadContent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadContentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_content: Option<Vec<Post>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ThreadContentResponse {
    pub fn ok(posts: Vec<Post>) -> Self {
        Self {
            success: true,
            thread_content: Some(posts),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            thread_content: None,
            error: Some(error.to_string()),
        }
    }

    /// Collapses the wire shape into the posts or the reported error message.
    pub fn into_result(self) -> Result<Vec<Post>, String> {
        if self.success {
            Ok(self.thread_content.unwrap_or_default())
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "tab reported failure without a message".to_string()))
        }
    }
}
