use serde::{Deserialize, Serialize};

use crate::models::ExportResult;

pub const SUCCESS_COLOR: &str = "#4CAF50";
pub const FAILURE_COLOR: &str = "#F44336";
pub const FAILURE_MESSAGE: &str = "Failed to generate PDF. Please try again.";
pub const DISPLAY_MS: u64 = 3000;
pub const FADE_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Failure,
}

/// What the tab shows the user once an export finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub background: String,
    /// Time fully visible before fading starts.
    pub display_ms: u64,
    pub fade_ms: u64,
}

impl Notification {
    pub fn for_result(result: &ExportResult) -> Self {
        match (result.success, result.filename.as_deref()) {
            (true, Some(filename)) => Self::new(
                NotificationKind::Success,
                format!("PDF saved as {filename}"),
                SUCCESS_COLOR,
            ),
            _ => Self::new(NotificationKind::Failure, FAILURE_MESSAGE.to_string(), FAILURE_COLOR),
        }
    }

    fn new(kind: NotificationKind, message: String, background: &str) -> Self {
        Self {
            kind,
            message,
            background: background.to_string(),
            display_ms: DISPLAY_MS,
            fade_ms: FADE_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_names_the_file() {
        let n = Notification::for_result(&ExportResult::saved("my_thread.pdf"));
        assert_eq!(n.kind, NotificationKind::Success);
        assert_eq!(n.message, "PDF saved as my_thread.pdf");
        assert_eq!(n.background, "#4CAF50");
        assert_eq!((n.display_ms, n.fade_ms), (3000, 500));
    }

    #[test]
    fn test_failure_hides_error_detail() {
        let n = Notification::for_result(&ExportResult::failed("backend exploded"));
        assert_eq!(n.kind, NotificationKind::Failure);
        assert_eq!(n.message, "Failed to generate PDF. Please try again.");
        assert_eq!(n.background, "#F44336");
    }
}
