//! In-process tab backed by a page snapshot.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{MessagingError, TabChannel};
use crate::extractor::{handle_tab_message, ExtractorConfig, HtmlSnapshot, ImageLoader, TabReply};
use crate::models::{TabMessage, ThreadContentResponse};
use crate::notification::Notification;

/// Answers coordinator messages the way the page side would, against a
/// captured snapshot. Notifications it is asked to show are kept for the caller.
pub struct SnapshotTab<L> {
    page: HtmlSnapshot,
    loader: L,
    config: ExtractorConfig,
    shown: Mutex<Vec<Notification>>,
}

impl<L: ImageLoader> SnapshotTab<L> {
    pub fn new(page: HtmlSnapshot, loader: L, config: ExtractorConfig) -> Self {
        Self {
            page,
            loader,
            config,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn last_notification(&self) -> Option<Notification> {
        self.shown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }

    async fn handle(&self, message: &TabMessage) -> TabReply {
        handle_tab_message(message, &self.page, &self.loader, &self.config).await
    }
}

#[async_trait]
impl<L: ImageLoader> TabChannel for SnapshotTab<L> {
    async fn request(&self, message: TabMessage) -> Result<ThreadContentResponse, MessagingError> {
        match self.handle(&message).await {
            TabReply::ThreadContent(response) => Ok(response),
            TabReply::Notify(_) => Err(MessagingError::NoResponse {
                action: "pdfGenerationResult".to_string(),
            }),
        }
    }

    async fn post(&self, message: TabMessage) -> Result<(), MessagingError> {
        if let TabReply::Notify(notification) = self.handle(&message).await {
            self.shown
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(notification);
        }
        Ok(())
    }
}
