//! Page-side handling of messages from the coordinator.

use tracing::{error, info};

use super::{extract_thread, ExtractorConfig, ImageLoader, PageSource};
use crate::models::{TabMessage, ThreadContentResponse};
use crate::notification::Notification;

/// What the page does in answer to a message.
#[derive(Debug, Clone, PartialEq)]
pub enum TabReply {
    /// Response to `getThreadContent`.
    ThreadContent(ThreadContentResponse),
    /// `pdfGenerationResult` has no response; the page shows this instead.
    Notify(Notification),
}

pub async fn handle_tab_message<P, L>(
    message: &TabMessage,
    page: &P,
    loader: &L,
    config: &ExtractorConfig,
) -> TabReply
where
    P: PageSource + ?Sized,
    L: ImageLoader + ?Sized,
{
    match message {
        TabMessage::GetThreadContent => match extract_thread(page, loader, config).await {
            Ok(posts) => TabReply::ThreadContent(ThreadContentResponse::ok(posts)),
            Err(e) => {
                error!("Error extracting thread content: {e}");
                TabReply::ThreadContent(ThreadContentResponse::failed(e))
            }
        },
        TabMessage::PdfGenerationResult { result } => {
            let notification = Notification::for_result(result);
            info!(kind = ?notification.kind, message = %notification.message, "Showing notification");
            TabReply::Notify(notification)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::testing::{node, FakeLoader, ScriptedPage};
    use crate::models::ExportResult;
    use crate::notification::NotificationKind;

    #[tokio::test(start_paused = true)]
    async fn test_get_thread_content_returns_posts() {
        let page = ScriptedPage::settled(vec![node(Some("hello"), &["a.jpg"])]);
        let loader = FakeLoader::with(&[("a.jpg", 4, 2)]);

        let reply = handle_tab_message(
            &TabMessage::GetThreadContent,
            &page,
            &loader,
            &ExtractorConfig::default(),
        )
        .await;

        let TabReply::ThreadContent(response) = reply else {
            panic!("expected thread content, got {reply:?}");
        };
        let posts = response.into_result().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].images[0].width, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_failure_is_reported_not_raised() {
        let page = ScriptedPage::settled(vec![]);
        let reply = handle_tab_message(
            &TabMessage::GetThreadContent,
            &page,
            &FakeLoader::default(),
            &ExtractorConfig::default(),
        )
        .await;

        assert_eq!(
            reply,
            TabReply::ThreadContent(ThreadContentResponse::failed("no posts found on the page"))
        );
    }

    #[tokio::test]
    async fn test_generation_result_becomes_notification() {
        let page = ScriptedPage::settled(vec![]);
        let message = TabMessage::PdfGenerationResult {
            result: ExportResult::saved("a.pdf"),
        };
        let reply =
            handle_tab_message(&message, &page, &FakeLoader::default(), &ExtractorConfig::default())
                .await;

        match reply {
            TabReply::Notify(n) => {
                assert_eq!(n.kind, NotificationKind::Success);
                assert_eq!(n.message, "PDF saved as a.pdf");
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }
}
