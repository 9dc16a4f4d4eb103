//! Coordinator: runs one export cycle per user action.
//!
//! IDLE → AWAITING_EXTRACTION → AWAITING_LAYOUT → NOTIFYING → IDLE.
//! Any failure before NOTIFYING produces a failure result; nothing is retried.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::layout::{layout, BackendFactory, LayoutError, PageConfig};
use crate::models::{ExportResult, Post, TabMessage, ThreadContentResponse};

pub mod guard;
pub mod tab;

pub use guard::ExportGuard;
pub use tab::SnapshotTab;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessagingError {
    #[error("tab sent no response to {action}")]
    NoResponse { action: String },

    #[error("tab channel closed: {0}")]
    ChannelClosed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("an export is already running for tab {0}")]
    Busy(String),
}

/// Messaging with the tab that holds the thread page.
#[async_trait]
pub trait TabChannel: Send + Sync {
    /// Sends a message and waits for the tab's response.
    async fn request(&self, message: TabMessage) -> Result<ThreadContentResponse, MessagingError>;

    /// Sends a message without expecting a response.
    async fn post(&self, message: TabMessage) -> Result<(), MessagingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportPhase {
    Idle,
    AwaitingExtraction,
    AwaitingLayout,
    Notifying,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub export_id: Uuid,
    pub result: ExportResult,
    /// Every phase the cycle passed through, in order.
    pub phases: Vec<ExportPhase>,
    /// Whether the result reached the tab.
    pub notified: bool,
}

pub struct Coordinator {
    guard: ExportGuard,
    page_config: PageConfig,
}

impl Coordinator {
    pub fn new(page_config: PageConfig) -> Self {
        Self {
            guard: ExportGuard::default(),
            page_config,
        }
    }

    pub fn is_busy(&self, tab_id: &str) -> bool {
        self.guard.is_busy(tab_id)
    }

    /// Runs one export for `tab_id`.
    ///
    /// Only `Busy` is returned as an error; every other failure is carried in
    /// the outcome's result and relayed to the tab.
    pub async fn run_export<T, F>(
        &self,
        tab_id: &str,
        tab: &T,
        factory: &F,
    ) -> Result<ExportOutcome, CoordinatorError>
    where
        T: TabChannel + ?Sized,
        F: BackendFactory,
    {
        let _in_flight = self
            .guard
            .try_acquire(tab_id)
            .ok_or_else(|| CoordinatorError::Busy(tab_id.to_string()))?;

        let export_id = Uuid::new_v4();
        let mut phases = vec![ExportPhase::Idle, ExportPhase::AwaitingExtraction];
        info!(%export_id, tab_id, "Export started");

        let result = match tab.request(TabMessage::GetThreadContent).await {
            Err(e) => {
                warn!(%export_id, "Tab did not deliver thread content: {e}");
                ExportResult::failed(e)
            }
            Ok(response) => match response.into_result() {
                Err(message) => {
                    warn!(%export_id, "Extraction failed: {message}");
                    ExportResult::failed(message)
                }
                Ok(posts) => {
                    phases.push(ExportPhase::AwaitingLayout);
                    self.render(export_id, posts, factory).await
                }
            },
        };

        phases.push(ExportPhase::Notifying);
        let notified = match tab
            .post(TabMessage::PdfGenerationResult {
                result: result.clone(),
            })
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(%export_id, "Could not deliver result to tab: {e}");
                false
            }
        };
        phases.push(ExportPhase::Idle);

        info!(
            %export_id,
            success = result.success,
            filename = result.filename.as_deref().unwrap_or(""),
            "Export finished"
        );
        Ok(ExportOutcome {
            export_id,
            result,
            phases,
            notified,
        })
    }

    async fn render<F: BackendFactory>(
        &self,
        export_id: Uuid,
        posts: Vec<Post>,
        factory: &F,
    ) -> ExportResult {
        let mut backend = match factory.create() {
            Ok(backend) => backend,
            Err(e) => {
                error!(%export_id, "Could not open drawing backend: {e}");
                return ExportResult::failed(LayoutError::from(e));
            }
        };

        let config = self.page_config.clone();
        match tokio::task::spawn_blocking(move || layout(&posts, &mut backend, &config)).await {
            Ok(result) => result,
            Err(e) => {
                error!(%export_id, "Layout task failed: {e}");
                ExportResult::failed("layout task failed")
            }
        }
    }
}
