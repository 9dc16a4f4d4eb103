use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::coordinator::{ExportPhase, SnapshotTab};
use crate::errors::AppError;
use crate::extractor::{HtmlSnapshot, HttpImageLoader};
use crate::image_store::ImageStore;
use crate::layout::{render_thread, DrawOp, LayoutError, PdfBackendFactory, RecordingBackend};
use crate::models::{ExportResult, Post};
use crate::notification::Notification;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    /// Identifies the tab for in-flight tracking. Falls back to the base URL,
    /// then to a shared default, so repeated triggers are still serialized.
    #[serde(default)]
    pub tab_id: Option<String>,
    /// Captured HTML of the thread page.
    pub html: String,
    /// URL the page was captured from; relative image sources resolve against it.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub export_id: Uuid,
    pub result: ExportResult,
    pub notification: Option<Notification>,
    pub phases: Vec<ExportPhase>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub posts: Vec<Post>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub filename: String,
    pub page_count: usize,
    pub ops: Vec<DrawOp>,
}

/// Tab used for requests that do not name one.
const DEFAULT_TAB_ID: &str = "default";

/// Key the in-flight guard tracks for `req`.
fn tab_key(req: &ExportRequest) -> &str {
    req.tab_id
        .as_deref()
        .or(req.base_url.as_deref())
        .filter(|key| !key.trim().is_empty())
        .unwrap_or(DEFAULT_TAB_ID)
}

/// POST /api/v1/export
pub async fn handle_export(
    State(state): State<AppState>,
    Json(req): Json<ExportRequest>,
) -> Result<Json<ExportResponse>, AppError> {
    if req.html.trim().is_empty() {
        return Err(AppError::Validation("html must not be empty".to_string()));
    }
    let page = HtmlSnapshot::parse(&req.html, req.base_url.as_deref())
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let tab_id = tab_key(&req).to_string();
    info!(tab_id = %tab_id, posts = page.post_count(), "Export requested");

    let images = ImageStore::default();
    let tab = SnapshotTab::new(
        page,
        HttpImageLoader::new(state.http.clone(), images.clone()).with_policy(state.fetch),
        state.extractor,
    );
    let factory = PdfBackendFactory::new(
        state.page_config.clone(),
        images,
        state.config.export_dir.clone(),
    );

    let outcome = state.coordinator.run_export(&tab_id, &tab, &factory).await?;

    Ok(Json(ExportResponse {
        export_id: outcome.export_id,
        result: outcome.result,
        notification: tab.last_notification(),
        phases: outcome.phases,
    }))
}

/// POST /api/v1/layout/preview
/// Lays the posts out without writing a document and returns the draw operations.
pub async fn handle_preview(
    State(state): State<AppState>,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    for (i, post) in req.posts.iter().enumerate() {
        if let Some(image) = post.images.iter().find(|img| img.width == 0 || img.height == 0) {
            return Err(AppError::Validation(format!(
                "post {i}: image {} must have positive width and height",
                image.src
            )));
        }
    }

    let config = state.page_config.clone();
    let posts = req.posts;
    let (summary, ops) = tokio::task::spawn_blocking(move || {
        let mut backend = RecordingBackend::new(config.clone());
        let summary = render_thread(&posts, &mut backend, &config, Utc::now())?;
        Ok::<_, LayoutError>((summary, backend.into_ops()))
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("spawn_blocking failed in preview: {e}")))?
    .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    Ok(Json(PreviewResponse {
        filename: summary.filename,
        page_count: summary.page_count,
        ops,
    }))
}

/// GET /api/v1/exports/:filename
pub async fn handle_download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !is_export_filename(&filename) {
        return Err(AppError::Validation(format!(
            "'{filename}' is not a valid export file name"
        )));
    }

    let path = state.config.export_dir.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("Export {filename} not found")));
        }
        Err(e) => {
            return Err(AppError::Internal(
                anyhow::Error::new(e).context(format!("reading {}", path.display())),
            ));
        }
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

/// Names the layout engine can produce: `[a-z0-9_]+\.pdf`.
fn is_export_filename(name: &str) -> bool {
    match name.strip_suffix(".pdf") {
        Some(stem) => {
            !stem.is_empty()
                && stem
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        None => false,
    }
}
