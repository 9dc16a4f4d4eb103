use std::sync::Arc;

use reqwest::Client;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::extractor::{ExtractorConfig, FetchPolicy};
use crate::layout::PageConfig;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Page geometry used for every export and preview.
    pub page_config: PageConfig,
    pub extractor: ExtractorConfig,
    /// Limits on image downloads.
    pub fetch: FetchPolicy,
    /// HTTP client used to download thread images.
    pub http: Client,
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(config: Config, page_config: PageConfig, http: Client) -> Self {
        Self {
            extractor: ExtractorConfig::from(&config),
            fetch: FetchPolicy::from(&config),
            coordinator: Arc::new(Coordinator::new(page_config.clone())),
            config,
            page_config,
            http,
        }
    }
}
