//! Extractor: turns a settled thread page into an ordered list of posts.
//!
//! The page and the image loader are injected (`PageSource`, `ImageLoader`) so
//! the same flow runs against a captured snapshot in the service and against
//! scripted pages in tests.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::models::{Post, ThreadImage};

pub mod loader;
pub mod messages;
pub mod snapshot;
pub mod wait;

pub use loader::{FetchPolicy, HttpImageLoader, ImageLoadError};
pub use messages::{handle_tab_message, TabReply};
pub use snapshot::HtmlSnapshot;
pub use wait::{wait_until, WaitError, WaitPolicy};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("thread page structure not found: {0}")]
    PageStructure(String),

    #[error("no posts found on the page")]
    NoPosts,

    #[error("page was captured while still loading more items")]
    StillLoading,

    #[error("page did not finish loading: {0}")]
    Timeout(#[from] WaitError),

    #[error("failed to load image {src}: {source}")]
    ImageLoad {
        src: String,
        #[source]
        source: ImageLoadError,
    },

    #[error("image {src} has invalid dimensions {width}x{height}")]
    InvalidDimensions { src: String, width: u32, height: u32 },
}

/// One post container as found on the page, before its images are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostNode {
    pub text: Option<String>,
    pub image_sources: Vec<String>,
}

/// Read access to the thread page.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Whether the page still shows its "loading more items" indicator.
    async fn is_loading(&self) -> bool;

    /// Whether the page can change between checks. Waiting on a frozen page
    /// that shows the loading indicator can never succeed.
    fn is_live(&self) -> bool {
        true
    }

    /// Post containers in document order.
    async fn post_nodes(&self) -> Result<Vec<PostNode>, ExtractionError>;
}

/// Resolves an image reference to its natural pixel size.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, src: &str) -> Result<ThreadImage, ImageLoadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub wait: WaitPolicy,
    /// Bound on a single image load.
    pub image_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            image_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for ExtractorConfig {
    fn from(config: &Config) -> Self {
        Self {
            wait: WaitPolicy {
                interval: config.poll_interval,
                max_attempts: config.poll_max_attempts,
                timeout: config.extraction_timeout,
            },
            image_timeout: config.image_timeout,
        }
    }
}

/// Waits for the page to settle, then reads every post in document order.
///
/// A page that cannot change is checked once instead of polled.
///
/// Images of one post load concurrently; posts are processed one after the
/// other. The first failed image aborts the whole extraction.
pub async fn extract_thread<P, L>(
    page: &P,
    loader: &L,
    config: &ExtractorConfig,
) -> Result<Vec<Post>, ExtractionError>
where
    P: PageSource + ?Sized,
    L: ImageLoader + ?Sized,
{
    if page.is_live() {
        let checks = wait_until(&config.wait, || async move { !page.is_loading().await }).await?;
        debug!(checks, "Page settled");
    } else if page.is_loading().await {
        return Err(ExtractionError::StillLoading);
    }

    let nodes = page.post_nodes().await?;
    if nodes.is_empty() {
        return Err(ExtractionError::NoPosts);
    }

    let mut posts = Vec::with_capacity(nodes.len());
    for node in nodes {
        let images = try_join_all(
            node.image_sources
                .iter()
                .map(|src| load_image(loader, src, config.image_timeout)),
        )
        .await?;
        posts.push(Post {
            text: node.text,
            images,
        });
    }

    info!(
        posts = posts.len(),
        images = posts.iter().map(|p| p.images.len()).sum::<usize>(),
        "Thread extracted"
    );
    Ok(posts)
}

async fn load_image<L>(loader: &L, src: &str, limit: Duration) -> Result<ThreadImage, ExtractionError>
where
    L: ImageLoader + ?Sized,
{
    let image = match tokio::time::timeout(limit, loader.load(src)).await {
        Ok(Ok(image)) => image,
        Ok(Err(source)) => {
            return Err(ExtractionError::ImageLoad {
                src: src.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(ExtractionError::ImageLoad {
                src: src.to_string(),
                source: ImageLoadError::TimedOut(limit),
            })
        }
    };

    if image.width == 0 || image.height == 0 {
        return Err(ExtractionError::InvalidDimensions {
            src: src.to_string(),
            width: image.width,
            height: image.height,
        });
    }
    Ok(image)
}
