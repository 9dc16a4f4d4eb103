//! `ImageLoader` that downloads images over HTTP.
//!
//! Image sources come from captured pages, so every fetch is checked first:
//! only http(s) URLs whose host resolves to public addresses are requested,
//! bodies are capped, and dimensions are read from the image header without
//! decoding pixels.

use std::io::Cursor;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use image::ImageReader;
use reqwest::{redirect, Client, Url};
use thiserror::Error;
use tracing::{debug, warn};

use super::ImageLoader;
use crate::config::Config;
use crate::image_store::ImageStore;
use crate::models::ThreadImage;

/// Redirect hops followed before a fetch is abandoned.
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered with status {0}")]
    Status(u16),

    #[error("invalid image URL {0:?}")]
    InvalidUrl(String),

    #[error("refusing to fetch {0}: only public http(s) hosts are allowed")]
    Blocked(String),

    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("image is larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("image of {width}x{height} pixels exceeds {limit} pixels")]
    TooManyPixels { width: u32, height: u32, limit: u64 },

    #[error("unreadable image data: {0}")]
    Decode(#[from] image::ImageError),

    #[error("load did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Limits applied to every image download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Permits loopback, private and link-local hosts. Local development only.
    pub allow_private_hosts: bool,
    pub max_bytes: usize,
    /// Largest `width * height` accepted; the document backend decodes every pixel.
    pub max_pixels: u64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            allow_private_hosts: false,
            max_bytes: 20 * 1024 * 1024,
            max_pixels: 40_000_000,
        }
    }
}

impl From<&Config> for FetchPolicy {
    fn from(config: &Config) -> Self {
        Self {
            allow_private_hosts: config.allow_private_image_hosts,
            max_bytes: config.max_image_bytes,
            ..FetchPolicy::default()
        }
    }
}

impl FetchPolicy {
    /// Redirect handling for the shared HTTP client.
    ///
    /// Redirects to hosts this policy would refuse are not followed; the 3xx
    /// response then surfaces as a status error.
    pub fn redirect_policy(&self) -> redirect::Policy {
        let allow_private = self.allow_private_hosts;
        redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if allow_private || check_literal_host(attempt.url()).is_ok() {
                attempt.follow()
            } else {
                warn!(url = %attempt.url(), "Not following redirect to a non-public host");
                attempt.stop()
            }
        })
    }
}

/// Fetches each image, records its pixel size and keeps the bytes in `store`
/// for the document backend.
#[derive(Clone)]
pub struct HttpImageLoader {
    client: Client,
    store: ImageStore,
    policy: FetchPolicy,
}

impl HttpImageLoader {
    pub fn new(client: Client, store: ImageStore) -> Self {
        Self {
            client,
            store,
            policy: FetchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    async fn fetch(&self, src: &str) -> Result<Bytes, ImageLoadError> {
        let url = Url::parse(src).map_err(|_| ImageLoadError::InvalidUrl(src.to_string()))?;
        check_target(&url, self.policy.allow_private_hosts).await?;

        let limit = self.policy.max_bytes;
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageLoadError::Status(status.as_u16()));
        }
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ImageLoadError::TooLarge { limit });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(ImageLoadError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, src: &str) -> Result<ThreadImage, ImageLoadError> {
        let data = match self.store.get(src) {
            Some(cached) => {
                debug!(src, "Using cached image bytes");
                cached
            }
            None => self.fetch(src).await?,
        };

        let (width, height) = read_dimensions(&data)?;
        let limit = self.policy.max_pixels;
        if u64::from(width) * u64::from(height) > limit {
            return Err(ImageLoadError::TooManyPixels {
                width,
                height,
                limit,
            });
        }
        debug!(src, width, height, bytes = data.len(), "Image loaded");
        self.store.insert(src, data);

        Ok(ThreadImage {
            src: src.to_string(),
            width,
            height,
        })
    }
}

/// Natural pixel size of `data`, read from the image header.
pub fn read_dimensions(data: &[u8]) -> Result<(u32, u32), ImageLoadError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    Ok(reader.into_dimensions()?)
}

/// Rejects non-http(s) URLs and hosts that are, or resolve to, non-public addresses.
async fn check_target(url: &Url, allow_private: bool) -> Result<(), ImageLoadError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ImageLoadError::Blocked(url.to_string()));
    }
    if allow_private {
        return Ok(());
    }
    check_literal_host(url)?;

    let host = url.host_str().unwrap_or_default();
    if host.parse::<IpAddr>().is_ok() || host.starts_with('[') {
        return Ok(());
    }
    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| ImageLoadError::Resolve {
            host: host.to_string(),
            source,
        })?;
    for addr in addrs {
        if !is_public_ip(addr.ip()) {
            return Err(ImageLoadError::Blocked(url.to_string()));
        }
    }
    Ok(())
}

/// Checks what can be decided without DNS: the scheme, IP literals and `localhost`.
fn check_literal_host(url: &Url) -> Result<(), ImageLoadError> {
    let blocked = || ImageLoadError::Blocked(url.to_string());
    if !matches!(url.scheme(), "http" | "https") {
        return Err(blocked());
    }
    let host = url.host_str().ok_or_else(blocked)?;
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return if is_public_ip(ip) { Ok(()) } else { Err(blocked()) };
    }
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".localhost") {
        return Err(blocked());
    }
    Ok(())
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            let shared = a == 100 && (b & 0xc0) == 64;
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_multicast()
                || v4.is_documentation()
                || shared
                || a == 0)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            let unique_local = (first & 0xfe00) == 0xfc00;
            let link_local = (first & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || v6.is_multicast() || unique_local || link_local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};

    fn png(width: u32, height: u32) -> Bytes {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        Bytes::from(buf.into_inner())
    }

    /// Serves `router` on an ephemeral loopback port and returns its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn local_loader(max_bytes: usize) -> HttpImageLoader {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpImageLoader::new(client, ImageStore::default()).with_policy(FetchPolicy {
            allow_private_hosts: true,
            max_bytes,
            ..FetchPolicy::default()
        })
    }

    #[test]
    fn test_read_dimensions_of_png() {
        assert_eq!(read_dimensions(&png(512, 256)).unwrap(), (512, 256));
    }

    #[test]
    fn test_read_dimensions_rejects_garbage() {
        let err = read_dimensions(b"<html>not an image</html>").unwrap_err();
        assert!(matches!(err, ImageLoadError::Decode(_)));
    }

    #[tokio::test]
    async fn test_cached_bytes_skip_the_network() {
        let store = ImageStore::default();
        store.insert("https://img.invalid/a.png", png(3, 7));
        let loader = HttpImageLoader::new(Client::new(), store);

        let image = loader.load("https://img.invalid/a.png").await.unwrap();
        assert_eq!((image.width, image.height), (3, 7));
        assert_eq!(image.src, "https://img.invalid/a.png");
    }

    #[tokio::test]
    async fn test_unparseable_source_is_rejected() {
        let loader = HttpImageLoader::new(Client::new(), ImageStore::default());
        let err = loader.load("not-a-url").await.unwrap_err();
        assert!(matches!(err, ImageLoadError::InvalidUrl(_)));
        assert!(loader.store().is_empty());
    }

    #[tokio::test]
    async fn test_non_http_schemes_are_blocked() {
        let loader = HttpImageLoader::new(Client::new(), ImageStore::default());
        for src in ["file:///etc/passwd", "ftp://files.example/a.png", "data:image/png;base64,AAAA"] {
            let err = loader.load(src).await.unwrap_err();
            assert!(matches!(err, ImageLoadError::Blocked(_)), "{src}: {err}");
        }
    }

    #[tokio::test]
    async fn test_internal_hosts_are_blocked() {
        let loader = HttpImageLoader::new(Client::new(), ImageStore::default());
        for src in [
            "http://127.0.0.1/a.png",
            "http://localhost:8080/a.png",
            "http://169.254.169.254/latest/meta-data/",
            "http://10.1.2.3/a.png",
            "http://192.168.0.10/a.png",
            "http://[::1]/a.png",
            "http://[fd00::1]/a.png",
            "http://[::ffff:127.0.0.1]/a.png",
            "http://0.0.0.0/a.png",
        ] {
            let err = loader.load(src).await.unwrap_err();
            assert!(matches!(err, ImageLoadError::Blocked(_)), "{src}: {err}");
        }
    }

    #[test]
    fn test_public_addresses_pass_the_literal_check() {
        for src in ["https://93.184.216.34/a.jpg", "https://pbs.example.com/media/a.jpg"] {
            assert!(check_literal_host(&Url::parse(src).unwrap()).is_ok(), "{src}");
        }
    }

    #[tokio::test]
    async fn test_download_records_size_and_stores_bytes() {
        let body = png(12, 5);
        let base = serve(Router::new().route(
            "/a.png",
            get(move || {
                let body = body.clone();
                async move { body }
            }),
        ))
        .await;
        let loader = local_loader(1024 * 1024);

        let src = format!("{base}/a.png");
        let image = loader.load(&src).await.unwrap();

        assert_eq!((image.width, image.height), (12, 5));
        assert!(loader.store().get(&src).is_some());
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_rejected() {
        let base = serve(Router::new().route("/big", get(|| async { vec![0u8; 4096] }))).await;
        let err = local_loader(1024).load(&format!("{base}/big")).await.unwrap_err();
        assert!(matches!(err, ImageLoadError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_is_rejected() {
        let streamed = || async {
            let chunks = (0..8).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![0u8; 512])));
            Body::from_stream(futures::stream::iter(chunks))
        };
        let base = serve(Router::new().route("/stream", get(streamed))).await;

        let err = local_loader(1024).load(&format!("{base}/stream")).await.unwrap_err();
        assert!(matches!(err, ImageLoadError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_oversized_pixel_count_is_rejected() {
        let store = ImageStore::default();
        store.insert("https://img.invalid/huge.png", png(100, 100));
        let loader = HttpImageLoader::new(Client::new(), store).with_policy(FetchPolicy {
            max_pixels: 9_999,
            ..FetchPolicy::default()
        });

        let err = loader.load("https://img.invalid/huge.png").await.unwrap_err();
        assert!(matches!(err, ImageLoadError::TooManyPixels { width: 100, height: 100, .. }));
    }
}
