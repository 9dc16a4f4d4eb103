use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};

/// Application configuration loaded from environment variables.
/// Every variable has a default; a value that does not parse fails startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Directory finished PDFs are written to and served from.
    pub export_dir: PathBuf,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub extraction_timeout: Duration,
    pub image_timeout: Duration,
    /// Lets image downloads reach loopback and private networks.
    pub allow_private_image_hosts: bool,
    pub max_image_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            rust_log: "info".to_string(),
            export_dir: PathBuf::from("./exports"),
            poll_interval: Duration::from_millis(500),
            poll_max_attempts: 240,
            extraction_timeout: Duration::from_secs(120),
            image_timeout: Duration::from_secs(30),
            allow_private_image_hosts: false,
            max_image_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();
        let config = Config {
            port: parse_env("PORT", defaults.port)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or(defaults.rust_log),
            export_dir: std::env::var("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.export_dir),
            poll_interval: Duration::from_millis(parse_env("POLL_INTERVAL_MS", 500u64)?),
            poll_max_attempts: parse_env("POLL_MAX_ATTEMPTS", defaults.poll_max_attempts)?,
            extraction_timeout: Duration::from_secs(parse_env("EXTRACTION_TIMEOUT_SECS", 120u64)?),
            image_timeout: Duration::from_secs(parse_env("IMAGE_TIMEOUT_SECS", 30u64)?),
            allow_private_image_hosts: parse_env(
                "ALLOW_PRIVATE_IMAGE_HOSTS",
                defaults.allow_private_image_hosts,
            )?,
            max_image_bytes: parse_env("MAX_IMAGE_BYTES", defaults.max_image_bytes)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that parse but cannot drive an export.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.poll_max_attempts > 0,
            "POLL_MAX_ATTEMPTS must be at least 1"
        );
        ensure!(!self.poll_interval.is_zero(), "POLL_INTERVAL_MS must be at least 1");
        ensure!(
            !self.extraction_timeout.is_zero(),
            "EXTRACTION_TIMEOUT_SECS must be at least 1"
        );
        ensure!(!self.image_timeout.is_zero(), "IMAGE_TIMEOUT_SECS must be at least 1");
        ensure!(self.max_image_bytes > 0, "MAX_IMAGE_BYTES must be at least 1");
        Ok(())
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}
