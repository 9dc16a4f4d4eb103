mod config;
mod coordinator;
mod errors;
mod extractor;
mod image_store;
mod layout;
mod models;
mod notification;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::extractor::FetchPolicy;
use crate::layout::default_page_config;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting threadkeep v{}", env!("CARGO_PKG_VERSION"));

    tokio::fs::create_dir_all(&config.export_dir)
        .await
        .with_context(|| format!("creating export directory {}", config.export_dir.display()))?;
    info!("Exports are written to {}", config.export_dir.display());

    let fetch = FetchPolicy::from(&config);
    if fetch.allow_private_hosts {
        warn!("Image downloads may reach private and loopback hosts");
    }
    let http = reqwest::Client::builder()
        .timeout(config.image_timeout)
        .redirect(fetch.redirect_policy())
        .build()
        .context("building HTTP client")?;

    // A4 portrait, 10 mm margins, Helvetica 12 pt
    let page_config = default_page_config();
    info!(
        "Page config: {}x{} mm, {}pt text",
        page_config.page_width_mm, page_config.page_height_mm, page_config.font_size_pt
    );

    let state = AppState::new(config.clone(), page_config, http);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
