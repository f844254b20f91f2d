use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use liveface_core::{Gallery, RemoteInference};

mod config;
mod http;
mod sessions;

use config::Config;
use http::AppState;
use sessions::SessionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("livefaced starting");

    let config = Config::from_env();
    let inference = RemoteInference::new(config.inference_url.clone());

    // Gallery load is fail-fast: a missing directory or zero usable
    // reference images means nothing to authenticate against.
    let gallery = {
        let mut encoder = inference.clone();
        Gallery::load(&config.gallery_dir, &mut encoder).with_context(|| {
            format!(
                "failed to load face gallery from {}",
                config.gallery_dir.display()
            )
        })?
    };
    tracing::info!(
        identities = gallery.len(),
        dir = %config.gallery_dir.display(),
        "face gallery loaded"
    );

    let sessions = SessionRegistry::new(Duration::from_secs(config.session_idle_secs));
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        config,
        gallery,
        extractor: Mutex::new(Box::new(inference.clone())),
        encoder: Mutex::new(Box::new(inference)),
        sessions,
    });

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "livefaced ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("livefaced shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
