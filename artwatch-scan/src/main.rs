//! artwatch-scan entry point

use anyhow::Result;
use artwatch_classify::client::{default_client, HttpClassifier};
use artwatch_classify::{CipherStore, PredictionCache};
use artwatch_common::config;
use artwatch_scan::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bind = config::string_or("BIND", "127.0.0.1:7863");
    let predict_url = config::string_or("PREDICT_URL", "http://localhost:7860/predict");
    let key = config::var("KEY").unwrap_or_default();
    let cache_path = PathBuf::from(config::string_or("CACHE_PATH", "classifications.json"));

    info!("starting artwatch-scan");
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let store = CipherStore::new(&key);
    let classifier = Arc::new(HttpClassifier::new(default_client()?, predict_url));
    let cache = Arc::new(PredictionCache::new(classifier));
    if cache_path.exists() {
        if let Err(e) = cache.load(&cache_path) {
            warn!(path = %cache_path.display(), error = %e, "could not load prediction cache");
        }
    }

    let state = AppState {
        cache: Arc::clone(&cache),
        store,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("listening on http://{bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received, shutting down");
        })
        .await?;

    if let Err(e) = cache.save(&cache_path) {
        warn!(path = %cache_path.display(), error = %e, "could not save prediction cache");
    }
    info!("artwatch-scan stopped");
    Ok(())
}
