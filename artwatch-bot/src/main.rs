//! artwatch-bot entry point
//!
//! Wires the site client, the encrypted download store, the prediction
//! cache, and the notifier into one pipeline and runs it until Ctrl-C.

use anyhow::Result;
use artwatch_bot::bot::BotHandler;
use artwatch_bot::config::BotConfig;
use artwatch_bot::notifier::Notifier;
use artwatch_bot::site::HttpSite;
use artwatch_bot::transport::ConsoleTransport;
use artwatch_bot::watcher::Pipeline;
use artwatch_classify::client::{default_client, HttpClassifier};
use artwatch_classify::{CipherStore, PredictionCache};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = BotConfig::from_env()?;
    info!("starting artwatch-bot");
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                token.cancel();
            }
        });
    }

    let http = default_client()?;
    let store = CipherStore::new(&config.key);
    let classifier = Arc::new(HttpClassifier::new(http.clone(), config.predict_url.clone()));
    let cache = Arc::new(PredictionCache::new(classifier));
    if config.cache_path.exists() {
        if let Err(e) = cache.load(&config.cache_path) {
            warn!(path = %config.cache_path.display(), error = %e, "could not load prediction cache");
        }
    }

    let (transport, events) = ConsoleTransport::connect(&config.chat_token);
    let notifier = Arc::new(Notifier::new(transport.clone(), config.state_path.clone()));
    notifier.load();
    notifier.cleanup().await;

    let handler = BotHandler {
        transport: transport.clone(),
        notifier: Arc::clone(&notifier),
        cache: Arc::clone(&cache),
        store: store.clone(),
    };
    let events_task = {
        let token = token.clone();
        tokio::spawn(async move { handler.run(events, token).await })
    };

    let site = Arc::new(HttpSite::new(http.clone(), config.search_url.clone(), config.sid.clone()));
    let pipeline = Arc::new(Pipeline {
        site,
        cache: Arc::clone(&cache),
        store,
        notifier: Arc::clone(&notifier),
        http,
        token: token.clone(),
        settings: config.pipeline_settings(),
    });

    pipeline.run().await?;
    events_task.await?;

    notifier.prune();
    if let Err(e) = cache.save(&config.cache_path) {
        warn!(path = %config.cache_path.display(), error = %e, "could not save prediction cache");
    }
    info!("artwatch-bot stopped");
    Ok(())
}
