//! artwatch-scan - Local Directory Classification Server
//!
//! Walks a local directory tree on request, classifies every image through
//! the shared prediction cache, and streams results back as Server-Sent
//! Events (or one batched JSON array).

pub mod api;

use artwatch_classify::{CipherStore, PredictionCache};
use axum::Router;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<PredictionCache>,
    pub store: CipherStore,
}

/// Build the application router:
/// - GET /classify - walk a directory and stream classification results
/// - GET /health - health check
pub fn build_router(state: AppState) -> Router {
    api::routes().with_state(state)
}
