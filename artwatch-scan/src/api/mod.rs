//! HTTP API routes

pub mod classify;
pub mod health;
pub mod stream;

use crate::AppState;
use axum::routing::get;
use axum::Router;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/classify", get(classify::classify))
        .route("/health", get(health::health))
}
