//! Health check endpoint

use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "artwatch-scan",
        "version": env!("CARGO_PKG_VERSION"),
        "cached_predictions": state.cache.len(),
    }))
}
