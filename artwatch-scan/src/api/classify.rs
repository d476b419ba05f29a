//! Directory classification endpoint
//!
//! `GET /classify?dir=<path>[&max=N][&classes=a,b][&min=0.5][&key=K][&stream=false]`
//!
//! Walks `dir`, classifies every image through the shared cache (encrypting
//! payloads in memory when a key is in play, matching the pipeline's upload
//! behavior), and returns results as SSE by default or as one JSON array
//! with `stream=false`. A `key` parameter selects a per-request cipher store
//! in place of the server-wide one.

use crate::api::stream;
use crate::AppState;
use artwatch_classify::walker::{walk, WalkConfig};
use artwatch_classify::CipherStore;
use artwatch_common::Prediction;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const RESULT_BUFFER: usize = 16;

#[derive(Debug, Deserialize)]
pub struct ClassifyParams {
    pub dir: Option<String>,
    pub max: Option<usize>,
    /// Comma-separated class allow-list applied to each result.
    pub classes: Option<String>,
    /// Drop classes below this confidence from each result.
    pub min: Option<f64>,
    /// Per-request encryption passphrase; overrides the server store.
    pub key: Option<String>,
    /// `false` selects one batched JSON array instead of SSE.
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub path: String,
    pub prediction: Prediction,
}

pub async fn classify(
    State(state): State<AppState>,
    Query(params): Query<ClassifyParams>,
) -> Response {
    let Some(dir) = params.dir.clone() else {
        return (StatusCode::BAD_REQUEST, "dir parameter is required").into_response();
    };
    let root = PathBuf::from(&dir);
    if !root.is_dir() {
        return (StatusCode::BAD_REQUEST, "dir must be an existing directory").into_response();
    }

    let min = params.min;
    let classes: Option<Vec<String>> = params.classes.as_deref().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    });
    let store = match params.key.as_deref() {
        Some(key) => CipherStore::new(key),
        None => state.store.clone(),
    };

    let token = CancellationToken::new();
    let (tx, rx) = mpsc::channel(RESULT_BUFFER);
    let config = WalkConfig {
        max: params.max.unwrap_or(0),
        ..Default::default()
    };

    let job = move |path: PathBuf| {
        let state = state.clone();
        let store = store.clone();
        let classes = classes.clone();
        async move {
            let bytes = tokio::fs::read(&path).await?;
            let payload = store.encrypt_bytes(&bytes);
            let key = path.to_string_lossy().to_string();
            let mut prediction = state
                .cache
                .predict(&key, store.key_param(), payload)
                .await?;
            if let Some(min) = min {
                prediction = prediction.minimum(min);
            }
            if let Some(classes) = &classes {
                prediction = prediction.whitelist(classes);
            }
            Ok::<_, anyhow::Error>(ScanResult {
                path: key,
                prediction,
            })
        }
    };

    let walker = walk(token.clone(), root, tx, config, job);

    if params.stream.unwrap_or(true) {
        tokio::spawn(async move {
            if let Err(e) = walker.await {
                warn!(dir = %dir, error = %e, "walk failed");
            }
        });
        stream::sse_response(rx, token)
    } else {
        let (walked, results) = tokio::join!(walker, stream::collect(rx));
        if let Err(e) = walked {
            warn!(dir = %dir, error = %e, "walk failed");
        }
        Json(results).into_response()
    }
}
