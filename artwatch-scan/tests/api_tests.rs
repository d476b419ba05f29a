//! HTTP API tests for artwatch-scan
//!
//! Exercises the router with `tower::ServiceExt::oneshot`: parameter
//! validation, batched JSON results, and the SSE stream framing.

use artwatch_classify::client::{Classify, ClassifyError};
use artwatch_classify::{CipherStore, PredictionCache};
use artwatch_common::Prediction;
use artwatch_scan::{build_router, AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

struct StubClassifier;

#[async_trait]
impl Classify for StubClassifier {
    async fn classify(
        &self,
        _name: &str,
        _key: &str,
        _payload: Vec<u8>,
    ) -> Result<Prediction, ClassifyError> {
        let mut prediction = Prediction::new();
        prediction.insert("cub", 0.9);
        prediction.insert("feral", 0.2);
        Ok(prediction)
    }
}

fn test_app() -> axum::Router {
    let state = AppState {
        cache: Arc::new(PredictionCache::new(Arc::new(StubClassifier))),
        store: CipherStore::new("secret"),
    };
    build_router(state)
}

fn image_tree(count: usize) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..count {
        std::fs::write(dir.path().join(format!("img{i}.png")), b"px").unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
    dir
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let response = test_app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("\"status\":\"ok\""));
    assert!(body.contains("artwatch-scan"));
}

#[tokio::test]
async fn classify_requires_a_dir_parameter() {
    let response = test_app()
        .oneshot(Request::get("/classify").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn classify_rejects_a_missing_directory() {
    let response = test_app()
        .oneshot(
            Request::get("/classify?dir=/nonexistent/artwatch")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batched_mode_returns_one_json_array() {
    let tree = image_tree(3);
    let uri = format!("/classify?dir={}&stream=false", tree.path().display());
    let response = test_app()
        .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    let results: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(results.len(), 3);
    for result in &results {
        assert!(result["path"].as_str().unwrap().ends_with(".png"));
        assert_eq!(result["prediction"]["cub"].as_f64().unwrap(), 0.9);
    }
}

#[tokio::test]
async fn batched_mode_honors_max_and_filters() {
    let tree = image_tree(5);
    let uri = format!(
        "/classify?dir={}&stream=false&max=2&classes=cub&min=0.5",
        tree.path().display()
    );
    let response = test_app()
        .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_string(response).await;
    let results: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    assert!(results.len() <= 2);
    for result in &results {
        let prediction = result["prediction"].as_object().unwrap();
        assert_eq!(prediction.len(), 1);
        assert!(prediction.contains_key("cub"));
    }
}

/// Records the `key` parameter and payload size of every classify call.
#[derive(Default)]
struct RecordingClassifier {
    calls: std::sync::Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Classify for RecordingClassifier {
    async fn classify(
        &self,
        _name: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<Prediction, ClassifyError> {
        self.calls
            .lock()
            .unwrap()
            .push((key.to_string(), payload.len()));
        let mut prediction = Prediction::new();
        prediction.insert("cub", 0.9);
        Ok(prediction)
    }
}

#[tokio::test]
async fn per_request_key_overrides_the_server_store() {
    // Server store is pass-through; the request supplies its own key.
    let stub = Arc::new(RecordingClassifier::default());
    let state = AppState {
        cache: Arc::new(PredictionCache::new(stub.clone())),
        store: CipherStore::new(""),
    };
    let app = build_router(state);

    let tree = image_tree(1);
    let uri = format!(
        "/classify?dir={}&stream=false&key=topsecret",
        tree.path().display()
    );
    let response = app
        .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let calls = stub.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    // The request key travels to the classifier, and the payload grew by the
    // IV header: the upload was encrypted under the per-request store.
    assert_eq!(calls[0].0, "topsecret");
    assert_eq!(calls[0].1, b"px".len() + 16);
}

#[tokio::test]
async fn without_a_request_key_the_server_store_applies() {
    let stub = Arc::new(RecordingClassifier::default());
    let state = AppState {
        cache: Arc::new(PredictionCache::new(stub.clone())),
        store: CipherStore::new("serverkey"),
    };
    let app = build_router(state);

    let tree = image_tree(1);
    let uri = format!("/classify?dir={}&stream=false", tree.path().display());
    let response = app
        .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let calls = stub.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "serverkey");
    assert_eq!(calls[0].1, b"px".len() + 16);
}

#[tokio::test]
async fn sse_mode_streams_events_and_a_final_exit() {
    let tree = image_tree(2);
    let uri = format!("/classify?dir={}", tree.path().display());
    let response = test_app()
        .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    // The stream is finite: results followed by the exit event.
    let body = body_string(response).await;
    assert_eq!(body.matches("data: {").count(), 2);
    assert!(body.contains("event: exit"));
    assert!(body.ends_with("data: exit\n\n"));
}
