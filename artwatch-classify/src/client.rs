//! Remote classifier client
//!
//! Uploads a (possibly encrypted) image as a multipart form to the
//! configured endpoint and decodes the `{class: confidence}` response. When
//! the payload is encrypted, the store's passphrase travels along as the
//! `key` query parameter so the endpoint can decrypt server-side.

use artwatch_common::Prediction;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BODY_EXCERPT_LEN: usize = 256;

/// Classifier client errors
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Network communication error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Classifier answered with a non-success status
    #[error("classifier returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// Classification capability; the cache and both services depend on this
/// seam rather than on the HTTP client directly.
#[async_trait]
pub trait Classify: Send + Sync {
    /// Classify a payload. `name` is the uploaded filename, `key` the
    /// server-side decryption parameter (empty for plaintext payloads).
    async fn classify(
        &self,
        name: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<Prediction, ClassifyError>;
}

#[async_trait]
impl<T: Classify + ?Sized> Classify for Arc<T> {
    async fn classify(
        &self,
        name: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<Prediction, ClassifyError> {
        (**self).classify(name, key, payload).await
    }
}

/// Shared HTTP client with the pipeline-wide request timeout.
pub fn default_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()
}

/// HTTP classifier against a configured base URL.
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClassifier {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Classify for HttpClassifier {
    async fn classify(
        &self,
        name: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<Prediction, ClassifyError> {
        let part = Part::bytes(payload).file_name(name.to_string());
        let form = Form::new().part("file", part);

        let mut request = self.client.post(&self.base_url).multipart(form);
        if !key.is_empty() {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(BODY_EXCERPT_LEN).collect();
            return Err(ClassifyError::Upstream {
                status: status.as_u16(),
                body: excerpt,
            });
        }

        let prediction: Prediction = response.json().await?;
        debug!(name, classes = prediction.len(), "classified");
        Ok(prediction)
    }
}
