//! Prediction cache
//!
//! Keyed memoisation of classifier calls. Keys are the stable classifier
//! input identifier: the source URL for remote items, the absolute path for
//! local ones. Entries are immutable once inserted and lookups hand out
//! copies, so callers can run the prediction algebra on a result without
//! corrupting the cache.

use crate::client::{Classify, ClassifyError};
use artwatch_common::{persist, Prediction, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PredictionCache {
    classifier: Arc<dyn Classify>,
    predictions: RwLock<HashMap<String, Prediction>>,
}

impl PredictionCache {
    pub fn new(classifier: Arc<dyn Classify>) -> Self {
        Self {
            classifier,
            predictions: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.predictions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.read().is_empty()
    }

    /// Look up a key, returning an owned copy on a hit.
    pub fn get(&self, key: &str) -> Option<Prediction> {
        self.predictions.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, prediction: Prediction) {
        self.predictions.write().insert(key.into(), prediction);
    }

    /// Classify `payload` under `key`, consulting the cache first.
    ///
    /// The remote call happens outside the lock so a slow endpoint never
    /// blocks hits on unrelated keys. Two concurrent misses on the same key
    /// both call the classifier; the last writer wins. Failures are surfaced
    /// unchanged and never cached.
    pub async fn predict(
        &self,
        key: &str,
        key_param: &str,
        payload: Vec<u8>,
    ) -> std::result::Result<Prediction, ClassifyError> {
        if let Some(hit) = self.get(key) {
            debug!(key, "prediction cache hit");
            return Ok(hit);
        }

        let prediction = self.classifier.classify(key, key_param, payload).await?;
        self.predictions
            .write()
            .insert(key.to_string(), prediction.clone());
        Ok(prediction)
    }

    /// Write a point-in-time snapshot as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = {
            let table = self.predictions.read();
            serde_json::to_value(&*table)?
        };
        persist::save_json(path, &snapshot)?;
        info!(path = %path.display(), entries = self.len(), "saved prediction cache");
        Ok(())
    }

    /// Replace the cache contents from a snapshot file.
    pub fn load(&self, path: &Path) -> Result<()> {
        let table: HashMap<String, Prediction> = persist::load_json(path)?;
        let entries = table.len();
        *self.predictions.write() = table;
        info!(path = %path.display(), entries, "loaded prediction cache");
        Ok(())
    }
}
