//! Configuration resolution for artwatch-bot
//!
//! Everything comes from `ARTWATCH_*` environment variables at startup.
//! Missing credentials are fatal; tunables fall back to their defaults.

use crate::watcher::PipelineSettings;
use artwatch_common::{config, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Upstream session token.
    pub sid: String,
    /// Upstream search endpoint.
    pub search_url: String,
    /// Chat transport token.
    pub chat_token: String,
    /// Submission page URL prefix used in message bodies.
    pub link_base: String,
    pub predict_url: String,
    /// Encryption passphrase; empty selects pass-through storage.
    pub key: String,
    pub classes: Vec<String>,
    pub threshold: f64,
    pub refresh: Duration,
    pub root: PathBuf,
    pub cache_path: PathBuf,
    pub state_path: PathBuf,
    pub submission_workers: usize,
    pub prediction_workers: usize,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            sid: config::required("SID")?,
            search_url: config::required("SEARCH_URL")?,
            chat_token: config::required("CHAT_TOKEN")?,
            link_base: config::required("LINK_BASE")?,
            predict_url: config::string_or("PREDICT_URL", "http://localhost:7860/predict"),
            key: config::var("KEY").unwrap_or_default(),
            classes: config::list_or("CLASSES", &["cub"]),
            threshold: config::parse_or("THRESHOLD", 0.75),
            refresh: config::duration_secs_or("REFRESH_SECONDS", 30),
            root: PathBuf::from(config::string_or("ROOT", "artwatch")),
            cache_path: PathBuf::from(config::string_or("CACHE_PATH", "classifications.json")),
            state_path: PathBuf::from(config::string_or("STATE_PATH", "notifier.json")),
            submission_workers: config::parse_or("SUBMISSION_WORKERS", 30),
            prediction_workers: config::parse_or("PREDICTION_WORKERS", 5),
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            classes: self.classes.clone(),
            threshold: self.threshold,
            refresh: self.refresh,
            root: self.root.clone(),
            link_base: self.link_base.clone(),
            submission_workers: self.submission_workers,
            prediction_workers: self.prediction_workers,
        }
    }
}
