//! Ingestion watcher and submission coordinator
//!
//! Two worker pools drive the pipeline: a wide submission pool and a narrow
//! prediction pool (the classifier endpoint is expensive). The watcher polls
//! upstream and enqueues unseen submissions; each submission job walks its
//! files sequentially, requesting one prediction at a time through a promise
//! so per-submission resource use stays bounded while submissions themselves
//! run in parallel.

use crate::notifier::{Notifier, NotifyResult};
use crate::site::{SearchSite, Submission};
use artwatch_classify::{fetch, CipherStore, PredictionCache};
use artwatch_common::media::is_image;
use artwatch_common::pool::WorkerPool;
use artwatch_common::Prediction;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Tuning knobs for the pipeline; the worker counts are configuration, not
/// contracts.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub classes: Vec<String>,
    pub threshold: f64,
    pub refresh: Duration,
    pub root: PathBuf,
    /// Submission page URL prefix, e.g. `https://example.net/s/`.
    pub link_base: String,
    pub submission_workers: usize,
    pub prediction_workers: usize,
}

/// One file's classification outcome.
#[derive(Debug, Clone)]
pub struct FilePrediction {
    pub url: String,
    pub path: PathBuf,
    pub prediction: Prediction,
}

/// A fully classified submission, ready for the notification decision.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub submission: Submission,
    pub predictions: Vec<FilePrediction>,
}

struct PredictionRequest {
    author: String,
    submission_id: String,
    file_url: String,
}

pub struct Pipeline {
    pub site: Arc<dyn SearchSite>,
    pub cache: Arc<PredictionCache>,
    pub store: CipherStore,
    pub notifier: Arc<Notifier>,
    pub http: reqwest::Client,
    pub token: CancellationToken,
    pub settings: PipelineSettings,
}

impl Pipeline {
    /// Run the watcher, the workers, and the notification decision loop until
    /// the token is cancelled and the queues drain.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let prediction_worker = {
            let pipeline = Arc::clone(&self);
            Arc::new(WorkerPool::new(
                self.settings.prediction_workers,
                move |request: PredictionRequest| {
                    let pipeline = Arc::clone(&pipeline);
                    async move { pipeline.predict_file(request).await }
                },
            ))
        };
        prediction_worker.work();
        // Promises abandoned mid-shutdown fall back to the shared channel;
        // keep it drained so prediction workers never block on it.
        {
            let mut leftovers = prediction_worker.stream();
            tokio::spawn(async move { while leftovers.next().await.is_some() {} });
        }

        let submission_worker = {
            let pipeline = Arc::clone(&self);
            let prediction_worker = Arc::clone(&prediction_worker);
            Arc::new(WorkerPool::new(
                self.settings.submission_workers,
                move |submission: Submission| {
                    let pipeline = Arc::clone(&pipeline);
                    let prediction_worker = Arc::clone(&prediction_worker);
                    async move { pipeline.coordinate(submission, &prediction_worker).await }
                },
            ))
        };
        submission_worker.work();

        let watcher = tokio::spawn(Arc::clone(&self).watch(Arc::clone(&submission_worker)));

        let mut results = submission_worker.stream();
        while let Some(response) = results.next().await {
            let Some(outcome) = response.value else {
                continue;
            };
            self.decide(outcome).await;
        }

        prediction_worker.close();
        watcher.await?;
        info!("pipeline drained");
        Ok(())
    }

    /// Poll upstream and enqueue unseen submissions until cancellation; on
    /// exit the submission worker is closed so the pipeline can drain.
    async fn watch(
        self: Arc<Self>,
        worker: Arc<WorkerPool<Submission, Option<SubmissionOutcome>>>,
    ) {
        let mut rid: Option<String> = None;
        let mut last_prune = Instant::now();
        // Ids already handed to the worker this run; closes the window where
        // a submission is in flight but not yet recorded.
        let mut enqueued = std::collections::HashSet::new();

        while !self.token.is_cancelled() {
            match self.site.search(rid.as_deref()).await {
                Ok(page) => {
                    if page.rid.is_some() {
                        rid = page.rid;
                    }
                    for submission in page.submissions {
                        if self.token.is_cancelled() {
                            break;
                        }
                        if self.notifier.contains(&submission.submission_id)
                            || !enqueued.insert(submission.submission_id.clone())
                        {
                            continue;
                        }
                        if worker.add(submission).await.is_err() {
                            warn!("submission worker closed while enqueueing");
                            return;
                        }
                    }
                }
                // Transient; retried on the next tick.
                Err(e) => warn!(error = %e, "upstream search failed"),
            }

            if last_prune.elapsed() >= PRUNE_INTERVAL {
                self.notifier.prune();
                last_prune = Instant::now();
            }

            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.settings.refresh) => {}
            }
        }

        worker.close();
        debug!("watcher stopped");
    }

    /// Per-submission coordinator: classify every image file sequentially via
    /// prediction promises, then hand the outcome to the decision step.
    async fn coordinate(
        &self,
        submission: Submission,
        prediction_worker: &WorkerPool<PredictionRequest, Option<FilePrediction>>,
    ) -> Option<SubmissionOutcome> {
        if self.notifier.contains(&submission.submission_id) {
            return None;
        }

        let file_count = submission.file_urls().len();
        info!(
            submission = %submission.submission_id,
            author = %submission.username,
            files = file_count,
            "new submission found"
        );

        let mut predictions = Vec::with_capacity(file_count);
        for file_url in submission.file_urls() {
            if self.token.is_cancelled() {
                break;
            }
            if !is_image(file_url) {
                debug!(url = file_url, "skipping non-image file");
                continue;
            }
            let request = PredictionRequest {
                author: submission.username.clone(),
                submission_id: submission.submission_id.clone(),
                file_url: file_url.to_string(),
            };
            let promise = match prediction_worker.promise(request).await {
                Ok(promise) => promise,
                Err(_) => break,
            };
            match promise.await {
                Ok(Some(prediction)) => predictions.push(prediction),
                Ok(None) => {}
                Err(_) => break,
            }
        }

        if predictions.is_empty() {
            warn!(submission = %submission.submission_id, "no prediction found");
            return None;
        }
        Some(SubmissionOutcome {
            submission,
            predictions,
        })
    }

    /// Prediction worker body: ensure the file exists encrypted locally, then
    /// classify it. The encrypted bytes go to the classifier as-is; the store
    /// key parameter asks the endpoint to decrypt server-side.
    async fn predict_file(&self, request: PredictionRequest) -> Option<FilePrediction> {
        let folder = self.settings.root.join(&request.author);
        let file_name = request
            .file_url
            .rsplit('/')
            .next()
            .unwrap_or(request.file_url.as_str());
        let dest = folder.join(file_name);

        if let Err(e) = fetch::fetch(&self.http, &self.store, &self.token, &request.file_url, &dest).await
        {
            error!(
                submission = %request.submission_id,
                url = %request.file_url,
                error = %e,
                "error downloading file"
            );
            return None;
        }

        let payload = match tokio::fs::read(&dest).await {
            Ok(payload) => payload,
            Err(e) => {
                error!(path = %dest.display(), error = %e, "error reading file");
                return None;
            }
        };

        match self
            .cache
            .predict(&request.file_url, self.store.key_param(), payload)
            .await
        {
            Ok(prediction) => {
                debug!(
                    submission = %request.submission_id,
                    url = %request.file_url,
                    classes = prediction.len(),
                    "classified submission file"
                );
                Some(FilePrediction {
                    url: request.file_url,
                    path: dest,
                    prediction,
                })
            }
            Err(e) => {
                error!(submission = %request.submission_id, error = %e, "error predicting submission");
                None
            }
        }
    }

    /// Notification decision: aggregate confidence is the best whitelisted
    /// sum across the submission's files.
    async fn decide(&self, outcome: SubmissionOutcome) {
        let classes = &self.settings.classes;
        let scored = outcome.predictions.iter().map(|file| {
            (
                file,
                file.prediction.clone().whitelist(classes).sum(),
            )
        });
        let Some((winner, aggregate)) = scored.fold(None, |best: Option<(&FilePrediction, f64)>, (file, score)| {
            match best {
                Some((_, top)) if top >= score => best,
                _ => Some((file, score)),
            }
        }) else {
            return;
        };

        let submission_id = &outcome.submission.submission_id;
        let url = format!("{}{}", self.settings.link_base, submission_id);
        let result = NotifyResult {
            submission_id: submission_id.clone(),
            url: url.clone(),
            author: outcome.submission.username.clone(),
            prediction: winner.prediction.clone(),
        };

        if aggregate < self.settings.threshold {
            debug!(
                submission = %submission_id,
                aggregate,
                "below threshold"
            );
            self.notifier.record_unnotified(result);
            return;
        }

        let whitelisted = winner.prediction.clone().whitelist(classes);
        let Some((class, confidence)) = whitelisted.max().map(|(c, v)| (c.to_string(), v)) else {
            self.notifier.record_unnotified(result);
            return;
        };

        let text = format!(
            "⚠️ Detected class {:?} ({:.2}%) for {} by {:?}",
            class,
            confidence * 100.0,
            url,
            outcome.submission.username
        );
        info!("{text}");

        if let Err(e) = self.notifier.notify(&text, result).await {
            error!(submission = %submission_id, error = %e, "error sending notification");
        }
    }
}
