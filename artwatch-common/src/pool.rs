//! Bounded worker pool
//!
//! The concurrency primitive shared by every entry point: a fixed number of
//! worker tasks consume a bounded job queue and publish results either on a
//! shared result channel or, for jobs submitted through [`WorkerPool::promise`],
//! on a dedicated single-use carrier. Both submission paths share the same
//! worker budget.
//!
//! Lifecycle: created, started (idempotent), jobs added, closed (terminal),
//! drained. After [`WorkerPool::close`] the workers finish the queued jobs,
//! the result channel closes, and the result stream terminates naturally.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

type WorkFn<J, R> = dyn Fn(J) -> BoxFuture<'static, R> + Send + Sync;

/// Returned by submission methods once the pool has been closed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("worker pool is closed")]
pub struct PoolClosed;

/// A result published on the shared channel, tagged with its arrival index
/// and the id of the worker that produced it.
#[derive(Debug, Clone)]
pub struct Response<R> {
    pub index: u64,
    pub worker: usize,
    pub value: R,
}

struct Envelope<J, R> {
    job: J,
    /// Single-use carrier for promise submissions. The worker offers the
    /// result here first; an abandoned carrier falls back to the shared
    /// channel.
    promise: Option<oneshot::Sender<R>>,
}

/// Bounded pool of `capacity` workers applying one async function to jobs.
pub struct WorkerPool<J, R> {
    capacity: usize,
    work: Arc<WorkFn<J, R>>,
    jobs_tx: Mutex<Option<mpsc::Sender<Envelope<J, R>>>>,
    jobs_rx: Arc<AsyncMutex<mpsc::Receiver<Envelope<J, R>>>>,
    results_tx: Mutex<Option<mpsc::Sender<Response<R>>>>,
    results_rx: Mutex<Option<mpsc::Receiver<Response<R>>>>,
    started: AtomicBool,
    finished: Arc<AtomicBool>,
    index: Arc<AtomicU64>,
}

impl<J, R> WorkerPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    /// Create a pool with the given worker count. Queues are bounded to the
    /// worker count; workers are not started until [`WorkerPool::work`].
    pub fn new<F, Fut>(capacity: usize, work: F) -> Self
    where
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let capacity = capacity.max(1);
        let (jobs_tx, jobs_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);
        let work: Arc<WorkFn<J, R>> =
            Arc::new(move |job| -> BoxFuture<'static, R> { Box::pin(work(job)) });
        Self {
            capacity,
            work,
            jobs_tx: Mutex::new(Some(jobs_tx)),
            jobs_rx: Arc::new(AsyncMutex::new(jobs_rx)),
            results_tx: Mutex::new(Some(results_tx)),
            results_rx: Mutex::new(Some(results_rx)),
            started: AtomicBool::new(false),
            finished: Arc::new(AtomicBool::new(false)),
            index: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once every worker has exited and the result channel is closed.
    pub fn closed(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Start the workers. Safe to call more than once; only the first call
    /// has an effect.
    pub fn work(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(results_tx) = self.results_tx.lock().take() else {
            return;
        };

        let mut workers = JoinSet::new();
        for worker_id in 0..self.capacity {
            let jobs_rx = Arc::clone(&self.jobs_rx);
            let work = Arc::clone(&self.work);
            let results_tx = results_tx.clone();
            let index = Arc::clone(&self.index);
            workers.spawn(async move {
                loop {
                    // The receiver guard is held only while waiting for the
                    // next job; processing happens outside it.
                    let envelope = {
                        let mut rx = jobs_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(Envelope { job, promise }) = envelope else {
                        break;
                    };
                    let value = work(job).await;
                    let fallback = match promise {
                        Some(carrier) => match carrier.send(value) {
                            Ok(()) => None,
                            // Carrier dropped by the caller; publish on the
                            // shared channel instead.
                            Err(value) => Some(value),
                        },
                        None => Some(value),
                    };
                    if let Some(value) = fallback {
                        let response = Response {
                            index: index.fetch_add(1, Ordering::Relaxed),
                            worker: worker_id,
                            value,
                        };
                        if results_tx.send(response).await.is_err() {
                            // Result consumer is gone; keep draining jobs so
                            // promises still resolve.
                            debug!(worker = worker_id, "result channel dropped");
                        }
                    }
                }
                debug!(worker = worker_id, "worker exiting");
            });
        }

        let finished = Arc::clone(&self.finished);
        tokio::spawn(async move {
            while workers.join_next().await.is_some() {}
            finished.store(true, Ordering::Release);
            drop(results_tx);
        });
    }

    /// Queue a job for the shared result channel. Blocks while the job queue
    /// is full; fails once the pool is closed.
    pub async fn add(&self, job: J) -> Result<(), PoolClosed> {
        let sender = self.jobs_tx.lock().clone();
        let Some(sender) = sender else {
            return Err(PoolClosed);
        };
        sender
            .send(Envelope { job, promise: None })
            .await
            .map_err(|_| PoolClosed)
    }

    /// Queue every job from an iterator, in order.
    pub async fn extend<I>(&self, jobs: I) -> Result<(), PoolClosed>
    where
        I: IntoIterator<Item = J>,
    {
        for job in jobs {
            self.add(job).await?;
        }
        Ok(())
    }

    /// Queue a job whose result is delivered on a private single-use carrier
    /// instead of the shared channel. The carrier receives exactly one value
    /// and then closes.
    pub async fn promise(&self, job: J) -> Result<oneshot::Receiver<R>, PoolClosed> {
        let (carrier, handle) = oneshot::channel();
        let sender = self.jobs_tx.lock().clone();
        let Some(sender) = sender else {
            return Err(PoolClosed);
        };
        sender
            .send(Envelope {
                job,
                promise: Some(carrier),
            })
            .await
            .map_err(|_| PoolClosed)?;
        Ok(handle)
    }

    /// Signal that no more jobs will be added. Workers drain the queue and
    /// exit, then the result channel closes.
    pub fn close(&self) {
        self.jobs_tx.lock().take();
    }

    /// The shared result stream. Finite: it ends when the pool closes and the
    /// queue is drained. Single consumption; a second call yields an already
    /// terminated stream.
    pub fn stream(&self) -> ReceiverStream<Response<R>> {
        match self.results_rx.lock().take() {
            Some(rx) => ReceiverStream::new(rx),
            None => {
                warn!("worker pool results already consumed");
                let (tx, rx) = mpsc::channel(1);
                drop(tx);
                ReceiverStream::new(rx)
            }
        }
    }
}
