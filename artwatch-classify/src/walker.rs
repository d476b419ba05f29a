//! Directory walker
//!
//! Depth-first traversal that feeds every accepted image to a caller-supplied
//! async job on a concurrency-bounded set of tasks. Results are published on
//! a caller-provided channel which closes once all work has finished or the
//! token is cancelled. Job errors are logged and swallowed; the walk
//! continues.

use artwatch_common::media::is_image;
use std::fmt::Display;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Predicate deciding whether a candidate file is skipped.
pub type Skipper = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Walker errors
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

#[derive(Default)]
pub struct WalkConfig {
    /// Stop accepting files after this many; zero means unlimited.
    pub max: usize,
    /// Concurrent jobs; zero means one per host CPU.
    pub concurrency: usize,
    pub skipper: Option<Skipper>,
}

/// Traverse `root`, running `job` for every accepted image file.
///
/// The `results` sender is consumed; dropping it at the end is what closes
/// the caller's receiving side.
pub async fn walk<R, E, F, Fut>(
    token: CancellationToken,
    root: impl AsRef<Path>,
    results: mpsc::Sender<R>,
    config: WalkConfig,
    job: F,
) -> Result<(), WalkError>
where
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let root = root.as_ref();
    if !root.exists() {
        return Err(WalkError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(WalkError::NotADirectory(root.to_path_buf()));
    }

    let concurrency = if config.concurrency == 0 {
        num_cpus::get()
    } else {
        config.concurrency
    };
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let job = Arc::new(job);
    let mut tasks = JoinSet::new();
    let mut accepted = 0usize;

    for entry in WalkDir::new(root) {
        if token.is_cancelled() || results.is_closed() {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "error accessing entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if !path.to_str().map(is_image).unwrap_or(false) {
            continue;
        }
        if let Some(skipper) = &config.skipper {
            if skipper(&path) {
                continue;
            }
        }
        if config.max > 0 && accepted >= config.max {
            debug!(max = config.max, "walk limit reached");
            break;
        }
        accepted += 1;

        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let job = Arc::clone(&job);
        let results = results.clone();
        let token = token.clone();
        tasks.spawn(async move {
            let _permit = permit;
            if token.is_cancelled() {
                return;
            }
            match job(path.clone()).await {
                Ok(result) => {
                    // Receiver gone means nobody is listening anymore.
                    let _ = results.send(result).await;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "walk job failed"),
            }
        });
    }

    while tasks.join_next().await.is_some() {}
    debug!(accepted, "walk finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::time::Duration;

    fn build_tree(images: usize, extras: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        for i in 0..images {
            let sub = if i % 2 == 0 { "" } else { "nested" };
            std::fs::write(dir.path().join(sub).join(format!("img{i}.png")), b"px").unwrap();
        }
        for i in 0..extras {
            std::fs::write(dir.path().join(format!("note{i}.txt")), b"txt").unwrap();
        }
        dir
    }

    async fn collect(rx: &mut mpsc::Receiver<PathBuf>) -> Vec<PathBuf> {
        let mut all = Vec::new();
        while let Some(path) = rx.recv().await {
            all.push(path);
        }
        all
    }

    #[tokio::test]
    async fn walks_only_images() {
        let tree = build_tree(6, 4);
        let (tx, mut rx) = mpsc::channel(8);
        let walker = walk(
            CancellationToken::new(),
            tree.path(),
            tx,
            WalkConfig::default(),
            |path| async move { Ok::<_, Infallible>(path) },
        );
        let (result, found) = tokio::join!(walker, collect(&mut rx));
        result.unwrap();
        assert_eq!(found.len(), 6);
        assert!(found.iter().all(|p| p.extension().unwrap() == "png"));
    }

    #[tokio::test]
    async fn max_bounds_the_result_count() {
        let tree = build_tree(30, 0);
        let (tx, mut rx) = mpsc::channel(8);
        let walker = walk(
            CancellationToken::new(),
            tree.path(),
            tx,
            WalkConfig {
                max: 10,
                ..Default::default()
            },
            |path| async move { Ok::<_, Infallible>(path) },
        );
        let (result, found) = tokio::join!(walker, collect(&mut rx));
        result.unwrap();
        assert!(found.len() <= 10);
        assert!(!found.is_empty());
    }

    #[tokio::test]
    async fn skipper_filters_candidates() {
        let tree = build_tree(8, 0);
        let (tx, mut rx) = mpsc::channel(8);
        let walker = walk(
            CancellationToken::new(),
            tree.path(),
            tx,
            WalkConfig {
                skipper: Some(Box::new(|path: &Path| {
                    path.to_string_lossy().contains("nested")
                })),
                ..Default::default()
            },
            |path| async move { Ok::<_, Infallible>(path) },
        );
        let (result, found) = tokio::join!(walker, collect(&mut rx));
        result.unwrap();
        assert_eq!(found.len(), 4);
    }

    #[tokio::test]
    async fn job_errors_are_swallowed() {
        let tree = build_tree(4, 0);
        let (tx, mut rx) = mpsc::channel(8);
        let walker = walk(
            CancellationToken::new(),
            tree.path(),
            tx,
            WalkConfig::default(),
            |path: PathBuf| async move {
                if path.to_string_lossy().contains("img0") {
                    Err("synthetic failure")
                } else {
                    Ok(path)
                }
            },
        );
        let (result, found) = tokio::join!(walker, collect(&mut rx));
        result.unwrap();
        assert_eq!(found.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_closes_the_channel_early() {
        let tree = build_tree(50, 0);
        let (tx, mut rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let walker = tokio::spawn(walk(
            token.clone(),
            tree.path().to_path_buf(),
            tx,
            WalkConfig {
                concurrency: 2,
                ..Default::default()
            },
            |path| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, Infallible>(path)
            },
        ));

        let first = rx.recv().await;
        assert!(first.is_some());
        token.cancel();

        let rest = collect(&mut rx).await;
        walker.await.unwrap().unwrap();
        assert!(rest.len() + 1 < 50);
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let (tx, _rx) = mpsc::channel::<PathBuf>(1);
        let err = walk(
            CancellationToken::new(),
            Path::new("/nonexistent/artwatch"),
            tx,
            WalkConfig::default(),
            |path| async move { Ok::<_, Infallible>(path) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WalkError::PathNotFound(_)));
    }
}
