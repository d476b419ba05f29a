//! Atomic JSON snapshots
//!
//! The prediction cache and the notifier state are persisted as
//! pretty-printed JSON. Writes go to a temporary sibling file first and are
//! renamed into place, so a crash mid-write never leaves a truncated
//! snapshot behind.

use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Serialize `value` as pretty-printed JSON and atomically replace `path`.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut file = match dir {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new_in(".")?,
    };
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Load a JSON snapshot from `path`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
