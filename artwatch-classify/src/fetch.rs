//! Download-once store
//!
//! Fetches a URL into an encrypted file at a deterministic path. The body is
//! streamed through the cipher store into a temporary sibling file and
//! renamed into place on success, so a partially downloaded file never
//! appears at the destination. Concurrent fetches of the same destination
//! may both download; the last rename wins with identical plaintext.

use crate::crypto::{CipherFile, CipherStore, CryptoError};
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Download store errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("canceled")]
    Canceled,
}

/// Ensure `dest` holds the (encrypted) contents of `url` and open it.
///
/// When the destination already exists the network is not touched at all.
pub async fn fetch(
    client: &reqwest::Client,
    store: &CipherStore,
    token: &CancellationToken,
    url: &str,
    dest: &Path,
) -> Result<CipherFile, FetchError> {
    if dest.exists() {
        return Ok(store.open(dest)?);
    }
    if token.is_cancelled() {
        return Err(FetchError::Canceled);
    }

    let response = client.get(url).send().await?.error_for_status()?;

    let dir = dest.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
    }
    // Temporary sibling in the destination directory keeps the final rename
    // atomic on the same filesystem.
    let mut tmp = match dir {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new_in(".")?,
    };

    {
        let mut writer = store.encrypt_writer(tmp.as_file_mut());
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            if token.is_cancelled() {
                return Err(FetchError::Canceled);
            }
            writer.write_all(&chunk?)?;
        }
        writer.flush()?;
    }

    tmp.persist(dest).map_err(|e| FetchError::Filesystem(e.error))?;
    debug!(url, dest = %dest.display(), "downloaded");
    Ok(store.open(dest)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existing_destination_skips_the_network() {
        let store = CipherStore::new("secret");
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("author/image.png");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, store.encrypt_bytes(b"cached bytes")).unwrap();

        // The URL is unroutable; an attempted download would fail.
        let client = reqwest::Client::new();
        let token = CancellationToken::new();
        let mut file = fetch(
            &client,
            &store,
            &token,
            "http://invalid.invalid/image.png",
            &dest,
        )
        .await
        .unwrap();

        let mut contents = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut contents).unwrap();
        assert_eq!(contents, b"cached bytes");
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_the_request() {
        let store = CipherStore::new("");
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image.png");

        let client = reqwest::Client::new();
        let token = CancellationToken::new();
        token.cancel();
        let err = fetch(
            &client,
            &store,
            &token,
            "http://invalid.invalid/image.png",
            &dest,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::Canceled));
        assert!(!dest.exists());
    }
}
