//! # Artwatch Classification Library
//!
//! The file and network layer under the pipeline:
//! - AES-CTR encrypted file store with seekable plaintext offsets
//! - Download-once store (fetch a URL into an encrypted local file)
//! - Remote classifier HTTP client
//! - Keyed prediction cache with JSON snapshots
//! - Concurrency-bounded directory walker

pub mod cache;
pub mod client;
pub mod crypto;
pub mod fetch;
pub mod walker;

pub use cache::PredictionCache;
pub use client::{Classify, ClassifyError, HttpClassifier};
pub use crypto::{CipherStore, CryptoError};
