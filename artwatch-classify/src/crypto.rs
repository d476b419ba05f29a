//! AES-CTR encrypted file store
//!
//! Files are written as `[16-byte random IV | CTR ciphertext]` under an
//! AES-256 key derived from the user passphrase by SHA-256. An empty
//! passphrase turns the store into a pass-through: file bytes equal
//! plaintext and every operation degrades to plain file I/O.
//!
//! Readers opened through [`CipherStore::open`] expose plaintext offsets;
//! the IV header is never visible to consumers. Decryption does not
//! authenticate — the store is a locally trusted cache, not a boundary
//! against hostile files.

use aes::Aes256;
use cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use ctr::Ctr128BE;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;

/// IV width: one AES block.
pub const IV_LEN: usize = 16;

type Aes256Ctr = Ctr128BE<Aes256>;

/// Stream cipher store errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The ciphertext is shorter than the IV header.
    #[error("encrypted data shorter than its {IV_LEN}-byte IV header")]
    ShortHeader,

    /// A seek would land in or before the IV header.
    #[error("invalid seek: plaintext position would be negative")]
    InvalidSeek,
}

/// Derive a fixed-width AES-256 key from a passphrase.
fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Encrypt-at-rest file store. Cheap to clone; holds only the derived key.
#[derive(Clone)]
pub struct CipherStore {
    passphrase: String,
    key: Option<[u8; 32]>,
}

impl CipherStore {
    /// Build a store from a passphrase. An empty passphrase yields a
    /// pass-through store that applies no encryption.
    pub fn new(passphrase: &str) -> Self {
        let key = if passphrase.is_empty() {
            None
        } else {
            Some(derive_key(passphrase))
        };
        Self {
            passphrase: passphrase.to_string(),
            key,
        }
    }

    /// The passphrase forwarded to the classifier as its `key` query
    /// parameter; empty in pass-through mode.
    pub fn key_param(&self) -> &str {
        &self.passphrase
    }

    pub fn is_passthrough(&self) -> bool {
        self.key.is_none()
    }

    fn cipher(&self, iv: &[u8; IV_LEN]) -> Option<Aes256Ctr> {
        self.key
            .as_ref()
            .map(|key| Aes256Ctr::new(key.into(), iv.into()))
    }

    fn fresh_iv() -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        iv
    }

    /// Encrypt an in-memory payload into `[IV | ciphertext]`.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Vec<u8> {
        if self.is_passthrough() {
            return plaintext.to_vec();
        }
        let iv = Self::fresh_iv();
        let mut out = Vec::with_capacity(IV_LEN + plaintext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(plaintext);
        if let Some(mut cipher) = self.cipher(&iv) {
            cipher.apply_keystream(&mut out[IV_LEN..]);
        }
        out
    }

    /// Reverse [`CipherStore::encrypt_bytes`].
    pub fn decrypt_bytes(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if self.is_passthrough() {
            return Ok(data.to_vec());
        }
        if data.len() < IV_LEN {
            return Err(CryptoError::ShortHeader);
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&data[..IV_LEN]);
        let mut plaintext = data[IV_LEN..].to_vec();
        if let Some(mut cipher) = self.cipher(&iv) {
            cipher.apply_keystream(&mut plaintext);
        }
        Ok(plaintext)
    }

    /// Wrap a writer so plaintext written to it lands encrypted, with the IV
    /// emitted ahead of the first ciphertext byte.
    pub fn encrypt_writer<W: Write>(&self, inner: W) -> EncryptWriter<W> {
        if self.is_passthrough() {
            return EncryptWriter {
                inner,
                cipher: None,
                pending_iv: None,
            };
        }
        let iv = Self::fresh_iv();
        EncryptWriter {
            cipher: self.cipher(&iv),
            pending_iv: Some(iv),
            inner,
        }
    }

    /// Wrap a reader so it yields the IV followed by ciphertext of the
    /// wrapped reader's bytes.
    pub fn encrypt_reader<R: Read>(&self, inner: R) -> EncryptReader<R> {
        if self.is_passthrough() {
            return EncryptReader {
                inner,
                cipher: None,
                header: Vec::new(),
                served: 0,
            };
        }
        let iv = Self::fresh_iv();
        EncryptReader {
            cipher: self.cipher(&iv),
            header: iv.to_vec(),
            served: 0,
            inner,
        }
    }

    /// Wrap a reader positioned at an IV header so it yields plaintext.
    pub fn decrypt_reader<R: Read>(&self, mut inner: R) -> Result<DecryptReader<R>, CryptoError> {
        if self.is_passthrough() {
            return Ok(DecryptReader {
                inner,
                cipher: None,
            });
        }
        let mut iv = [0u8; IV_LEN];
        inner.read_exact(&mut iv).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                CryptoError::ShortHeader
            } else {
                CryptoError::Io(e)
            }
        })?;
        Ok(DecryptReader {
            cipher: self.cipher(&iv),
            inner,
        })
    }

    /// Open an encrypted file with plaintext offsets. `Seek(0, Start)` lands
    /// on the first plaintext byte, one block into the file.
    pub fn open(&self, path: &Path) -> Result<CipherFile, CryptoError> {
        let mut file = File::open(path)?;
        if self.is_passthrough() {
            return Ok(CipherFile { file, cipher: None });
        }
        let mut iv = [0u8; IV_LEN];
        file.read_exact(&mut iv).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                CryptoError::ShortHeader
            } else {
                CryptoError::Io(e)
            }
        })?;
        Ok(CipherFile {
            cipher: self.cipher(&iv),
            file,
        })
    }
}

/// Encrypting writer; see [`CipherStore::encrypt_writer`].
pub struct EncryptWriter<W: Write> {
    inner: W,
    cipher: Option<Aes256Ctr>,
    pending_iv: Option<[u8; IV_LEN]>,
}

impl<W: Write> Write for EncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(iv) = self.pending_iv.take() {
            self.inner.write_all(&iv)?;
        }
        match &mut self.cipher {
            Some(cipher) => {
                let mut chunk = buf.to_vec();
                cipher.apply_keystream(&mut chunk);
                self.inner.write_all(&chunk)?;
                Ok(buf.len())
            }
            None => self.inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        // An empty payload must still carry its header.
        if let Some(iv) = self.pending_iv.take() {
            self.inner.write_all(&iv)?;
        }
        self.inner.flush()
    }
}

/// Encrypting reader; see [`CipherStore::encrypt_reader`].
pub struct EncryptReader<R: Read> {
    inner: R,
    cipher: Option<Aes256Ctr>,
    header: Vec<u8>,
    served: usize,
}

impl<R: Read> Read for EncryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.served < self.header.len() {
            let n = (self.header.len() - self.served).min(buf.len());
            buf[..n].copy_from_slice(&self.header[self.served..self.served + n]);
            self.served += n;
            return Ok(n);
        }
        let n = self.inner.read(buf)?;
        if let Some(cipher) = &mut self.cipher {
            cipher.apply_keystream(&mut buf[..n]);
        }
        Ok(n)
    }
}

/// Decrypting reader; see [`CipherStore::decrypt_reader`].
pub struct DecryptReader<R: Read> {
    inner: R,
    cipher: Option<Aes256Ctr>,
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(cipher) = &mut self.cipher {
            cipher.apply_keystream(&mut buf[..n]);
        }
        Ok(n)
    }
}

/// An open encrypted file whose logical offset is the plaintext offset.
pub struct CipherFile {
    file: File,
    cipher: Option<Aes256Ctr>,
}

impl std::fmt::Debug for CipherFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherFile")
            .field("file", &self.file)
            .field("cipher", &self.cipher.is_some())
            .finish()
    }
}

impl Read for CipherFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        if let Some(cipher) = &mut self.cipher {
            cipher.apply_keystream(&mut buf[..n]);
        }
        Ok(n)
    }
}

impl Seek for CipherFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let Some(cipher) = self.cipher.as_mut() else {
            return self.file.seek(pos);
        };
        let iv = IV_LEN as i128;
        let target: i128 = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => {
                let physical = self.file.stream_position()? as i128;
                physical - iv + delta as i128
            }
            SeekFrom::End(delta) => {
                let len = self.file.metadata()?.len() as i128;
                len - iv + delta as i128
            }
        };
        // Landing in or before the IV header would decrypt header bytes as
        // data; refuse instead of clamping.
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                CryptoError::InvalidSeek,
            ));
        }
        let target = target as u64;
        self.file.seek(SeekFrom::Start(target + IV_LEN as u64))?;
        cipher
            .try_seek(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "keystream position overflow"))?;
        Ok(target)
    }
}
