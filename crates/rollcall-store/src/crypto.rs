//! Profile encryption key and sealed blob format.
//!
//! The key is 32 random bytes kept in its own file, created once with
//! owner-only permissions. Losing that file makes every sealed blob
//! permanently unreadable; there is no recovery path.
//!
//! Blob layout:
//! ```text
//! | "RCP1" | key fingerprint (8) | nonce (12) | AES-256-GCM ciphertext + tag |
//! ```
//! The magic and fingerprint are bound to the ciphertext as associated data.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const FINGERPRINT_LEN: usize = 8;
const MAGIC: &[u8; 4] = b"RCP1";
const HEADER_LEN: usize = MAGIC.len() + FINGERPRINT_LEN;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("key file has {actual} bytes, expected 32")]
    InvalidKeyLength { actual: usize },
    #[error("sealed data is truncated ({0} bytes)")]
    Truncated(usize),
    #[error("sealed data has an unknown format")]
    BadMagic,
    #[error("sealed data was written with a different key")]
    KeyMismatch,
    #[error("authenticated decryption failed")]
    Aead,
}

/// Symmetric key for profile data at rest.
#[derive(Clone)]
pub struct ProfileKey {
    bytes: [u8; KEY_LEN],
}

impl std::fmt::Debug for ProfileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileKey")
            .field("fingerprint", &hex(&self.fingerprint()))
            .finish()
    }
}

impl ProfileKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Read the key at `path`, creating it (mode 0600 on unix) if absent.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let raw = fs::read(path)?;
            let bytes: [u8; KEY_LEN] = raw
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength { actual: raw.len() })?;
            let key = Self { bytes };
            tracing::debug!(path = %path.display(), fingerprint = %hex(&key.fingerprint()), "loaded profile key");
            return Ok(key);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let key = Self::generate();
        write_new_file_restricted(path, &key.bytes)?;
        tracing::info!(
            path = %path.display(),
            fingerprint = %hex(&key.fingerprint()),
            "created profile key; back it up, profiles are unreadable without it"
        );
        Ok(key)
    }

    /// First bytes of SHA-256 over the key; identifies the key without revealing it.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        let digest = Sha256::digest(self.bytes);
        let mut out = [0u8; FINGERPRINT_LEN];
        out.copy_from_slice(&digest[..FINGERPRINT_LEN]);
        out
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.bytes).map_err(|_| CryptoError::InvalidKeyLength {
            actual: self.bytes.len(),
        })
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[..MAGIC.len()].copy_from_slice(MAGIC);
        header[MAGIC.len()..].copy_from_slice(&self.fingerprint());
        header
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let header = self.header();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|_| CryptoError::Aead)?;

        let mut blob = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&header);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Verify and decrypt a blob produced by [`seal`](Self::seal).
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Truncated(blob.len()));
        }
        let (header, rest) = blob.split_at(HEADER_LEN);
        if &header[..MAGIC.len()] != MAGIC {
            return Err(CryptoError::BadMagic);
        }
        if header[MAGIC.len()..] != self.fingerprint() {
            return Err(CryptoError::KeyMismatch);
        }
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        self.cipher()?
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| CryptoError::Aead)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn write_new_file_restricted(path: &Path, data: &[u8]) -> Result<(), CryptoError> {
    let mut options = OpenOptions::new();
    options.create_new(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.flush()?;
    Ok(())
}
