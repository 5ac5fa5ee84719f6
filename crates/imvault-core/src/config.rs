//! Key extraction from Signal Desktop `config.json`.
//!
//! Signal Desktop keeps its SQLCipher key in a small JSON document next to
//! the database. Older installs carry the key as plaintext hex under `key`;
//! newer installs seal it with the OS keyring and store the result under
//! `encryptedKey` together with a `safeStorageBackend` identifier. This
//! layer only accepts the plaintext form: unwrapping a keyring-sealed key
//! is only possible on the machine that produced the archive.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;
use zeroize::Zeroize;

use crate::error::{ArchiveError, Result};

/// Canonical key length in hex characters (32 bytes).
pub const KEY_HEX_LEN: usize = 64;

/// The subset of Signal Desktop's `config.json` this layer reads. Unknown
/// fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DesktopConfig {
    key: Option<String>,
    encrypted_key: Option<String>,
    safe_storage_backend: Option<String>,
}

/// A validated 32-byte SQLCipher key.
///
/// Canonical form is 64 lowercase hex characters regardless of input case.
/// The raw bytes are wiped on drop and never appear in `Debug` output or
/// logs.
pub struct ArchiveKey([u8; 32]);

impl ArchiveKey {
    /// Extract the key from the text of a `config.json` document.
    pub fn from_config_json(text: &str) -> Result<Self> {
        let config: DesktopConfig =
            serde_json::from_str(text).map_err(|e| ArchiveError::ConfigParse(e.to_string()))?;

        if let Some(key) = config.key {
            let key = Self::from_hex(&key)?;
            debug!("extracted encryption key from config");
            return Ok(key);
        }

        if let (Some(_), Some(backend)) = (config.encrypted_key, config.safe_storage_backend) {
            return Err(ArchiveError::UnsupportedKeyWrapping { backend });
        }

        Err(ArchiveError::MissingKey)
    }

    /// Read and parse a `config.json` file.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ArchiveError::Storage(format!("read config {}: {}", path.display(), e)))?;
        Self::from_config_json(&text)
    }

    /// Validate and decode a bare hex key.
    ///
    /// Accepts either case and trims surrounding whitespace; requires
    /// exactly [`KEY_HEX_LEN`] hex characters.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let trimmed = hex_key.trim();

        // Charset before length: `zz..` padded to 64 characters is a format
        // problem, not a length problem. The empty string is also a format
        // failure, matching `^[0-9a-fA-F]+$`.
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ArchiveError::InvalidKeyFormat {
                length: trimmed.len(),
            });
        }

        if trimmed.len() != KEY_HEX_LEN {
            return Err(ArchiveError::InvalidKeyLength {
                expected: KEY_HEX_LEN,
                actual: trimmed.len(),
            });
        }

        let raw = hex::decode(trimmed).map_err(|_| ArchiveError::InvalidKeyFormat {
            length: trimmed.len(),
        })?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Ok(ArchiveKey(bytes))
    }

    /// Canonical lowercase hex rendering, used to build the key pragma.
    pub(crate) fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Drop for ArchiveKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ArchiveKey(..)")
    }
}
