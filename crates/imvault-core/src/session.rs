//! Keyed access to the encrypted archive store.
//!
//! [`ArchiveReader`] is the factory that owns at most one live [`Session`];
//! a successful [`ArchiveReader::open`] supersedes and closes any prior
//! session. The unlock pipeline opens the store file, applies Signal
//! Desktop's SQLCipher parameters, strips malformed triggers once, then
//! confirms the key with a catalog read before handing the session out.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::config::ArchiveKey;
use crate::error::{ArchiveError, Result};
use crate::repair::{strip_malformed_triggers, JsonExtractTriggers, TriggerPolicy};

/// SQLCipher page size used by the producing application.
pub const CIPHER_PAGE_SIZE: u32 = 4096;

/// PBKDF2 iteration count used by the producing application.
pub const KDF_ITERATIONS: u32 = 64_000;

/// Per-page HMAC algorithm used by the producing application.
pub const CIPHER_HMAC_ALGORITHM: &str = "HMAC_SHA512";

/// Key-derivation algorithm used by the producing application.
pub const CIPHER_KDF_ALGORITHM: &str = "PBKDF2_HMAC_SHA512";

/// Factory for archive sessions.
///
/// At most one session per reader is live: `open` closes the session it
/// previously produced once the replacement is verified, so a failed open
/// leaves the existing session usable. Open and close serialize on an
/// internal lock; a session can therefore never be torn down halfway
/// through being handed out.
pub struct ArchiveReader {
    active: Mutex<Option<Session>>,
    policy: Arc<dyn TriggerPolicy>,
}

impl ArchiveReader {
    /// Reader with the default malformed-trigger policy.
    pub fn new() -> Self {
        Self::with_policy(JsonExtractTriggers)
    }

    /// Reader with a custom detection policy, for archives whose corruption
    /// signature differs from the known producer bug.
    pub fn with_policy(policy: impl TriggerPolicy + 'static) -> Self {
        Self {
            active: Mutex::new(None),
            policy: Arc::new(policy),
        }
    }

    /// Open the store at `store_path` with `key`.
    ///
    /// On success any previously opened session is closed and its handles
    /// fail with [`ArchiveError::SessionNotOpen`] from then on. On failure
    /// the prior session stays usable.
    pub fn open(&self, store_path: impl AsRef<Path>, key: &ArchiveKey) -> Result<Session> {
        let mut active = lock(&self.active)?;
        let session = Session::unlock(store_path.as_ref(), key, self.policy.as_ref())?;
        if let Some(prior) = active.replace(session.clone()) {
            prior.close();
        }
        Ok(session)
    }

    /// Close the active session, if any. Safe to call repeatedly.
    pub fn close(&self) -> Result<()> {
        let mut active = lock(&self.active)?;
        if let Some(prior) = active.take() {
            prior.close();
        }
        Ok(())
    }
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new()
    }
}

/// One open, keyed connection to a store.
///
/// Handles are cheap clones sharing one connection; closing any clone (or
/// being superseded at the reader) closes them all. Statements execute one
/// at a time in submission order, so concurrent callers never interleave
/// result sets.
#[derive(Clone, Debug)]
pub struct Session {
    state: Arc<SessionState>,
}

#[derive(Debug)]
struct SessionState {
    /// `None` once closed; queries then fail with `SessionNotOpen`.
    conn: Mutex<Option<Connection>>,
}

impl Session {
    fn unlock(path: &Path, key: &ArchiveKey, policy: &dyn TriggerPolicy) -> Result<Self> {
        // No CREATE flag: a missing store file is an error, not a fresh
        // empty database.
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)
            .map_err(|e| ArchiveError::Storage(format!("open archive {}: {}", path.display(), e)))?;

        apply_cipher_params(&conn, key)?;

        let report = strip_malformed_triggers(&conn, policy);
        debug!(
            scanned = report.scanned,
            removed = report.removed,
            failed = report.failed,
            "trigger repair finished"
        );

        // A wrong key or a non-store file surfaces here, after the repair
        // pass already tolerated the unreadable catalog.
        let tables = count_catalog_tables(&conn)?;
        if tables == 0 {
            return Err(ArchiveError::DecryptionFailed(
                "store catalog lists no tables".into(),
            ));
        }

        info!(path = %path.display(), tables, "archive session opened");
        Ok(Self {
            state: Arc::new(SessionState {
                conn: Mutex::new(Some(conn)),
            }),
        })
    }

    /// True while the session still owns its connection.
    pub fn is_open(&self) -> bool {
        self.state
            .conn
            .lock()
            .map(|conn| conn.is_some())
            .unwrap_or(false)
    }

    /// Release the connection. Idempotent; later queries fail with
    /// [`ArchiveError::SessionNotOpen`].
    pub fn close(&self) {
        if let Ok(mut conn) = self.state.conn.lock() {
            if conn.take().is_some() {
                debug!("archive session closed");
            }
        }
    }

    /// Run a read against the shared connection.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = lock(&self.state.conn)?;
        let conn = guard.as_ref().ok_or(ArchiveError::SessionNotOpen)?;
        f(conn)
    }
}

/// Key the connection exactly the way the producing application does. All
/// five values must match; a mismatch does not raise here but makes every
/// later page read fail or come back empty.
fn apply_cipher_params(conn: &Connection, key: &ArchiveKey) -> Result<()> {
    // The x'..' form supplies the raw 32-byte key, skipping passphrase
    // derivation. The hex is canonical by construction, so interpolating it
    // into the pragma is safe.
    conn.execute_batch(&format!(
        "PRAGMA key = \"x'{}'\";
         PRAGMA cipher_page_size = {};
         PRAGMA kdf_iter = {};
         PRAGMA cipher_hmac_algorithm = {};
         PRAGMA cipher_kdf_algorithm = {};",
        key.to_hex(),
        CIPHER_PAGE_SIZE,
        KDF_ITERATIONS,
        CIPHER_HMAC_ALGORITHM,
        CIPHER_KDF_ALGORITHM,
    ))
    .map_err(|e| ArchiveError::Storage(format!("apply cipher parameters: {}", e)))
}

fn count_catalog_tables(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table'",
        [],
        |row| row.get(0),
    )
    .map_err(|e| ArchiveError::DecryptionFailed(format!("catalog read failed: {}", e)))
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| ArchiveError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_over(conn: Connection) -> Session {
        Session {
            state: Arc::new(SessionState {
                conn: Mutex::new(Some(conn)),
            }),
        }
    }

    #[test]
    fn close_is_idempotent() {
        let session = session_over(Connection::open_in_memory().unwrap());
        assert!(session.is_open());
        session.close();
        session.close();
        assert!(!session.is_open());
    }

    #[test]
    fn queries_after_close_report_not_open() {
        let session = session_over(Connection::open_in_memory().unwrap());
        session.close();
        let err = session.with_conn(|_| Ok(())).unwrap_err();
        assert!(matches!(err, ArchiveError::SessionNotOpen));
    }

    #[test]
    fn clones_share_the_connection_slot() {
        let session = session_over(Connection::open_in_memory().unwrap());
        let twin = session.clone();
        session.close();
        assert!(!twin.is_open());
        assert!(matches!(
            twin.with_conn(|_| Ok(())).unwrap_err(),
            ArchiveError::SessionNotOpen
        ));
    }
}
