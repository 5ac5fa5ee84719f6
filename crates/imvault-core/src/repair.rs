//! Removal of trigger definitions the store engine cannot parse.
//!
//! Signal Desktop schemas define triggers that use the `->>` JSON operator
//! (SQLite 3.38+). A store engine built against an older parser raises
//! SQLITE_CORRUPT on every catalog read until those definitions are gone,
//! even though the row data is intact and a read-only consumer never fires
//! triggers. The repair deletes matching definitions straight out of
//! `sqlite_master` under `writable_schema`, because a schema-aware
//! `DROP TRIGGER` would itself have to parse the broken definition.

use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

/// Decides which trigger definitions must be stripped before the schema can
/// be loaded. The signature of the corruption is tied to one producer bug,
/// so the predicate is swappable in case it varies across producer versions.
pub trait TriggerPolicy: Send + Sync {
    /// True when the `CREATE TRIGGER` text cannot be parsed by this build.
    fn is_malformed(&self, sql: &str) -> bool;
}

/// Default policy: any trigger using the `->>` JSON extraction operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExtractTriggers;

impl TriggerPolicy for JsonExtractTriggers {
    fn is_malformed(&self, sql: &str) -> bool {
        sql.contains(">>")
    }
}

/// What one repair pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Trigger definitions found in the catalog.
    pub scanned: usize,

    /// Definitions deleted.
    pub removed: usize,

    /// Deletions that failed and were skipped.
    pub failed: usize,

    /// First row of the post-repair consistency check, when one ran.
    pub integrity: Option<String>,
}

/// Holds `writable_schema` on for its lifetime. Release runs on every exit
/// path, early returns included.
struct WritableSchema<'c> {
    conn: &'c Connection,
}

impl<'c> WritableSchema<'c> {
    fn enable(conn: &'c Connection) -> rusqlite::Result<Self> {
        conn.pragma_update(None, "writable_schema", true)?;
        Ok(Self { conn })
    }
}

impl Drop for WritableSchema<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.pragma_update(None, "writable_schema", false) {
            warn!("could not leave writable_schema mode: {}", e);
        }
    }
}

/// Strip malformed triggers from an open store.
///
/// Best-effort throughout: a failed catalog enumeration counts as zero
/// triggers, per-trigger deletion failures are logged and skipped, and the
/// consistency check verdict is recorded but never fatal. Repairing an
/// already-clean store is a no-op.
pub fn strip_malformed_triggers(conn: &Connection, policy: &dyn TriggerPolicy) -> RepairReport {
    let mut report = RepairReport::default();

    {
        let _writable = match WritableSchema::enable(conn) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("could not enter writable_schema mode: {}", e);
                return report;
            }
        };

        let triggers = match list_triggers(conn) {
            Ok(triggers) => triggers,
            Err(e) => {
                warn!("could not enumerate triggers: {}", e);
                Vec::new()
            }
        };
        report.scanned = triggers.len();

        if triggers.is_empty() {
            debug!("no triggers found");
            return report;
        }

        for (name, sql) in &triggers {
            if !policy.is_malformed(sql) {
                continue;
            }
            match conn.execute(
                "DELETE FROM sqlite_master WHERE type = 'trigger' AND name = ?1",
                params![name],
            ) {
                Ok(_) => {
                    debug!(trigger = %name, "removed malformed trigger");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(trigger = %name, "could not remove trigger: {}", e);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 {
            info!(
                scanned = report.scanned,
                removed = report.removed,
                failed = report.failed,
                "stripped malformed triggers"
            );
        }
    }

    // Forces the engine to rebuild its cached schema; the verdict itself is
    // informational only.
    match conn.query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0)) {
        Ok(verdict) => {
            debug!(%verdict, "integrity check after trigger repair");
            report.integrity = Some(verdict);
        }
        Err(e) => warn!("integrity check failed: {}", e),
    }

    report
}

/// Raw catalog read, bypassing any schema-aware statement.
fn list_triggers(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT name, sql FROM sqlite_master WHERE type = 'trigger'")?;
    let rows = stmt.query_map([], |row| {
        let name: String = row.get(0)?;
        let sql: Option<String> = row.get(1)?;
        Ok((name, sql.unwrap_or_default()))
    })?;
    rows.collect()
}
