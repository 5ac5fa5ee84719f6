//! Shared fixtures: real SQLCipher-encrypted archive files on disk.
//!
//! The cipher settings restate the producing application's values as
//! literals, independent of the crate constants under test.

#![allow(dead_code)]

use std::path::PathBuf;

use rusqlite::{params, Connection};
use tempfile::TempDir;

use imvault_core::ArchiveKey;

/// Key used for every encrypted fixture.
pub const TEST_KEY_HEX: &str = "b0b1b2b3b4b5b6b7b8b9babbbcbdbebfc0c1c2c3c4c5c6c7c8c9cacbcccdcecf";

/// Base timestamp for seeded rows, in Unix milliseconds.
pub const BASE_MS: i64 = 1_700_000_000_000;

fn apply_producer_cipher(conn: &Connection, key_hex: &str) {
    conn.execute_batch(&format!(
        "PRAGMA key = \"x'{}'\";
         PRAGMA cipher_page_size = 4096;
         PRAGMA kdf_iter = 64000;
         PRAGMA cipher_hmac_algorithm = HMAC_SHA512;
         PRAGMA cipher_kdf_algorithm = PBKDF2_HMAC_SHA512;",
        key_hex
    ))
    .expect("apply cipher settings");
}

/// An encrypted store file in a temporary directory.
pub struct ArchiveFixture {
    _dir: TempDir,
    pub store_path: PathBuf,
}

impl ArchiveFixture {
    /// Encrypted store with the conversations/messages schema and no rows.
    pub fn empty() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("tempdir");
        let store_path = dir.path().join("db.sqlite");
        let conn = Connection::open(&store_path).expect("create store");
        apply_producer_cipher(&conn, TEST_KEY_HEX);
        conn.execute_batch(
            "CREATE TABLE conversations (
                 id TEXT PRIMARY KEY,
                 name TEXT,
                 profileName TEXT,
                 type TEXT,
                 active_at INTEGER,
                 json TEXT
             );
             CREATE TABLE messages (
                 id TEXT PRIMARY KEY,
                 conversationId TEXT,
                 source TEXT,
                 sourceServiceId TEXT,
                 body TEXT,
                 sent_at INTEGER,
                 type TEXT,
                 hasAttachments INTEGER
             );",
        )
        .expect("create schema");
        Self {
            _dir: dir,
            store_path,
        }
    }

    /// Encrypted store with two conversations and a few messages.
    pub fn seeded() -> Self {
        let fixture = Self::empty();
        {
            let conn = fixture.raw_connection();
            insert_conversation(&conn, "conv-a", Some("Ada"), "private", Some(BASE_MS), None);
            insert_conversation(
                &conn,
                "conv-b",
                Some("Reading group"),
                "group",
                Some(BASE_MS - 1_000),
                None,
            );
            insert_message(&conn, "m1", "conv-a", Some("hello"), BASE_MS - 30, "incoming");
            insert_message(&conn, "m2", "conv-a", Some("hi back"), BASE_MS - 20, "outgoing");
            insert_message(
                &conn,
                "m3",
                "conv-b",
                Some("meeting moved to noon"),
                BASE_MS - 10,
                "incoming",
            );
        }
        fixture
    }

    /// Reopen the store with the producer's cipher settings, outside the
    /// crate under test. Used to seed rows and inspect the catalog.
    pub fn raw_connection(&self) -> Connection {
        let conn = Connection::open(&self.store_path).expect("open store");
        apply_producer_cipher(&conn, TEST_KEY_HEX);
        conn
    }

    pub fn key(&self) -> ArchiveKey {
        ArchiveKey::from_hex(TEST_KEY_HEX).expect("fixture key")
    }
}

/// Insert a conversation row; `profileName` stays NULL.
pub fn insert_conversation(
    conn: &Connection,
    id: &str,
    name: Option<&str>,
    kind: &str,
    active_at: Option<i64>,
    json: Option<&str>,
) {
    conn.execute(
        "INSERT INTO conversations (id, name, profileName, type, active_at, json)
         VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
        params![id, name, kind, active_at, json],
    )
    .expect("insert conversation");
}

/// Insert a message row with NULL sender columns and no attachments.
pub fn insert_message(
    conn: &Connection,
    id: &str,
    conversation_id: &str,
    body: Option<&str>,
    sent_at: i64,
    kind: &str,
) {
    conn.execute(
        "INSERT INTO messages (id, conversationId, source, sourceServiceId, body, sent_at, type,
                               hasAttachments)
         VALUES (?1, ?2, NULL, NULL, ?3, ?4, ?5, 0)",
        params![id, conversation_id, body, sent_at, kind],
    )
    .expect("insert message");
}

/// Add a trigger on the messages table. `malformed` selects a body using
/// the `->>` JSON extraction form.
pub fn insert_trigger(conn: &Connection, name: &str, malformed: bool) {
    let body = if malformed {
        "UPDATE conversations SET json = new.body ->> '$.preview' WHERE id = new.conversationId;"
    } else {
        "UPDATE conversations SET active_at = new.sent_at WHERE id = new.conversationId;"
    };
    conn.execute_batch(&format!(
        "CREATE TRIGGER {} AFTER INSERT ON messages BEGIN {} END;",
        name, body
    ))
    .expect("create trigger");
}

/// Names of all triggers in the store's catalog, sorted.
pub fn trigger_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'trigger' ORDER BY name")
        .expect("prepare");
    stmt.query_map([], |row| row.get(0))
        .expect("query triggers")
        .collect::<Result<Vec<String>, _>>()
        .expect("collect triggers")
}

/// Opt into log output with `RUST_LOG=imvault_core=debug`.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
