//! Imvault Core - Read-only access to encrypted Signal Desktop archives
//!
//! Signal Desktop keeps its message history in an SQLCipher-encrypted
//! SQLite file with the encryption key stored beside it in a JSON config
//! document. This crate unlocks such a store and serves typed queries over
//! it without ever writing user data:
//!
//! - **Config**: key extraction and validation from `config.json`
//! - **Session**: the [`ArchiveReader`] factory and its [`Session`] handle,
//!   applying the producer's exact SQLCipher parameters
//! - **Repair**: one-time removal of trigger definitions the store engine
//!   cannot parse, which would otherwise poison every catalog read
//! - **Queries**: conversation listing, paginated message history,
//!   per-conversation statistics, and body search
//! - **Types**: the plain result types those queries return
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use imvault_core::{ArchiveKey, ArchiveReader};
//!
//! # fn main() -> imvault_core::Result<()> {
//! let key = ArchiveKey::from_config_file(Path::new("config.json"))?;
//! let reader = ArchiveReader::new();
//! let session = reader.open("db.sqlite", &key)?;
//!
//! for conversation in session.list_conversations(20)? {
//!     let page = session.list_messages(&conversation.id, 1, 50)?;
//!     println!(
//!         "{}: {} of {} messages",
//!         conversation.id,
//!         page.messages.len(),
//!         page.total
//!     );
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod queries;
pub mod repair;
pub mod session;
pub mod types;

pub use config::{ArchiveKey, KEY_HEX_LEN};
pub use error::{ArchiveError, Result};
pub use queries::MAX_PAGE_SIZE;
pub use repair::{JsonExtractTriggers, RepairReport, TriggerPolicy};
pub use session::{ArchiveReader, Session};
pub use types::{
    Conversation, ConversationKind, ConversationStats, Direction, Message, MessagePage,
};
