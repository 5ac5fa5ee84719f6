//! Result types for the archive query surface.
//!
//! Everything here is read-only: rows are derived from the store per query
//! and never written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// MARK: - Conversation

/// Whether a conversation is a one-to-one chat or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    /// Map the store's `type` column. Signal Desktop uses `"group"` for
    /// groups and `"private"` for one-to-one chats; anything unrecognized
    /// is treated as direct.
    pub(crate) fn from_store_type(kind: &str) -> Self {
        if kind == "group" {
            ConversationKind::Group
        } else {
            ConversationKind::Direct
        }
    }
}

/// One conversation as listed by the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Store identity.
    pub id: String,

    /// Display name, falling back from the contact name to the profile
    /// name. `None` when the store has neither.
    pub name: Option<String>,

    /// Direct chat or group.
    pub kind: ConversationKind,

    /// Preview text of the most recent message, from the conversation's
    /// metadata blob.
    pub last_message_preview: Option<String>,

    /// Timestamp of the most recent activity.
    pub last_activity_at: Option<DateTime<Utc>>,

    /// Number of messages owned by this conversation, counted live rather
    /// than read from the store's cached counter (which drifts).
    pub message_count: usize,

    /// Unread count from the conversation's metadata blob; zero when the
    /// blob is missing or unreadable.
    pub unread_count: usize,
}

// MARK: - Message

/// Whether a message was sent from this archive's account or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    /// Map the store's message `type` column: `"outgoing"` means sent by
    /// the archive owner, everything else counts as incoming.
    pub(crate) fn from_store_type(kind: &str) -> Self {
        if kind == "outgoing" {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }
}

/// One message within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store identity.
    pub id: String,

    /// Owning conversation.
    pub conversation_id: String,

    /// Sender identity; `None` for own outgoing messages that carry no
    /// explicit source.
    pub sender_id: Option<String>,

    /// Message text; `None` for attachment-only or service rows.
    pub body: Option<String>,

    /// Send timestamp.
    pub sent_at: DateTime<Utc>,

    /// Sent or received.
    pub direction: Direction,

    /// True when the message carries at least one attachment.
    pub has_attachments: bool,
}

/// One page of messages, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,

    /// Total number of messages in the conversation, independent of paging.
    pub total: usize,

    /// 1-based page number this page was fetched with.
    pub page: usize,

    /// Page size this page was fetched with.
    pub page_size: usize,

    /// True when pages beyond this one exist.
    pub has_more: bool,
}

// MARK: - Statistics

/// Aggregate counts over one conversation's messages.
///
/// `total == outgoing + incoming` always holds; queries that produce this
/// type return `None` instead of an all-zero value when a conversation has
/// no messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub conversation_id: String,
    pub total: usize,
    pub outgoing: usize,
    pub incoming: usize,

    /// Earliest `sent_at` among the counted messages.
    pub first_message_at: Option<DateTime<Utc>>,

    /// Latest `sent_at` among the counted messages.
    pub last_message_at: Option<DateTime<Utc>>,
}
