//! Typed read queries over an open archive session.
//!
//! All operations require an open [`Session`] and surface
//! [`ArchiveError::SessionNotOpen`] once the session is closed or
//! superseded. Pagination arguments are validated before the store is
//! touched.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Row};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::session::Session;
use crate::types::{
    Conversation, ConversationKind, ConversationStats, Direction, Message, MessagePage,
};

/// Upper bound on `page_size` accepted by [`Session::list_messages`].
pub const MAX_PAGE_SIZE: usize = 500;

impl Session {
    /// List conversations ordered by most recent activity, newest first.
    ///
    /// `message_count` is counted live from the message table; the counter
    /// cached in the metadata blob drifts and is not trusted.
    pub fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.profileName, c.type, c.active_at, c.json,
                        (SELECT COUNT(*) FROM messages m WHERE m.conversationId = c.id)
                 FROM conversations c
                 ORDER BY c.active_at DESC
                 LIMIT ?1",
            )?;
            let conversations = stmt
                .query_map(params![limit as i64], row_to_conversation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            debug!(count = conversations.len(), "listed conversations");
            Ok(conversations)
        })
    }

    /// Count all conversations in the store.
    pub fn count_conversations(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// One page of a conversation's messages, newest first.
    ///
    /// `page` starts at 1; `page_size` must be within `1..=MAX_PAGE_SIZE`.
    /// A page past the end of the conversation is empty, not an error.
    pub fn list_messages(
        &self,
        conversation_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<MessagePage> {
        if page < 1 {
            return Err(ArchiveError::InvalidPagination(format!(
                "page starts at 1, got {}",
                page
            )));
        }
        if page_size < 1 || page_size > MAX_PAGE_SIZE {
            return Err(ArchiveError::InvalidPagination(format!(
                "page_size must be within 1..={}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }
        let offset = page
            .checked_sub(1)
            .and_then(|p| p.checked_mul(page_size))
            .filter(|&o| i64::try_from(o).is_ok());

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversationId = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            let total = total as usize;

            // An offset outside the store's signed range lies past the end
            // of any conversation.
            let Some(offset) = offset else {
                debug!(
                    conversation = %conversation_id,
                    page,
                    total,
                    "page offset exceeds the store's range"
                );
                return Ok(MessagePage {
                    messages: Vec::new(),
                    total,
                    page,
                    page_size,
                    has_more: false,
                });
            };

            let mut stmt = conn.prepare(
                "SELECT id, conversationId, sourceServiceId, source, body, sent_at, type,
                        hasAttachments
                 FROM messages
                 WHERE conversationId = ?1
                 ORDER BY sent_at DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let messages = stmt
                .query_map(
                    params![conversation_id, page_size as i64, offset as i64],
                    row_to_message,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let has_more = offset.saturating_add(messages.len()) < total;
            debug!(
                conversation = %conversation_id,
                page,
                returned = messages.len(),
                total,
                "listed messages"
            );

            Ok(MessagePage {
                messages,
                total,
                page,
                page_size,
                has_more,
            })
        })
    }

    /// Aggregate counts and the activity span for one conversation.
    ///
    /// `None` when the conversation owns no messages, which also covers
    /// unknown conversation ids. Rows that are neither outgoing nor
    /// incoming (service events) count toward `incoming`.
    pub fn conversation_stats(&self, conversation_id: &str) -> Result<Option<ConversationStats>> {
        self.with_conn(|conn| {
            let (total, outgoing, first_ms, last_ms) = conn.query_row(
                "SELECT COUNT(*),
                        SUM(CASE WHEN type = 'outgoing' THEN 1 ELSE 0 END),
                        MIN(sent_at),
                        MAX(sent_at)
                 FROM messages
                 WHERE conversationId = ?1",
                params![conversation_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )?;

            if total == 0 {
                return Ok(None);
            }

            let total = total as usize;
            let outgoing = outgoing.unwrap_or(0) as usize;
            Ok(Some(ConversationStats {
                conversation_id: conversation_id.to_string(),
                total,
                outgoing,
                incoming: total - outgoing,
                first_message_at: first_ms.and_then(non_zero_millis),
                last_message_at: last_ms.and_then(non_zero_millis),
            }))
        })
    }

    /// Messages whose body contains `query` as a substring, newest first,
    /// optionally scoped to one conversation. Matching follows the store's
    /// `LIKE` semantics, so ASCII letters compare case-insensitively.
    pub fn search_messages(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT id, conversationId, sourceServiceId, source, body, sent_at, type,
                        hasAttachments
                 FROM messages
                 WHERE body LIKE ?",
            );
            let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(format!("%{}%", query))];

            if let Some(id) = conversation_id {
                sql.push_str(" AND conversationId = ?");
                values.push(Box::new(id.to_string()));
            }

            sql.push_str(" ORDER BY sent_at DESC LIMIT ?");
            values.push(Box::new(limit as i64));

            let bindings: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|v| v.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let messages = stmt
                .query_map(bindings.as_slice(), row_to_message)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            debug!(matches = messages.len(), "searched message bodies");
            Ok(messages)
        })
    }
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let name: Option<String> = row.get(1)?;
    let profile_name: Option<String> = row.get(2)?;
    let kind: Option<String> = row.get(3)?;
    let active_at: Option<i64> = row.get(4)?;
    let blob: Option<String> = row.get(5)?;
    let message_count: i64 = row.get(6)?;

    let meta = ConversationMeta::parse(&id, blob.as_deref());

    Ok(Conversation {
        name: non_empty(name).or_else(|| non_empty(profile_name)),
        kind: ConversationKind::from_store_type(kind.as_deref().unwrap_or("private")),
        last_message_preview: meta.last_message,
        last_activity_at: active_at.and_then(non_zero_millis),
        message_count: message_count as usize,
        unread_count: meta.unread_count,
        id,
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let source_service_id: Option<String> = row.get(2)?;
    let source: Option<String> = row.get(3)?;
    let body: Option<String> = row.get(4)?;
    let sent_at: Option<i64> = row.get(5)?;
    let kind: Option<String> = row.get(6)?;
    let has_attachments: Option<i64> = row.get(7)?;

    Ok(Message {
        id,
        conversation_id,
        sender_id: non_empty(source_service_id).or_else(|| non_empty(source)),
        body: non_empty(body),
        sent_at: sent_at
            .and_then(non_zero_millis)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        direction: Direction::from_store_type(kind.as_deref().unwrap_or("")),
        has_attachments: has_attachments.unwrap_or(0) != 0,
    })
}

/// Subset of the per-conversation metadata blob this layer reads.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConversationMeta {
    unread_count: usize,
    last_message: Option<String>,
}

impl ConversationMeta {
    /// Parse the embedded metadata document, degrading to defaults when the
    /// blob is missing or unreadable. A bad blob never fails the listing.
    fn parse(id: &str, blob: Option<&str>) -> Self {
        let Some(blob) = blob else {
            return Self::default();
        };
        serde_json::from_str(blob).unwrap_or_else(|e| {
            warn!(conversation = %id, "unreadable conversation metadata: {}", e);
            Self::default()
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Store timestamps are Unix milliseconds; zero stands in for "never".
fn non_zero_millis(ms: i64) -> Option<DateTime<Utc>> {
    if ms == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}
