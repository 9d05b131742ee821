use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use parley_types::error::ChatError;
use parley_types::models::{Conversation, ConversationKind, NewConversation};

use crate::{Database, SqlExt, now_ts, parse_ts};

/// Per-user conversation flags. UNIQUE(conversation_id, user_id, mark)
/// makes add/remove idempotent set operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationMark {
    Pinned,
    Archived,
}

impl ConversationMark {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pinned => "pinned",
            Self::Archived => "archived",
        }
    }
}

impl Database {
    /// Create a conversation. Direct conversations are deduplicated on
    /// the canonical participant pair: creating the same pair twice
    /// returns the existing conversation.
    pub fn create_conversation(&self, new: &NewConversation) -> Result<Conversation, ChatError> {
        self.with_conn_mut(|conn| {
            if let Some(key) = new.direct_key() {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT id FROM conversations WHERE direct_key = ?1",
                        [&key],
                        |row| row.get(0),
                    )
                    .optional()
                    .sql()?;
                if let Some(id) = existing {
                    return load_conversation(conn, &id)?.ok_or(ChatError::ConversationNotFound);
                }
            }

            let id = Uuid::new_v4().to_string();
            let now = now_ts();
            let tx = conn.transaction().sql()?;
            tx.execute(
                "INSERT INTO conversations (id, kind, title, direct_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, new.kind.as_str(), new.title, new.direct_key(), now],
            )
            .sql()?;
            for (position, user_id) in new.participant_ids.iter().enumerate() {
                tx.execute(
                    "INSERT INTO conversation_participants (conversation_id, user_id, position)
                     VALUES (?1, ?2, ?3)",
                    params![id, user_id.to_string(), position as i64],
                )
                .sql()?;
            }
            tx.commit().sql()?;

            load_conversation(conn, &id)?.ok_or(ChatError::ConversationNotFound)
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Conversation, ChatError> {
        self.with_conn(|conn| {
            load_conversation(conn, &id.to_string())?.ok_or(ChatError::ConversationNotFound)
        })
    }

    /// Conversations the user participates in, most recently updated
    /// first. Every mutation bumps updated_at, so recently-active
    /// conversations surface at the top.
    pub fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>, ChatError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT c.id FROM conversations c
                     JOIN conversation_participants p ON p.conversation_id = c.id
                     WHERE p.user_id = ?1
                     ORDER BY c.updated_at DESC, c.id",
                )
                .sql()?;
            let ids: Vec<String> = stmt
                .query_map([user_id.to_string()], |row| row.get(0))
                .sql()?
                .collect::<Result<_, _>>()
                .sql()?;
            drop(stmt);

            let mut out = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(conv) = load_conversation(conn, id)? {
                    out.push(conv);
                }
            }
            Ok(out)
        })
    }

    pub fn rename_conversation(
        &self,
        id: Uuid,
        title: Option<String>,
    ) -> Result<Conversation, ChatError> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE conversations SET title = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id.to_string(), title, now_ts()],
                )
                .sql()?;
            if changed == 0 {
                return Err(ChatError::ConversationNotFound);
            }
            load_conversation(conn, &id.to_string())?.ok_or(ChatError::ConversationNotFound)
        })
    }

    /// Idempotent set-add of a pin/archive mark.
    pub fn set_mark(
        &self,
        id: Uuid,
        user_id: Uuid,
        mark: ConversationMark,
    ) -> Result<Conversation, ChatError> {
        self.with_conn(|conn| {
            require_conversation(conn, &id.to_string())?;
            conn.execute(
                "INSERT OR IGNORE INTO conversation_marks (conversation_id, user_id, mark)
                 VALUES (?1, ?2, ?3)",
                params![id.to_string(), user_id.to_string(), mark.as_str()],
            )
            .sql()?;
            touch(conn, &id.to_string())?;
            load_conversation(conn, &id.to_string())?.ok_or(ChatError::ConversationNotFound)
        })
    }

    /// Idempotent set-remove of a pin/archive mark.
    pub fn clear_mark(
        &self,
        id: Uuid,
        user_id: Uuid,
        mark: ConversationMark,
    ) -> Result<Conversation, ChatError> {
        self.with_conn(|conn| {
            require_conversation(conn, &id.to_string())?;
            conn.execute(
                "DELETE FROM conversation_marks
                 WHERE conversation_id = ?1 AND user_id = ?2 AND mark = ?3",
                params![id.to_string(), user_id.to_string(), mark.as_str()],
            )
            .sql()?;
            touch(conn, &id.to_string())?;
            load_conversation(conn, &id.to_string())?.ok_or(ChatError::ConversationNotFound)
        })
    }

    pub fn set_locked(&self, id: Uuid, locked: bool) -> Result<Conversation, ChatError> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE conversations SET locked = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id.to_string(), locked as i64, now_ts()],
                )
                .sql()?;
            if changed == 0 {
                return Err(ChatError::ConversationNotFound);
            }
            load_conversation(conn, &id.to_string())?.ok_or(ChatError::ConversationNotFound)
        })
    }

    /// Delete a conversation and cascade to its messages, reactions and
    /// receipts in a single transaction.
    pub fn delete_conversation(&self, id: Uuid) -> Result<(), ChatError> {
        self.with_conn_mut(|conn| {
            let id = id.to_string();
            require_conversation(conn, &id)?;

            let tx = conn.transaction().sql()?;
            tx.execute(
                "DELETE FROM reactions WHERE message_id IN
                     (SELECT id FROM messages WHERE conversation_id = ?1)",
                [&id],
            )
            .sql()?;
            tx.execute(
                "DELETE FROM receipts WHERE message_id IN
                     (SELECT id FROM messages WHERE conversation_id = ?1)",
                [&id],
            )
            .sql()?;
            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [&id])
                .sql()?;
            tx.execute(
                "DELETE FROM conversation_marks WHERE conversation_id = ?1",
                [&id],
            )
            .sql()?;
            tx.execute(
                "DELETE FROM conversation_participants WHERE conversation_id = ?1",
                [&id],
            )
            .sql()?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", [&id])
                .sql()?;
            tx.commit().sql()?;
            Ok(())
        })
    }

    pub fn is_participant(&self, id: Uuid, user_id: Uuid) -> Result<bool, ChatError> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM conversation_participants
                     WHERE conversation_id = ?1 AND user_id = ?2",
                    params![id.to_string(), user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .sql()?;
            Ok(found.is_some())
        })
    }
}

pub(crate) fn require_conversation(conn: &Connection, id: &str) -> Result<(), ChatError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM conversations WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()
        .sql()?;
    if found.is_none() {
        return Err(ChatError::ConversationNotFound);
    }
    Ok(())
}

/// Bump updated_at so list_conversations reorders.
pub(crate) fn touch(conn: &Connection, id: &str) -> Result<(), ChatError> {
    conn.execute(
        "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
        params![id, now_ts()],
    )
    .sql()?;
    Ok(())
}

pub(crate) fn load_conversation(
    conn: &Connection,
    id: &str,
) -> Result<Option<Conversation>, ChatError> {
    let row = conn
        .query_row(
            "SELECT id, kind, title, locked, created_at, updated_at
             FROM conversations WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()
        .sql()?;

    let Some((id, kind, title, locked, created_at, updated_at)) = row else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT user_id FROM conversation_participants
             WHERE conversation_id = ?1 ORDER BY position",
        )
        .sql()?;
    let participant_ids = collect_uuids(stmt.query_map([&id], |row| row.get::<_, String>(0)).sql()?)?;

    let mut stmt = conn
        .prepare(
            "SELECT user_id FROM conversation_marks
             WHERE conversation_id = ?1 AND mark = 'pinned' ORDER BY user_id",
        )
        .sql()?;
    let pinned_by = collect_uuids(stmt.query_map([&id], |row| row.get::<_, String>(0)).sql()?)?;

    let mut stmt = conn
        .prepare(
            "SELECT user_id FROM conversation_marks
             WHERE conversation_id = ?1 AND mark = 'archived' ORDER BY user_id",
        )
        .sql()?;
    let archived_by = collect_uuids(stmt.query_map([&id], |row| row.get::<_, String>(0)).sql()?)?;

    let kind = match kind.as_str() {
        "direct" => ConversationKind::Direct,
        _ => ConversationKind::Group,
    };

    Ok(Some(Conversation {
        id: parse_uuid(&id)?,
        kind,
        title,
        participant_ids,
        pinned_by,
        archived_by,
        locked,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    }))
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, ChatError> {
    raw.parse::<Uuid>()
        .map_err(|e| ChatError::internal(format!("corrupt uuid '{raw}': {e}")))
}

fn collect_uuids(
    rows: impl Iterator<Item = Result<String, rusqlite::Error>>,
) -> Result<Vec<Uuid>, ChatError> {
    let raw: Vec<String> = rows.collect::<Result<_, _>>().sql()?;
    raw.iter().map(|s| parse_uuid(s)).collect()
}
