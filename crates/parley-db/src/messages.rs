use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use parley_types::api::MessagePage;
use parley_types::error::ChatError;
use parley_types::models::{Message, MessageDraft, ReactionGroup, ReceiptKind};

use crate::conversations::{parse_uuid, touch};
use crate::rows::MessageRow;
use crate::{Database, SqlExt, now_ts, parse_ts};

impl Database {
    /// Append a message to a conversation's log. The conversation's
    /// locked flag is the moderation check here; there is no per-message
    /// gate. The assigned id is strictly increasing and doubles as the
    /// pagination cursor.
    pub fn append_message(&self, draft: &MessageDraft) -> Result<Message, ChatError> {
        self.with_conn_mut(|conn| {
            let conv_id = draft.conversation_id.to_string();
            let locked: Option<bool> = conn
                .query_row(
                    "SELECT locked FROM conversations WHERE id = ?1",
                    [&conv_id],
                    |row| row.get(0),
                )
                .optional()
                .sql()?;
            match locked {
                None => return Err(ChatError::ConversationNotFound),
                Some(true) => return Err(ChatError::ConversationLocked),
                Some(false) => {}
            }

            let media = serde_json::to_string(&draft.media).map_err(ChatError::internal)?;
            let now = now_ts();

            let tx = conn.transaction().sql()?;
            tx.execute(
                "INSERT INTO messages
                     (conversation_id, sender_id, content, media, reply_to, encrypted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    conv_id,
                    draft.sender_id.to_string(),
                    draft.content,
                    media,
                    draft.reply_to_message_id,
                    draft.encrypted as i64,
                    now,
                ],
            )
            .sql()?;
            let id = tx.last_insert_rowid();
            touch(&tx, &conv_id)?;
            tx.commit().sql()?;

            load_message(conn, id)?.ok_or(ChatError::MessageNotFound)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Message, ChatError> {
        self.with_conn(|conn| load_message(conn, id)?.ok_or(ChatError::MessageNotFound))
    }

    /// Edit content and/or the pinned flag. Only the original sender may
    /// edit; moderators go through soft delete instead.
    pub fn edit_message(
        &self,
        id: i64,
        requester: Uuid,
        content: Option<String>,
        pinned: Option<bool>,
    ) -> Result<Message, ChatError> {
        self.with_conn(|conn| {
            let sender = require_sender(conn, id)?;
            if sender != requester.to_string() {
                return Err(ChatError::Forbidden);
            }

            if let Some(content) = &content {
                conn.execute(
                    "UPDATE messages SET content = ?2, edited_at = ?3 WHERE id = ?1",
                    params![id, content, now_ts()],
                )
                .sql()?;
            }
            if let Some(pinned) = pinned {
                conn.execute(
                    "UPDATE messages SET pinned = ?2 WHERE id = ?1",
                    params![id, pinned as i64],
                )
                .sql()?;
            }

            let message = load_message(conn, id)?.ok_or(ChatError::MessageNotFound)?;
            touch(conn, &message.conversation_id.to_string())?;
            Ok(message)
        })
    }

    /// Soft delete: the row keeps its id and position, content and media
    /// are redacted from every payload built afterwards.
    pub fn soft_delete_message(
        &self,
        id: i64,
        requester: Uuid,
        privileged: bool,
    ) -> Result<(i64, Uuid), ChatError> {
        self.with_conn(|conn| {
            let sender = require_sender(conn, id)?;
            if !privileged && sender != requester.to_string() {
                return Err(ChatError::Forbidden);
            }

            conn.execute(
                "UPDATE messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, now_ts()],
            )
            .sql()?;

            let conv: String = conn
                .query_row(
                    "SELECT conversation_id FROM messages WHERE id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .sql()?;
            touch(conn, &conv)?;
            Ok((id, parse_uuid(&conv)?))
        })
    }

    /// Explicit add: idempotent, reports whether the set changed.
    /// Returns the owning conversation id for broadcast routing.
    pub fn add_reaction(
        &self,
        message_id: i64,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<(Uuid, bool), ChatError> {
        self.with_conn(|conn| {
            let conv = require_message_conversation(conn, message_id)?;
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO reactions (message_id, user_id, emoji)
                     VALUES (?1, ?2, ?3)",
                    params![message_id, user_id.to_string(), emoji],
                )
                .sql()?;
            Ok((parse_uuid(&conv)?, changed > 0))
        })
    }

    /// Explicit remove: idempotent, reports whether the set changed.
    pub fn remove_reaction(
        &self,
        message_id: i64,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<(Uuid, bool), ChatError> {
        self.with_conn(|conn| {
            let conv = require_message_conversation(conn, message_id)?;
            let changed = conn
                .execute(
                    "DELETE FROM reactions
                     WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                    params![message_id, user_id.to_string(), emoji],
                )
                .sql()?;
            Ok((parse_uuid(&conv)?, changed > 0))
        })
    }

    /// Merge a delivery/read receipt into the matching set for each
    /// referenced message. Set semantics: re-merging is a no-op and is
    /// excluded from the returned ids, so repeats broadcast nothing. Ids
    /// not belonging to the conversation are skipped.
    pub fn merge_receipts(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        message_ids: &[i64],
        kind: ReceiptKind,
    ) -> Result<Vec<i64>, ChatError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction().sql()?;
            let mut applied = Vec::with_capacity(message_ids.len());
            for &id in message_ids {
                let changed = tx
                    .execute(
                        "INSERT OR IGNORE INTO receipts (message_id, user_id, kind)
                         SELECT id, ?2, ?3 FROM messages
                         WHERE id = ?1 AND conversation_id = ?4",
                        params![
                            id,
                            user_id.to_string(),
                            kind.as_str(),
                            conversation_id.to_string()
                        ],
                    )
                    .sql()?;
                if changed > 0 {
                    applied.push(id);
                }
            }
            tx.commit().sql()?;
            Ok(applied)
        })
    }

    /// Backward pagination from most-recent. Over-fetches by one row to
    /// decide whether another page exists; the extra row's id becomes the
    /// next cursor. The page itself is returned in ascending id order.
    pub fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
        cursor: Option<i64>,
    ) -> Result<MessagePage, ChatError> {
        self.with_conn(|conn| {
            crate::conversations::require_conversation(conn, &conversation_id.to_string())?;

            let limit = limit.max(1) as i64;
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, sender_id, content, media, reply_to,
                            pinned, encrypted, created_at, edited_at, deleted_at
                     FROM messages
                     WHERE conversation_id = ?1 AND (?2 IS NULL OR id < ?2)
                     ORDER BY id DESC
                     LIMIT ?3",
                )
                .sql()?;
            let mut rows: Vec<MessageRow> = stmt
                .query_map(
                    params![conversation_id.to_string(), cursor, limit + 1],
                    map_message_row,
                )
                .sql()?
                .collect::<Result<_, _>>()
                .sql()?;
            drop(stmt);

            let next_cursor = if rows.len() as i64 > limit {
                rows.pop().map(|extra| extra.id)
            } else {
                None
            };

            rows.reverse();
            let data = hydrate(conn, rows)?;
            Ok(MessagePage { data, next_cursor })
        })
    }
}

fn require_sender(conn: &Connection, id: i64) -> Result<String, ChatError> {
    conn.query_row("SELECT sender_id FROM messages WHERE id = ?1", [id], |row| {
        row.get(0)
    })
    .optional()
    .sql()?
    .ok_or(ChatError::MessageNotFound)
}

fn require_message_conversation(conn: &Connection, id: i64) -> Result<String, ChatError> {
    conn.query_row(
        "SELECT conversation_id FROM messages WHERE id = ?1",
        [id],
        |row| row.get(0),
    )
    .optional()
    .sql()?
    .ok_or(ChatError::MessageNotFound)
}

fn map_message_row(row: &rusqlite::Row<'_>) -> Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        media: row.get(4)?,
        reply_to: row.get(5)?,
        pinned: row.get(6)?,
        encrypted: row.get(7)?,
        created_at: row.get(8)?,
        edited_at: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}

fn load_message(conn: &Connection, id: i64) -> Result<Option<Message>, ChatError> {
    let row = conn
        .query_row(
            "SELECT id, conversation_id, sender_id, content, media, reply_to,
                    pinned, encrypted, created_at, edited_at, deleted_at
             FROM messages WHERE id = ?1",
            [id],
            map_message_row,
        )
        .optional()
        .sql()?;

    match row {
        Some(row) => Ok(hydrate(conn, vec![row])?.pop()),
        None => Ok(None),
    }
}

/// Attach reactions and receipts to a batch of rows in two queries
/// (avoids N+1), then build client-visible payloads. Soft-deleted
/// messages keep their id and position but content and media are
/// redacted here, at the single hydration point.
fn hydrate(conn: &Connection, rows: Vec<MessageRow>) -> Result<Vec<Message>, ChatError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let in_clause = placeholders.join(", ");
    let id_params: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

    // emoji -> user ids, BTreeMap for deterministic payload order
    let mut reactions: BTreeMap<i64, BTreeMap<String, Vec<Uuid>>> = BTreeMap::new();
    let sql = format!(
        "SELECT message_id, user_id, emoji FROM reactions
         WHERE message_id IN ({in_clause})
         ORDER BY emoji, user_id"
    );
    let mut stmt = conn.prepare(&sql).sql()?;
    let reaction_rows = stmt
        .query_map(id_params.as_slice(), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .sql()?
        .collect::<Result<Vec<_>, _>>()
        .sql()?;
    drop(stmt);
    for (message_id, user_id, emoji) in reaction_rows {
        reactions
            .entry(message_id)
            .or_default()
            .entry(emoji)
            .or_default()
            .push(parse_uuid(&user_id)?);
    }

    let mut delivered: BTreeMap<i64, Vec<Uuid>> = BTreeMap::new();
    let mut read: BTreeMap<i64, Vec<Uuid>> = BTreeMap::new();
    let sql = format!(
        "SELECT message_id, user_id, kind FROM receipts
         WHERE message_id IN ({in_clause})
         ORDER BY user_id"
    );
    let mut stmt = conn.prepare(&sql).sql()?;
    let receipt_rows = stmt
        .query_map(id_params.as_slice(), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .sql()?
        .collect::<Result<Vec<_>, _>>()
        .sql()?;
    drop(stmt);
    for (message_id, user_id, kind) in receipt_rows {
        let target = if kind == "read" { &mut read } else { &mut delivered };
        target.entry(message_id).or_default().push(parse_uuid(&user_id)?);
    }

    rows.into_iter()
        .map(|row| {
            let deleted = row.deleted_at.is_some();
            let media = if deleted {
                vec![]
            } else {
                serde_json::from_str(&row.media).map_err(ChatError::internal)?
            };
            let groups = reactions
                .remove(&row.id)
                .map(|by_emoji| {
                    by_emoji
                        .into_iter()
                        .map(|(emoji, user_ids)| ReactionGroup {
                            emoji,
                            count: user_ids.len(),
                            user_ids,
                        })
                        .collect()
                })
                .unwrap_or_default();

            Ok(Message {
                id: row.id,
                conversation_id: parse_uuid(&row.conversation_id)?,
                sender_id: parse_uuid(&row.sender_id)?,
                content: if deleted { None } else { row.content },
                media,
                reply_to_message_id: row.reply_to,
                reactions: groups,
                delivered_to: delivered.remove(&row.id).unwrap_or_default(),
                read_by: read.remove(&row.id).unwrap_or_default(),
                pinned: row.pinned,
                encrypted: row.encrypted,
                created_at: parse_ts(&row.created_at),
                edited_at: row.edited_at.as_deref().map(parse_ts),
                deleted_at: row.deleted_at.as_deref().map(parse_ts),
            })
        })
        .collect()
}
