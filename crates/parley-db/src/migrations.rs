use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'member',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            kind        TEXT NOT NULL,
            title       TEXT,
            -- canonical sorted participant pair; NULL for groups
            direct_key  TEXT UNIQUE,
            locked      INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            user_id         TEXT NOT NULL,
            position        INTEGER NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        -- pin/archive flags per user; UNIQUE makes set-add idempotent
        CREATE TABLE IF NOT EXISTS conversation_marks (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            user_id         TEXT NOT NULL,
            mark            TEXT NOT NULL,
            UNIQUE (conversation_id, user_id, mark)
        );

        -- AUTOINCREMENT keeps ids strictly increasing even across
        -- deletes, so they double as pagination cursors.
        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL,
            content         TEXT,
            media           TEXT NOT NULL DEFAULT '[]',
            reply_to        INTEGER,
            pinned          INTEGER NOT NULL DEFAULT 0,
            encrypted       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            edited_at       TEXT,
            deleted_at      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, id);

        CREATE TABLE IF NOT EXISTS reactions (
            message_id  INTEGER NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS receipts (
            message_id  INTEGER NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            kind        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (message_id, user_id, kind)
        );

        CREATE INDEX IF NOT EXISTS idx_receipts_message
            ON receipts(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
