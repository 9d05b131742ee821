use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use parley_types::error::ChatError;
use parley_types::models::Role;

use crate::rows::UserRow;
use crate::{Database, SqlExt};

impl Database {
    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<(), ChatError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, role) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), username, password_hash, role.as_str()],
            )
            .sql()?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>, ChatError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password, role, created_at FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password: row.get(2)?,
                        role: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .sql()
        })
    }

    /// Role lookup for the moderation gate. An unknown user is reported
    /// as a plain member; the gate turns that into `Forbidden` without
    /// saying why.
    pub fn get_user_role(&self, id: Uuid) -> Result<Role, ChatError> {
        self.with_conn(|conn| {
            let role: Option<String> = conn
                .query_row(
                    "SELECT role FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .sql()?;
            Ok(match role.as_deref() {
                Some("moderator") => Role::Moderator,
                _ => Role::Member,
            })
        })
    }
}
