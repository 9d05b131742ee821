//! Database row types that map directly to SQLite rows. Distinct
//! from the parley-types API models to keep the storage layout private;
//! hydration into API shapes happens in the query modules.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub media: String,
    pub reply_to: Option<i64>,
    pub pinned: bool,
    pub encrypted: bool,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub deleted_at: Option<String>,
}
