use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConversationKind, MediaAttachment, Message, ReceiptKind};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway handshake.
/// Canonical definition lives here to avoid drift between the two doors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(rename = "type", alias = "kind")]
    pub kind: ConversationKind,
    pub participant_ids: Vec<Uuid>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    pub title: Option<String>,
}

// -- Messages --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
    pub reply_to_message_id: Option<i64>,
    #[serde(default)]
    pub is_encrypted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct EditMessageRequest {
    pub content: Option<String>,
    pub pinned: Option<bool>,
}

/// One page of backward pagination: ascending-id messages plus the
/// cursor for the next (older) page, absent at end of history.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub data: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<i64>,
}

// -- Reactions & receipts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRequest {
    pub message_ids: Vec<i64>,
    pub kind: ReceiptKind,
}

// -- Errors --

/// REST error body: stable code plus human-readable message, optional
/// validation details.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}
