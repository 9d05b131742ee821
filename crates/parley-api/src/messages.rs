use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use parley_types::api::{Claims, EditMessageRequest, SendMessageRequest};
use parley_types::error::ChatError;
use parley_types::events::GatewayEvent;
use parley_types::models::MessageDraft;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Backward pagination cursor: the id of the oldest message already
    /// seen. Absent means "start from the newest".
    pub cursor: Option<i64>,
}

fn default_limit() -> u32 {
    50
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let draft = MessageDraft::new(
        conversation_id,
        claims.sub,
        req.content,
        req.media,
        req.reply_to_message_id,
        req.is_encrypted,
    )?;

    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    let message = blocking(move || {
        dispatcher.commit(|| {
            let message = db.append_message(&draft)?;
            Ok((message.clone(), Some(GatewayEvent::MessageNew(message))))
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Paginated history, readable only by participants.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let limit = query.limit.min(200);
    let cursor = query.cursor;

    let page = blocking(move || {
        if !db.is_participant(conversation_id, claims.sub)? {
            return Err(ChatError::Forbidden);
        }
        db.list_messages(conversation_id, limit, cursor)
    })
    .await?;
    Ok(Json(page))
}

/// Sender-only edit of content and/or the pinned flag.
pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    let message = blocking(move || {
        dispatcher.commit(|| {
            let message = db.edit_message(message_id, claims.sub, req.content, req.pinned)?;
            Ok((message.clone(), Some(GatewayEvent::MessageUpdated(message))))
        })
    })
    .await?;

    Ok(Json(message))
}

/// Sender-only soft delete. The broadcast references the id, never the
/// content.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    blocking(move || {
        dispatcher.commit(|| {
            let (message_id, conversation_id) =
                db.soft_delete_message(message_id, claims.sub, false)?;
            Ok((
                (),
                Some(GatewayEvent::MessageDeleted {
                    message_id,
                    conversation_id,
                }),
            ))
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
