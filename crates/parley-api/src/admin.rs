use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::Claims;
use parley_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiResult;
use crate::moderation::require_moderator;

pub async fn lock_conversation(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    set_locked(state, path, claims, true).await
}

pub async fn unlock_conversation(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    set_locked(state, path, claims, false).await
}

/// Locking is the coarse moderation lever over message creation: while
/// locked, every append fails regardless of sender.
async fn set_locked(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    locked: bool,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    let conversation = blocking(move || {
        require_moderator(&db, claims.sub)?;
        dispatcher.commit(|| {
            let conversation = db.set_locked(conversation_id, locked)?;
            let event = GatewayEvent::ConversationUpdated(conversation.clone());
            Ok((conversation, Some(event)))
        })
    })
    .await?;

    Ok(Json(conversation))
}

/// Privileged soft delete: a moderator may delete any message
/// regardless of sender.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    blocking(move || {
        require_moderator(&db, claims.sub)?;
        dispatcher.commit(|| {
            let (message_id, conversation_id) =
                db.soft_delete_message(message_id, claims.sub, true)?;
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
