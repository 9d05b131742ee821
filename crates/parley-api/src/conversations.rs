use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::conversations::ConversationMark;
use parley_types::api::{Claims, CreateConversationRequest, UpdateConversationRequest};
use parley_types::error::ChatError;
use parley_types::events::GatewayEvent;
use parley_types::models::NewConversation;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiResult;
use crate::moderation::require_moderator;

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    // the caller is always a participant
    let mut participant_ids = req.participant_ids;
    if !participant_ids.contains(&claims.sub) {
        participant_ids.insert(0, claims.sub);
    }
    let new = NewConversation::new(req.kind, participant_ids, req.title)?;

    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    let conversation = blocking(move || {
        dispatcher.commit(|| {
            let conversation = db.create_conversation(&new)?;
            let event = GatewayEvent::ConversationCreated(conversation.clone());
            Ok((conversation, Some(event)))
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let conversations = blocking(move || db.list_conversations(claims.sub)).await?;
    Ok(Json(conversations))
}

pub async fn update_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    let conversation = blocking(move || {
        if !db.is_participant(conversation_id, claims.sub)? {
            return Err(ChatError::Forbidden);
        }
        dispatcher.commit(|| {
            let conversation = db.rename_conversation(conversation_id, req.title)?;
            let event = GatewayEvent::ConversationUpdated(conversation.clone());
            Ok((conversation, Some(event)))
        })
    })
    .await?;

    Ok(Json(conversation))
}

/// Delete a conversation and its entire message log. Allowed for
/// participants and moderators.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    blocking(move || {
        if !db.is_participant(conversation_id, claims.sub)? {
            require_moderator(&db, claims.sub)?;
        }
        dispatcher.commit(|| {
            db.delete_conversation(conversation_id)?;
            Ok(((), Some(GatewayEvent::ConversationDeleted { conversation_id })))
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn pin(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    mark(state, path, claims, ConversationMark::Pinned, true).await
}

pub async fn unpin(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    mark(state, path, claims, ConversationMark::Pinned, false).await
}

pub async fn archive(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    mark(state, path, claims, ConversationMark::Archived, true).await
}

pub async fn unarchive(
    state: State<AppState>,
    path: Path<Uuid>,
    claims: Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    mark(state, path, claims, ConversationMark::Archived, false).await
}

/// Pin/unpin/archive/unarchive share one shape: an idempotent set
/// mutation followed by a conversation:updated broadcast.
async fn mark(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    mark: ConversationMark,
    add: bool,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    let conversation = blocking(move || {
        dispatcher.commit(|| {
            let conversation = if add {
                db.set_mark(conversation_id, claims.sub, mark)?
            } else {
                db.clear_mark(conversation_id, claims.sub, mark)?
            };
            let event = GatewayEvent::ConversationUpdated(conversation.clone());
            Ok((conversation, Some(event)))
        })
    })
    .await?;

    Ok(Json(conversation))
}
