use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Claims, ReactionRequest, ReceiptRequest};
use parley_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiResult;

/// Explicit add. Re-adding an existing reaction is an idempotent no-op
/// (it does NOT remove it; the wire protocol has a dedicated DELETE
/// for that direction).
pub async fn add_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactionRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    let added = blocking(move || {
        dispatcher.commit(|| {
            let (conversation_id, added) = db.add_reaction(message_id, claims.sub, &req.emoji)?;
            let event = added.then(|| GatewayEvent::ReactionAdded {
                message_id,
                conversation_id,
                emoji: req.emoji,
                user_id: claims.sub,
            });
            Ok((added, event))
        })
    })
    .await?;

    Ok(Json(serde_json::json!({ "added": added })))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Path((message_id, emoji)): Path<(i64, String)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    let removed = blocking(move || {
        dispatcher.commit(|| {
            let (conversation_id, removed) = db.remove_reaction(message_id, claims.sub, &emoji)?;
            let event = removed.then(|| GatewayEvent::ReactionRemoved {
                message_id,
                conversation_id,
                emoji,
                user_id: claims.sub,
            });
            Ok((removed, event))
        })
    })
    .await?;

    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// Merge delivery/read receipts for a batch of messages. Set semantics:
/// repeats are no-ops and broadcast nothing new beyond the batch event.
pub async fn merge_receipts(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReceiptRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let dispatcher = state.dispatcher.clone();
    blocking(move || {
        dispatcher.commit(|| {
            let applied =
                db.merge_receipts(conversation_id, claims.sub, &req.message_ids, req.kind)?;
            let event = (!applied.is_empty())
                .then(|| GatewayEvent::receipt(req.kind, conversation_id, applied, claims.sub));
            Ok(((), event))
        })
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
