use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_types::api::Claims;
use parley_types::error::ChatError;
use parley_types::events::{GatewayCommand, GatewayEvent};
use parley_types::models::{MessageDraft, PresenceStatus};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// The Identify frame must arrive within this window or the socket is
/// closed with an auth error.
const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(10);

/// Handle one WebSocket connection through its whole lifecycle:
/// accepted socket -> Identify handshake -> registered session ->
/// event loop -> teardown (typing cleared, presence downgraded).
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let user_id = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            let frame = error_frame(&ChatError::AuthInvalid);
            let _ = sender
                .send(WsMessage::Text(
                    serde_json::to_string(&frame).unwrap().into(),
                ))
                .await;
            return;
        }
    };

    info!("{} connected to gateway", user_id);

    let ready = GatewayEvent::Ready { user_id };
    if sender
        .send(WsMessage::Text(
            serde_json::to_string(&ready).unwrap().into(),
        ))
        .await
        .is_err()
    {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, db, user_id).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, WsMessage>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
) {
    // Register the targeted channel before going online so nothing is
    // lost between the presence broadcast and the first poll.
    let (conn_id, mut user_rx) = dispatcher.register_session(user_id).await;
    let mut broadcast_rx = dispatcher.subscribe();
    dispatcher.session_online(user_id).await;

    let dispatcher_recv = dispatcher.clone();

    // Per-connection conversation subscriptions (shared between tasks).
    let joined: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let joined_send = joined.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    // conversation:created predates any join, so it is
                    // scoped by the participant list instead
                    if let GatewayEvent::ConversationCreated(conversation) = &event {
                        if !conversation.participant_ids.contains(&user_id) {
                            continue;
                        }
                    }

                    // conversation-scoped events only go to joined sessions
                    if let Some(conversation_id) = event.conversation_id() {
                        let subs = joined_send.read().expect("subscription lock poisoned");
                        if !subs.contains(&conversation_id) {
                            continue;
                        }
                    }

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read frames from the client, serially per connection.
    let joined_recv = joined.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_recv, &db, user_id, cmd, &joined_recv).await;
                    }
                    Err(e) => {
                        let preview = text.get(..200).unwrap_or(&text);
                        warn!("{} bad frame: {} -- raw: {}", user_id, e, preview);
                    }
                },
                WsMessage::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                    // heartbeat replies count as activity for the presence TTL
                    dispatcher_recv.refresh_presence(user_id, PresenceStatus::Online);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.session_offline(user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Uuid> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let deadline = tokio::time::timeout(HANDSHAKE_DEADLINE, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let WsMessage::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims.sub);
                }
            }
        }
        None
    });

    deadline.await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    user_id: Uuid,
    cmd: GatewayCommand,
    joined: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // already handled

        GatewayCommand::JoinConversation { conversation_id } => {
            let db = db.clone();
            let result = tokio::task::spawn_blocking(move || {
                db.is_participant(conversation_id, user_id)
            })
            .await;

            match result {
                Ok(Ok(true)) => {
                    info!("{} joined conversation {}", user_id, conversation_id);
                    joined
                        .write()
                        .expect("subscription lock poisoned")
                        .insert(conversation_id);
                }
                Ok(Ok(false)) => {
                    dispatcher
                        .send_to_user(user_id, error_frame(&ChatError::Forbidden))
                        .await;
                }
                Ok(Err(e)) => {
                    report(dispatcher, user_id, e).await;
                }
                Err(e) => {
                    report(dispatcher, user_id, ChatError::internal(e)).await;
                }
            }
        }

        GatewayCommand::SendMessage {
            conversation_id,
            content,
            media,
            reply_to_message_id,
            is_encrypted,
        } => {
            let draft = match MessageDraft::new(
                conversation_id,
                user_id,
                content,
                media,
                reply_to_message_id,
                is_encrypted,
            ) {
                Ok(draft) => draft,
                Err(e) => {
                    report(dispatcher, user_id, e).await;
                    return;
                }
            };

            let db = db.clone();
            let publisher = dispatcher.clone();
            let result = tokio::task::spawn_blocking(move || {
                publisher.commit(|| {
                    let message = db.append_message(&draft)?;
                    Ok((message.id, Some(GatewayEvent::MessageNew(message))))
                })
            })
            .await;

            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => report(dispatcher, user_id, e).await,
                Err(e) => report(dispatcher, user_id, ChatError::internal(e)).await,
            }
        }

        GatewayCommand::TypingStart { conversation_id } => {
            dispatcher.typing_start(conversation_id, user_id);
        }

        GatewayCommand::TypingStop { conversation_id } => {
            dispatcher.typing_stop(conversation_id, user_id);
        }

        GatewayCommand::ReactionAdd { message_id, emoji } => {
            let db = db.clone();
            let publisher = dispatcher.clone();
            let result = tokio::task::spawn_blocking(move || {
                publisher.commit(|| {
                    let (conversation_id, added) =
                        db.add_reaction(message_id, user_id, &emoji)?;
                    // redundant add is an idempotent no-op, not a removal
                    let event = added.then(|| GatewayEvent::ReactionAdded {
                        message_id,
                        conversation_id,
                        emoji,
                        user_id,
                    });
                    Ok(((), event))
                })
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => report(dispatcher, user_id, e).await,
                Err(e) => report(dispatcher, user_id, ChatError::internal(e)).await,
            }
        }

        GatewayCommand::ReactionRemove { message_id, emoji } => {
            let db = db.clone();
            let publisher = dispatcher.clone();
            let result = tokio::task::spawn_blocking(move || {
                publisher.commit(|| {
                    let (conversation_id, removed) =
                        db.remove_reaction(message_id, user_id, &emoji)?;
                    let event = removed.then(|| GatewayEvent::ReactionRemoved {
                        message_id,
                        conversation_id,
                        emoji,
                        user_id,
                    });
                    Ok(((), event))
                })
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => report(dispatcher, user_id, e).await,
                Err(e) => report(dispatcher, user_id, ChatError::internal(e)).await,
            }
        }
    }
}

/// Errors from client frames go only to the originating session.
async fn report(dispatcher: &Dispatcher, user_id: Uuid, err: ChatError) {
    if matches!(err, ChatError::Internal(_)) {
        tracing::error!("gateway command failed for {}: {}", user_id, err);
    }
    dispatcher.send_to_user(user_id, error_frame(&err)).await;
}

fn error_frame(err: &ChatError) -> GatewayEvent {
    GatewayEvent::Error {
        code: err.code().to_string(),
        message: match err {
            // internal detail stays in the logs
            ChatError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        },
    }
}
