use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use parley_types::error::ChatError;
use parley_types::events::GatewayEvent;
use parley_types::models::PresenceStatus;

use crate::presence::{PresenceRegister, PresenceSnapshot};
use crate::typing::{TYPING_TIMEOUT, TypingTracker};

/// Manages connected sessions, presence, typing signals and event
/// fan-out. REST handlers and gateway sessions share one instance, so
/// both doors observe the same broadcast stream.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// All server-origin events flow through here; each connection's send
    /// task filters by its conversation subscriptions.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted channels: user_id -> (conn_id, sender). Used for
    /// caller-scoped error frames, never for broadcasts.
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,

    presence: PresenceRegister,
    typing: TypingTracker,

    /// Serializes store-commit + broadcast so subscribers see events for
    /// a conversation in commit order.
    publish_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
                presence: PresenceRegister::new(),
                typing: TypingTracker::new(),
                publish_lock: Mutex::new(()),
            }),
        }
    }

    /// Subscribe to the event stream. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Fan an event out to every connected session. Lagging receivers
    /// drop events (at-least-once only while connected; reconnecting
    /// clients reconcile over REST).
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Run a store mutation and broadcast its event atomically with
    /// respect to other commits, so fan-out order matches commit order.
    /// A `None` event means the mutation was a no-op (idempotent repeat)
    /// and nothing is broadcast. The closure blocks; call from a
    /// blocking context.
    pub fn commit<T>(
        &self,
        op: impl FnOnce() -> Result<(T, Option<GatewayEvent>), ChatError>,
    ) -> Result<T, ChatError> {
        let _guard = self
            .inner
            .publish_lock
            .lock()
            .map_err(|e| ChatError::internal(format!("publish lock poisoned: {e}")))?;
        let (value, event) = op()?;
        if let Some(event) = event {
            self.broadcast(event);
        }
        Ok(value)
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub async fn register_session(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Send a targeted event to one user's live session, if any. A
    /// closed or missing channel is silently tolerated; the connection
    /// may have gone away while the operation was in flight.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Session established: presence goes online and everyone hears it.
    pub async fn session_online(&self, user_id: Uuid) {
        let snapshot = self.inner.presence.set(user_id, PresenceStatus::Online);
        self.broadcast_presence(user_id, snapshot);
    }

    /// Activity ping: refresh the TTL with the given status. Broadcasts
    /// only when the visible status actually changes, so routine
    /// heartbeats stay silent.
    pub fn refresh_presence(&self, user_id: Uuid, status: PresenceStatus) {
        let previous = self.inner.presence.get(user_id).status;
        let snapshot = self.inner.presence.set(user_id, status);
        if snapshot.status != previous {
            self.broadcast_presence(user_id, snapshot);
        }
    }

    pub fn presence(&self, user_id: Uuid) -> PresenceSnapshot {
        self.inner.presence.get(user_id)
    }

    /// Session teardown. Only the owning connection may downgrade: a
    /// newer connection for the same user takes over the channel and
    /// must not be clobbered by the old one's teardown.
    pub async fn session_offline(&self, user_id: Uuid, conn_id: Uuid) {
        let is_current = {
            let channels = self.inner.user_channels.read().await;
            channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id)
        };
        if !is_current {
            return;
        }

        self.inner.user_channels.write().await.remove(&user_id);

        for conversation_id in self.inner.typing.clear_user(user_id) {
            self.broadcast(GatewayEvent::TypingStop {
                conversation_id,
                user_id,
            });
        }

        // proactive downgrade instead of waiting out the TTL
        let snapshot = self.inner.presence.set(user_id, PresenceStatus::Offline);
        self.broadcast_presence(user_id, snapshot);
    }

    /// Start (or renew) a typing signal and arm the auto-stop timer.
    pub fn typing_start(&self, conversation_id: Uuid, user_id: Uuid) {
        let token = self.inner.typing.begin(conversation_id, user_id);
        self.broadcast(GatewayEvent::TypingStart {
            conversation_id,
            user_id,
        });

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TYPING_TIMEOUT).await;
            if this.inner.typing.expire(conversation_id, user_id, token) {
                this.broadcast(GatewayEvent::TypingStop {
                    conversation_id,
                    user_id,
                });
            }
        });
    }

    pub fn typing_stop(&self, conversation_id: Uuid, user_id: Uuid) {
        if self.inner.typing.stop(conversation_id, user_id) {
            self.broadcast(GatewayEvent::TypingStop {
                conversation_id,
                user_id,
            });
        }
    }

    fn broadcast_presence(&self, user_id: Uuid, snapshot: PresenceSnapshot) {
        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            status: snapshot.status,
            last_seen: snapshot.last_seen,
        });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn next_event(rx: &mut broadcast::Receiver<GatewayEvent>) -> GatewayEvent {
        rx.try_recv().expect("expected a broadcast event")
    }

    #[tokio::test(start_paused = true)]
    async fn typing_auto_stops_after_inactivity() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let (conv, user) = (Uuid::new_v4(), Uuid::new_v4());

        dispatcher.typing_start(conv, user);
        assert!(matches!(
            next_event(&mut rx),
            GatewayEvent::TypingStart { .. }
        ));

        // let the spawned auto-stop task register its sleep before advancing
        tokio::task::yield_now().await;
        tokio::time::advance(TYPING_TIMEOUT + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        match next_event(&mut rx) {
            GatewayEvent::TypingStop {
                conversation_id,
                user_id,
            } => {
                assert_eq!(conversation_id, conv);
                assert_eq!(user_id, user);
            }
            other => panic!("expected typing:stop, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn renewed_typing_signal_is_not_stopped_by_the_old_timer() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let (conv, user) = (Uuid::new_v4(), Uuid::new_v4());

        dispatcher.typing_start(conv, user);
        tokio::time::advance(TYPING_TIMEOUT / 2).await;
        dispatcher.typing_start(conv, user);

        // past the first timer's deadline but not the second's
        tokio::time::advance(TYPING_TIMEOUT / 2 + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        let mut saw_stop = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, GatewayEvent::TypingStop { .. }) {
                saw_stop = true;
            }
        }
        assert!(!saw_stop, "stale timer must not emit a stop");
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_clears_immediately() {
        let dispatcher = Dispatcher::new();
        let (conv, user) = (Uuid::new_v4(), Uuid::new_v4());
        dispatcher.typing_start(conv, user);
        let mut rx = dispatcher.subscribe();

        dispatcher.typing_stop(conv, user);
        assert!(matches!(
            next_event(&mut rx),
            GatewayEvent::TypingStop { .. }
        ));

        // no double stop from the expired timer later
        tokio::time::advance(TYPING_TIMEOUT * 2).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_refresh_keeps_presence_online_without_rebroadcast() {
        use crate::presence::PRESENCE_TTL;

        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        dispatcher.session_online(user).await;

        let mut rx = dispatcher.subscribe();
        // each refresh lands well inside the TTL; presence never lapses
        for _ in 0..6 {
            tokio::time::advance(PRESENCE_TTL / 2).await;
            dispatcher.refresh_presence(user, PresenceStatus::Online);
            assert_eq!(dispatcher.presence(user).status, PresenceStatus::Online);
        }
        assert!(
            rx.try_recv().is_err(),
            "unchanged status must not rebroadcast"
        );

        // once the activity stops the TTL runs out as usual
        tokio::time::advance(PRESENCE_TTL + Duration::from_secs(1)).await;
        assert_eq!(dispatcher.presence(user).status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn disconnect_broadcasts_typing_stop_and_presence_offline() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let conv = Uuid::new_v4();

        let (conn_id, _rx) = dispatcher.register_session(user).await;
        dispatcher.session_online(user).await;
        dispatcher.typing_start(conv, user);

        let mut rx = dispatcher.subscribe();
        dispatcher.session_offline(user, conn_id).await;

        let mut saw_typing_stop = false;
        let mut saw_offline = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                GatewayEvent::TypingStop {
                    conversation_id, ..
                } => saw_typing_stop = conversation_id == conv,
                GatewayEvent::PresenceUpdate { status, .. } => {
                    saw_offline = status == PresenceStatus::Offline
                }
                _ => {}
            }
        }
        assert!(saw_typing_stop);
        assert!(saw_offline);
        assert_eq!(dispatcher.presence(user).status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn stale_connection_cannot_downgrade_a_newer_session() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_session(user).await;
        let (_new_conn, _new_rx) = dispatcher.register_session(user).await;
        dispatcher.session_online(user).await;

        dispatcher.session_offline(user, old_conn).await;
        assert_eq!(dispatcher.presence(user).status, PresenceStatus::Online);

        // the newer session can still receive targeted events
        dispatcher
            .send_to_user(
                user,
                GatewayEvent::Error {
                    code: "test".into(),
                    message: "still here".into(),
                },
            )
            .await;
    }

    #[tokio::test]
    async fn commit_broadcasts_exactly_the_returned_event() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let conv = Uuid::new_v4();

        let value = dispatcher
            .commit(|| {
                Ok((
                    42,
                    Some(GatewayEvent::ConversationDeleted { conversation_id: conv }),
                ))
            })
            .unwrap();
        assert_eq!(value, 42);
        assert!(matches!(
            rx.try_recv().unwrap(),
            GatewayEvent::ConversationDeleted { conversation_id } if conversation_id == conv
        ));

        // a failed commit broadcasts nothing
        let err = dispatcher
            .commit::<()>(|| Err(ChatError::ConversationLocked))
            .unwrap_err();
        assert!(matches!(err, ChatError::ConversationLocked));
        assert!(rx.try_recv().is_err());
    }
}
