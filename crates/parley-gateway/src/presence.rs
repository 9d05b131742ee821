use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use parley_types::models::PresenceStatus;

/// How long a presence write stays fresh. Every client activity ping and
/// every connect refreshes it; lapsing back to offline needs no explicit
/// delete.
pub const PRESENCE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct PresenceSnapshot {
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}

struct Entry {
    status: PresenceStatus,
    last_seen: DateTime<Utc>,
    expires_at: Instant,
}

/// Ephemeral TTL-based presence. Expired or absent entries read as
/// offline; entries are never removed, only outlived. Intentionally
/// decoupled from the durable store; presence does not survive restart.
pub struct PresenceRegister {
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl PresenceRegister {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, user_id: Uuid, status: PresenceStatus) -> PresenceSnapshot {
        let last_seen = Utc::now();
        let mut entries = self.entries.write().expect("presence lock poisoned");
        entries.insert(
            user_id,
            Entry {
                status,
                last_seen,
                expires_at: Instant::now() + PRESENCE_TTL,
            },
        );
        PresenceSnapshot { status, last_seen }
    }

    pub fn get(&self, user_id: Uuid) -> PresenceSnapshot {
        let entries = self.entries.read().expect("presence lock poisoned");
        match entries.get(&user_id) {
            Some(entry) if entry.expires_at > Instant::now() => PresenceSnapshot {
                status: entry.status,
                last_seen: entry.last_seen,
            },
            Some(entry) => PresenceSnapshot {
                status: PresenceStatus::Offline,
                last_seen: entry.last_seen,
            },
            None => PresenceSnapshot {
                status: PresenceStatus::Offline,
                last_seen: DateTime::default(),
            },
        }
    }
}

impl Default for PresenceRegister {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unknown_user_reads_offline() {
        let register = PresenceRegister::new();
        let snapshot = register.get(Uuid::new_v4());
        assert_eq!(snapshot.status, PresenceStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn presence_lapses_to_offline_after_ttl() {
        let register = PresenceRegister::new();
        let user = Uuid::new_v4();

        register.set(user, PresenceStatus::Online);
        assert_eq!(register.get(user).status, PresenceStatus::Online);

        tokio::time::advance(PRESENCE_TTL / 2).await;
        assert_eq!(register.get(user).status, PresenceStatus::Online);

        tokio::time::advance(PRESENCE_TTL).await;
        let snapshot = register.get(user);
        assert_eq!(snapshot.status, PresenceStatus::Offline);
        // last_seen survives expiry
        assert!(snapshot.last_seen > DateTime::<Utc>::default());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_extends_the_ttl() {
        let register = PresenceRegister::new();
        let user = Uuid::new_v4();

        register.set(user, PresenceStatus::Online);
        tokio::time::advance(Duration::from_secs(45)).await;
        register.set(user, PresenceStatus::Online);
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(register.get(user).status, PresenceStatus::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn away_status_is_reported_until_expiry() {
        let register = PresenceRegister::new();
        let user = Uuid::new_v4();

        register.set(user, PresenceStatus::Away);
        assert_eq!(register.get(user).status, PresenceStatus::Away);

        register.set(user, PresenceStatus::Offline);
        assert_eq!(register.get(user).status, PresenceStatus::Offline);
    }
}
