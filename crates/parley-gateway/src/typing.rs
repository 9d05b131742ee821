use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use uuid::Uuid;

/// Inactivity window after which a typing signal auto-stops if no
/// renewal arrives. Advisory UI state only; the value is a product
/// choice, not derived from any persistence requirement.
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(8);

/// Ephemeral "who is typing where" map. Never persisted; each start
/// hands out a token so a stale timer cannot clear a renewed signal.
pub struct TypingTracker {
    entries: Mutex<HashMap<(Uuid, Uuid), u64>>,
    next_token: AtomicU64,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Record a start signal, overwriting any prior state. Returns the
    /// token the auto-stop timer must present to expire this entry.
    pub fn begin(&self, conversation_id: Uuid, user_id: Uuid) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .expect("typing lock poisoned")
            .insert((conversation_id, user_id), token);
        token
    }

    /// Explicit stop. Returns true when a signal was actually cleared.
    pub fn stop(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.entries
            .lock()
            .expect("typing lock poisoned")
            .remove(&(conversation_id, user_id))
            .is_some()
    }

    /// Timer expiry: clears the entry only if it has not been renewed
    /// since the timer was armed.
    pub fn expire(&self, conversation_id: Uuid, user_id: Uuid, token: u64) -> bool {
        let mut entries = self.entries.lock().expect("typing lock poisoned");
        match entries.get(&(conversation_id, user_id)) {
            Some(&current) if current == token => {
                entries.remove(&(conversation_id, user_id));
                true
            }
            _ => false,
        }
    }

    /// Disconnect cleanup: drop every signal for the user and report the
    /// conversations that need a stop broadcast.
    pub fn clear_user(&self, user_id: Uuid) -> Vec<Uuid> {
        let mut entries = self.entries.lock().expect("typing lock poisoned");
        let conversations: Vec<Uuid> = entries
            .keys()
            .filter(|(_, uid)| *uid == user_id)
            .map(|(cid, _)| *cid)
            .collect();
        for cid in &conversations {
            entries.remove(&(*cid, user_id));
        }
        conversations
    }

    pub fn is_typing(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.entries
            .lock()
            .expect("typing lock poisoned")
            .contains_key(&(conversation_id, user_id))
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_clears_and_reports() {
        let tracker = TypingTracker::new();
        let (conv, user) = (Uuid::new_v4(), Uuid::new_v4());

        tracker.begin(conv, user);
        assert!(tracker.is_typing(conv, user));
        assert!(tracker.stop(conv, user));
        assert!(!tracker.is_typing(conv, user));
        // stopping again is a silent no-op
        assert!(!tracker.stop(conv, user));
    }

    #[test]
    fn stale_timer_cannot_clear_a_renewed_signal() {
        let tracker = TypingTracker::new();
        let (conv, user) = (Uuid::new_v4(), Uuid::new_v4());

        let first = tracker.begin(conv, user);
        let second = tracker.begin(conv, user);

        assert!(!tracker.expire(conv, user, first));
        assert!(tracker.is_typing(conv, user));
        assert!(tracker.expire(conv, user, second));
        assert!(!tracker.is_typing(conv, user));
    }

    #[test]
    fn disconnect_clears_every_conversation_for_the_user() {
        let tracker = TypingTracker::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());

        tracker.begin(c1, user);
        tracker.begin(c2, user);
        tracker.begin(c1, other);

        let mut cleared = tracker.clear_user(user);
        cleared.sort();
        let mut expected = vec![c1, c2];
        expected.sort();
        assert_eq!(cleared, expected);
        assert!(tracker.is_typing(c1, other));
    }
}
