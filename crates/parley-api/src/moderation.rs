use uuid::Uuid;

use parley_db::Database;
use parley_types::error::ChatError;
use parley_types::models::Role;

/// The moderation gate. Failures are always `Forbidden`, never a more
/// specific reason; privilege information must not leak.
pub fn ensure_privileged(role: Role) -> Result<(), ChatError> {
    if role.is_privileged() {
        Ok(())
    } else {
        Err(ChatError::Forbidden)
    }
}

/// Blocking role lookup + gate check, for use inside store closures.
pub fn require_moderator(db: &Database, user_id: Uuid) -> Result<(), ChatError> {
    ensure_privileged(db.get_user_role(user_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_moderators_pass_the_gate() {
        assert!(ensure_privileged(Role::Moderator).is_ok());
        assert!(matches!(
            ensure_privileged(Role::Member),
            Err(ChatError::Forbidden)
        ));
    }
}
