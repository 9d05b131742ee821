use thiserror::Error;

/// Domain error taxonomy shared by the store, the REST handlers and the
/// gateway. REST maps these to status codes; the gateway maps them to a
/// caller-scoped `error` frame. Moderation failures always collapse to
/// `Forbidden` so the response never reveals which check tripped.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("direct conversations require exactly two distinct participants")]
    InvalidParticipants,

    #[error("message must carry content or at least one attachment")]
    EmptyMessage,

    #[error("conversation not found")]
    ConversationNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("conversation is locked")]
    ConversationLocked,

    #[error("forbidden")]
    Forbidden,

    #[error("authentication required")]
    AuthRequired,

    #[error("invalid credentials")]
    AuthInvalid,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Stable machine-readable code, used in REST bodies and error frames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParticipants => "invalid_participants",
            Self::EmptyMessage => "empty_message",
            Self::ConversationNotFound => "conversation_not_found",
            Self::MessageNotFound => "message_not_found",
            Self::ConversationLocked => "conversation_locked",
            Self::Forbidden => "forbidden",
            Self::AuthRequired => "auth_required",
            Self::AuthInvalid => "auth_invalid",
            Self::Internal(_) => "internal",
        }
    }

    /// Wrap a store/runtime failure. Detail is logged by the caller, not
    /// leaked to clients.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}
