use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use parley_types::api::ErrorBody;
use parley_types::error::ChatError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Wraps the domain taxonomy for axum. Every handler returns the same
/// stable code/message body; internal detail never reaches the client.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::InvalidParticipants | ChatError::EmptyMessage => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ChatError::ConversationNotFound | ChatError::MessageNotFound => StatusCode::NOT_FOUND,
            ChatError::ConversationLocked => StatusCode::LOCKED,
            ChatError::Forbidden => StatusCode::FORBIDDEN,
            ChatError::AuthRequired | ChatError::AuthInvalid => StatusCode::UNAUTHORIZED,
            ChatError::Internal(detail) => {
                error!("internal error: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let details = match &self.0 {
            ChatError::InvalidParticipants | ChatError::EmptyMessage => {
                Some(vec![self.0.to_string()])
            }
            _ => None,
        };

        let message = match &self.0 {
            ChatError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.0.code().to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}
