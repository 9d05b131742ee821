pub mod admin;
pub mod auth;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod moderation;
pub mod reactions;

use parley_types::error::ChatError;
use tracing::error;

use crate::error::ApiError;

/// Run blocking store work off the async runtime.
pub(crate) async fn blocking<T>(
    f: impl FnOnce() -> Result<T, ChatError> + Send + 'static,
) -> Result<T, ApiError>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::from(ChatError::internal(e))
        })?
        .map_err(ApiError::from)
}
