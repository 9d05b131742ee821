use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use parley_types::api::Claims;
use parley_types::error::ChatError;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the bearer JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError(ChatError::AuthRequired))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError(ChatError::AuthRequired))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError(ChatError::AuthInvalid))?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}
