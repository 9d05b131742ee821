use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;
use parley_types::api::{
    Claims, ErrorBody, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};
use parley_types::error::ChatError;
use parley_types::models::Role;

use crate::blocking;
use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    /// Usernames granted the moderator role at registration.
    pub moderators: Vec<String>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Response> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Ok(validation_failure("username must be 3-32 characters"));
    }
    if req.password.len() < 8 {
        return Ok(validation_failure("password must be at least 8 characters"));
    }

    let taken = {
        let db = state.db.clone();
        let username = req.username.clone();
        blocking(move || db.get_user_by_username(&username)).await?
    };
    if taken.is_some() {
        return Ok((
            StatusCode::CONFLICT,
            Json(ErrorBody {
                error: "username_taken".into(),
                message: "username is already registered".into(),
                details: None,
            }),
        )
            .into_response());
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError(ChatError::internal(e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let role = if state.moderators.iter().any(|m| m == &req.username) {
        Role::Moderator
    } else {
        Role::Member
    };

    {
        let db = state.db.clone();
        let username = req.username.clone();
        blocking(move || db.create_user(user_id, &username, &password_hash, role)).await?;
    }

    let token = create_token(&state.jwt_secret, user_id, &req.username)
        .map_err(|e| ApiError(ChatError::internal(e)))?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })).into_response())
}

fn validation_failure(detail: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorBody {
            error: "invalid_credentials".into(),
            message: detail.into(),
            details: Some(vec![detail.into()]),
        }),
    )
        .into_response()
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = {
        let db = state.db.clone();
        let username = req.username.clone();
        blocking(move || db.get_user_by_username(&username)).await?
    }
    .ok_or(ApiError(ChatError::AuthInvalid))?;

    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|e| ApiError(ChatError::internal(e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError(ChatError::AuthInvalid))?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError(ChatError::internal(e)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(|e| ApiError(ChatError::internal(e)))?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
