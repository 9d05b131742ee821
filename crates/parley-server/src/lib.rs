use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_api::auth::{self, AppState, AppStateInner};
use parley_api::middleware::require_auth;
use parley_api::{admin, conversations, messages, reactions};
use parley_db::Database;
use parley_gateway::connection;
use parley_gateway::dispatcher::Dispatcher;

/// Process configuration, read from the environment.
#[derive(Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    /// Usernames that register with the moderator role.
    pub moderators: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            db_path: std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into()),
            jwt_secret: std::env::var("PARLEY_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".into()),
            host: std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PARLEY_PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()?,
            moderators: std::env::var("PARLEY_MODERATORS")
                .unwrap_or_default()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| s.trim().to_string())
                .collect(),
        })
    }
}

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
}

/// Assemble the full application router. REST and the WebSocket gateway
/// share one store and one dispatcher, so both doors observe identical
/// invariants.
pub fn build_router(db: Arc<Database>, dispatcher: Dispatcher, config: &ServerConfig) -> Router {
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: dispatcher.clone(),
        jwt_secret: config.jwt_secret.clone(),
        moderators: config.moderators.clone(),
    });

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/{conversation_id}",
            patch(conversations::update_conversation).delete(conversations::delete_conversation),
        )
        .route("/conversations/{conversation_id}/pin", post(conversations::pin))
        .route("/conversations/{conversation_id}/unpin", post(conversations::unpin))
        .route("/conversations/{conversation_id}/archive", post(conversations::archive))
        .route(
            "/conversations/{conversation_id}/unarchive",
            post(conversations::unarchive),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/conversations/{conversation_id}/receipts",
            post(reactions::merge_receipts),
        )
        .route(
            "/messages/{message_id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        .route("/messages/{message_id}/reactions", post(reactions::add_reaction))
        .route(
            "/messages/{message_id}/reactions/{emoji}",
            delete(reactions::remove_reaction),
        )
        .route(
            "/admin/conversations/{conversation_id}/lock",
            post(admin::lock_conversation),
        )
        .route(
            "/admin/conversations/{conversation_id}/unlock",
            post(admin::unlock_conversation),
        )
        .route("/admin/messages/{message_id}", delete(admin::delete_message))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new().route("/gateway", get(ws_upgrade)).with_state(GatewayState {
        dispatcher,
        db,
        jwt_secret: config.jwt_secret.clone(),
    });

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.db, state.jwt_secret)
    })
}
