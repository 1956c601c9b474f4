use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use huddle_auth::{Authenticator, CredentialVerifier};
use huddle_core::MessageStore;

use crate::config::ServerConfig;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;
use crate::router::MessageRouter;
use crate::session;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub router: Arc<MessageRouter>,
    pub store: Arc<dyn MessageStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn MessageStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let router = Arc::new(MessageRouter::new(
            store.clone(),
            presence.clone(),
            rooms.clone(),
            config.max_payload_bytes,
        ));
        Self {
            authenticator: Arc::new(Authenticator::new(verifier)),
            presence,
            rooms,
            router,
            store,
            config: Arc::new(config),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle with the bound port.
pub async fn start(
    config: ServerConfig,
    store: Arc<dyn MessageStore>,
    verifier: Arc<dyn CredentialVerifier>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(config, store, verifier);
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "huddle server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()` — keeps the accept loop alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
///
/// The credential rides on the handshake metadata: `Authorization: Bearer`
/// header, or a `token` query parameter as a fallback for clients that cannot
/// set headers on the upgrade request.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let credential = bearer_token(&headers).or_else(|| params.get("token").cloned());
    ws.on_upgrade(move |socket| session::run_session(socket, credential, state))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "connections": state.presence.connection_count(),
        "identities": state.presence.identity_count(),
        "rooms": state.rooms.room_count(),
    }))
}
