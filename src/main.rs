use std::path::PathBuf;
use std::sync::Arc;

use huddle_auth::JwtVerifier;
use huddle_server::ServerConfig;
use huddle_store::{Database, MessageRepo};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting huddle server");

    // Token verification secret, shared with the identity service
    let secret =
        std::env::var("HUDDLE_AUTH_SECRET").expect("HUDDLE_AUTH_SECRET must be set");
    let verifier = Arc::new(JwtVerifier::new(secret.as_bytes()));

    // Message store
    let db_path = std::env::var("HUDDLE_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_home().join(".huddle").join("messages.db"));
    let db = Database::open(&db_path).expect("Failed to open database");
    tracing::info!(path = %db_path.display(), "Database opened");
    let store = Arc::new(MessageRepo::new(db));

    let mut config = ServerConfig::default();
    if let Ok(host) = std::env::var("HUDDLE_HOST") {
        config.host = host;
    }
    if let Ok(port) = std::env::var("HUDDLE_PORT") {
        config.port = port.parse().expect("HUDDLE_PORT must be a port number");
    }

    let handle = huddle_server::start(config, store, verifier)
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "huddle server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
