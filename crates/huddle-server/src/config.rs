//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the huddle server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `9090`; `0` auto-assigns).
    pub port: u16,
    /// Per-connection outbound queue depth.
    pub max_send_queue: usize,
    /// Maximum message payload size in bytes.
    pub max_payload_bytes: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close the connection after this long without a pong.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9090,
            max_send_queue: 256,
            max_payload_bytes: 64 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}
