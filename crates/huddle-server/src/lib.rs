pub mod config;
pub mod connection;
pub mod error_channel;
pub mod presence;
pub mod rooms;
pub mod router;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use connection::ClientConnection;
pub use presence::PresenceRegistry;
pub use rooms::RoomRegistry;
pub use router::{MessageRouter, RouteError, RouteResult};
pub use server::{build_router, start, AppState, ServerHandle};
pub use session::SessionState;
