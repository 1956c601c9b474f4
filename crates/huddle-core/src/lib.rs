pub mod errors;
pub mod frames;
pub mod identity;
pub mod ids;
pub mod message;
pub mod store;

pub use errors::{ErrorKind, RoutingError, StoreError, ValidationError};
pub use identity::Identity;
pub use ids::{ConnectionId, MessageId, RoomId, UserId};
pub use message::{NewMessage, Recipient, StoredMessage};
pub use store::MessageStore;
