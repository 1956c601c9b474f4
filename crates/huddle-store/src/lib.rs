pub mod database;
pub mod messages;
pub mod schema;

pub use database::Database;
pub use messages::MessageRepo;
