pub mod models;
pub mod queries;

pub use models::{clamp_ttl, CreatedMessage, Message, NewMessage};
pub use queries::{init_db, DbPool, MessageStore};
