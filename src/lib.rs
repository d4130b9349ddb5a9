pub mod config;
pub mod db;
pub mod error;
pub mod id;
pub mod sweeper;
pub mod web;

pub use config::AppConfig;
pub use db::MessageStore;
pub use error::{AppError, AppResult};
