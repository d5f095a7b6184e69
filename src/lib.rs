//! Recipe sharing core: users, recipes, favorites, shopping carts and
//! subscriptions over SQLite or PostgreSQL.

pub mod config;
pub mod db;
pub mod error;
pub mod fixtures;
pub mod logging;
pub mod shopping;

pub use db::Database;
pub use error::{Error, Result};
