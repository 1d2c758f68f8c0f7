//! SQLite backend for the Terrace analytics store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. The SCD write path runs as one
//! transaction per team-table pair; history rows are never rewritten.

mod encode;
mod schema;
mod store;
mod validate;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
