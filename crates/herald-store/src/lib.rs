//! # Herald Store
//! SQLite-backed campaign store and tenant directory.
//!
//! One connection behind a mutex; every operation is a short statement, so
//! callers on the async runtime hold the lock only briefly.

mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;
