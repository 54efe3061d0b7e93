//! # Herald Core
//! Shared domain types, collaborator traits, configuration, and errors.
//!
//! The scheduler, the SQLite store, and the WhatsApp gateway all speak in
//! terms of the types defined here, so none of them depend on each other.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::HeraldConfig;
pub use error::{HeraldError, Result};
