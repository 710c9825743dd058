//! SQLite storage layer for Lifetrack.
//!
//! - WAL mode, one table per collection
//! - Embedded, idempotent migrations
//! - Transaction discipline for every write
//!
//! # Submodules
//!
//! - [`schema`] - Base schema
//! - [`migrations`] - Versioned migrations
//! - [`sqlite`] - The [`LocalStore`]

pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use sqlite::{LocalStore, SyncStamp};
