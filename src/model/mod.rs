//! Data models for Lifetrack.
//!
//! - [`Collection`] / [`Sheet`]: the closed set of record kinds and where
//!   each one lives remotely
//! - [`Record`] / [`RemoteRecord`]: stored rows and fetched rows
//! - typed payloads ([`MoodEntry`], [`DopamineEntry`], ...)

pub mod collection;
pub mod entries;
pub mod record;

pub use collection::{Collection, Sheet};
pub use entries::{
    DEFAULT_HABITS, DopamineEntry, DopamineStatus, Entry, HygieneCompletion, HygieneHabit,
    MoodEntry,
};
pub use record::{Record, RemoteId, RemoteRecord, RESERVED_KEYS, strip_reserved};
