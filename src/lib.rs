//! lifetrack - local-first habit and mood tracking
//!
//! This crate provides the core functionality for the `lt` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Collections, records and typed entries
//! - [`storage`] - SQLite local store
//! - [`sync`] - Durable queue, spreadsheet client and reconciliation
//! - [`tracker`] - User-facing operations on top of the sync engine
//! - [`config`] - Paths and persisted settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;
pub mod tracker;
pub mod validate;

pub use error::{Error, Result};

/// Global silent mode flag for `--silent` output.
///
/// When set, create/mutate commands print only the local ID instead of full
/// output. Avoids threading a `silent` bool through every handler signature.
pub static SILENT: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if silent mode is active.
#[inline]
pub fn is_silent() -> bool {
    SILENT.load(std::sync::atomic::Ordering::Relaxed)
}
