//! Command implementations.

pub mod app;
pub mod completions;
pub mod config;
pub mod habit;
pub mod init;
pub mod log;
pub mod records;
pub mod sync;
pub mod version;
pub mod watch;
