//! Logging setup for Tandem
//!
//! The IPC crate only emits `tracing` events; binaries and tests decide where
//! they go by installing a subscriber through this crate.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
