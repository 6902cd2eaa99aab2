//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration that tunes transfer
//! timeouts, reset recovery and trace output, and writes it back when a
//! front end changes a setting.  Defaults apply when the file is missing.

pub mod config;
