//! Configuration system for the Nebula client transport.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, validation, and
//! forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, MAX_BACKOFF_MULTIPLIER, NetworkConfig};
pub use error::ConfigError;
