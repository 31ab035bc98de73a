//! # agentgraph-cli
//!
//! Inspect and maintain the SQLite checkpoint database written by agentgraph
//! runs: list threads, read state and history, append human input to a paused
//! thread, verify parent chains and upgrade legacy checkpoints.
//!
//! Configuration is layered by [`config::ConfigLoader`]; see that module for
//! file locations and environment overrides.

pub mod commands;
pub mod config;
pub mod env;
pub mod error;
pub mod logging;

pub use commands::Database;
pub use config::{AgentGraphConfig, ConfigLoader};
pub use error::{CliError, Result};
