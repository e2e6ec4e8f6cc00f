//! hooks-daemon: persistent policy daemon for AI coding agent hooks
//!
//! Hook invocations from a coding agent are forwarded over a Unix socket to a
//! long-lived per-project daemon, which runs them through priority-ordered
//! handler chains and answers with the agent's expected response shape:
//! - Lazy startup on first use, idle shutdown after inactivity
//! - Chain-of-responsibility dispatch with context accumulation
//! - Built-in safety handlers plus out-of-process plugin handlers
//! - Single-instance enforcement tuned to the execution environment

pub mod client;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod handlers;
pub mod logging;
pub mod types;
pub mod util;

pub use config::Config;
pub use types::*;
