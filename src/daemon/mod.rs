//! Daemon Module
//!
//! One daemon per project. It owns the handler chains and serves hook
//! requests over a Unix socket until it is stopped or goes idle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        hooks-daemon                          │
//! │                                                              │
//! │  ┌────────────────┐   ┌──────────────────────────────────┐   │
//! │  │ Unix Socket    │──▶│ DaemonController                 │   │
//! │  │ (one request   │   │  validate → route → dispatch     │   │
//! │  │  per conn)     │◀──│  → render → stats                │   │
//! │  └────────────────┘   └───────────────┬──────────────────┘   │
//! │                                       │                      │
//! │                       ┌───────────────┴──────────────────┐   │
//! │                       │ EventRouter                      │   │
//! │                       │  PreToolUse → [10, 20, 30, 50]   │   │
//! │                       │  SessionStart → [50]  ...        │   │
//! │                       └──────────────────────────────────┘   │
//! │                                                              │
//! │  Lifecycle: PID lock, idle watcher, signal handling          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! hooks-daemon start            # background, returns once reachable
//! hooks-daemon status
//! echo '{"tool_name": "Bash", ...}' | hooks-daemon hook PreToolUse
//! hooks-daemon stop
//! ```

pub mod controller;
pub mod environment;
pub mod lifecycle;
pub mod paths;
pub mod process;
pub mod protocol;
pub mod response;
pub mod server;
pub mod stats;
pub mod validation;

pub use controller::{DaemonController, InstanceInfo};
pub use lifecycle::{get_daemon_pid, is_daemon_running, Daemon, DaemonOptions, LifecycleError};
pub use paths::{ArtifactOverrides, ProjectLayout, RuntimeArtifacts};
pub use protocol::{Request, SystemAction};
pub use server::IpcServer;
pub use stats::{DaemonStats, StatsSnapshot};
