//! Daemon process configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::logging::LogLevel;

/// How schema validation failures on hook input are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Log a warning and dispatch anyway
    #[default]
    Warn,
    /// Reject the request before dispatch
    Strict,
    /// Skip validation
    Off,
}

/// Single-instance enforcement policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstancePolicySetting {
    /// Pick from the isolation score of the environment
    #[default]
    Auto,
    /// Only clean up this project's own stale artifacts
    Conservative,
    /// Terminate every other daemon process on the machine
    Aggressive,
}

/// Weight of each environment indicator in the isolation score
///
/// The score is the sum of the weights of the indicators present, capped
/// at 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationWeights {
    /// `/.dockerenv`, `/run/.containerenv`, container cgroups
    pub container: f64,
    /// `CI` and friends
    pub ci: f64,
    /// Devcontainer or Codespaces
    pub devcontainer: f64,
    /// Hostname that looks machine-generated
    pub generated_hostname: f64,
    pub root_user: f64,
}

impl Default for IsolationWeights {
    fn default() -> Self {
        Self {
            container: 0.4,
            ci: 0.3,
            devcontainer: 0.3,
            generated_hostname: 0.15,
            root_user: 0.15,
        }
    }
}

impl IsolationWeights {
    pub fn fields(&self) -> [(&'static str, f64); 5] {
        [
            ("container", self.container),
            ("ci", self.ci),
            ("devcontainer", self.devcontainer),
            ("generated_hostname", self.generated_hostname),
            ("root_user", self.root_user),
        ]
    }
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds without a completed request before self-shutdown (0 = never)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Hard limit for a single hook request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// Abort requests on handler failures instead of skipping the handler
    #[serde(default)]
    pub strict_mode: bool,
    /// Hook input schema validation policy
    #[serde(default)]
    pub input_validation: ValidationMode,
    /// Single-instance enforcement policy
    #[serde(default)]
    pub single_instance: InstancePolicySetting,
    /// Isolation score at or above which `auto` picks the aggressive policy
    #[serde(default = "default_isolation_threshold")]
    pub isolation_threshold: f64,
    #[serde(default)]
    pub isolation_weights: IsolationWeights,
    /// How long a client waits for a lazily started daemon
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,
    /// Socket path override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    /// PID file override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_path: Option<PathBuf>,
    /// Log file override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_isolation_threshold() -> f64 {
    0.5
}

fn default_startup_timeout() -> u64 {
    5000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            request_timeout_secs: default_request_timeout(),
            log_level: default_log_level(),
            strict_mode: false,
            input_validation: ValidationMode::default(),
            single_instance: InstancePolicySetting::default(),
            isolation_threshold: default_isolation_threshold(),
            isolation_weights: IsolationWeights::default(),
            startup_timeout_ms: default_startup_timeout(),
            socket_path: None,
            pid_path: None,
            log_path: None,
        }
    }
}
