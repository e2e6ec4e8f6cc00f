//! Execution environment detection
//!
//! Decides how aggressively single-instance enforcement may act. On a
//! shared workstation other daemons may belong to other projects and must
//! be left alone; inside a throwaway container every daemon is ours.

use std::env;
use std::path::Path;

use serde::Serialize;

use crate::config::{DaemonConfig, InstancePolicySetting, IsolationWeights};

pub const ENV_SINGLE_INSTANCE: &str = "HOOKS_DAEMON_SINGLE_INSTANCE";

/// Effective single-instance policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstancePolicy {
    Conservative,
    Aggressive,
}

/// Observed environment facts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IsolationIndicators {
    pub container: bool,
    pub ci: bool,
    pub devcontainer: bool,
    pub generated_hostname: bool,
    pub root_user: bool,
}

impl IsolationIndicators {
    /// Probe the current process environment
    pub fn detect() -> Self {
        Self {
            container: Path::new("/.dockerenv").exists()
                || Path::new("/run/.containerenv").exists()
                || env::var_os("container").is_some()
                || cgroup_mentions_container(),
            ci: ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "BUILDKITE", "JENKINS_URL"]
                .iter()
                .any(|key| env::var_os(key).is_some_and(|v| !v.is_empty() && v != "false")),
            devcontainer: ["REMOTE_CONTAINERS", "CODESPACES", "DEVCONTAINER"]
                .iter()
                .any(|key| env::var_os(key).is_some()),
            generated_hostname: hostname().is_some_and(|h| looks_generated(&h)),
            // SAFETY: geteuid has no preconditions
            root_user: unsafe { libc::geteuid() } == 0,
        }
    }

    /// Weighted score in `[0, 1]`
    pub fn score(&self, weights: &IsolationWeights) -> f64 {
        let total: f64 = [
            (self.container, weights.container),
            (self.ci, weights.ci),
            (self.devcontainer, weights.devcontainer),
            (self.generated_hostname, weights.generated_hostname),
            (self.root_user, weights.root_user),
        ]
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, weight)| weight)
        .sum();
        total.min(1.0)
    }
}

/// Policy from an explicit setting, or from the isolation score for `auto`
pub fn choose_policy(
    setting: InstancePolicySetting,
    indicators: &IsolationIndicators,
    weights: &IsolationWeights,
    threshold: f64,
) -> InstancePolicy {
    match setting {
        InstancePolicySetting::Conservative => InstancePolicy::Conservative,
        InstancePolicySetting::Aggressive => InstancePolicy::Aggressive,
        InstancePolicySetting::Auto => {
            if indicators.score(weights) >= threshold {
                InstancePolicy::Aggressive
            } else {
                InstancePolicy::Conservative
            }
        }
    }
}

/// Setting after applying the environment override
pub fn policy_setting(config: &DaemonConfig) -> InstancePolicySetting {
    match env::var(ENV_SINGLE_INSTANCE).ok().as_deref().map(str::trim) {
        Some("conservative") => InstancePolicySetting::Conservative,
        Some("aggressive") => InstancePolicySetting::Aggressive,
        Some("auto") => InstancePolicySetting::Auto,
        _ => config.single_instance,
    }
}

fn cgroup_mentions_container() -> bool {
    std::fs::read_to_string("/proc/1/cgroup")
        .map(|c| ["docker", "kubepods", "containerd", "lxc", "podman"].iter().any(|m| c.contains(m)))
        .unwrap_or(false)
}

/// Container runtimes name hosts after hex ids (`3f2a9c1b7d4e`) or
/// pod-style suffixes (`runner-7d9f8-x2kqz`)
pub fn looks_generated(hostname: &str) -> bool {
    let is_hex_id = hostname.len() == 12 && hostname.chars().all(|c| c.is_ascii_hexdigit());
    let pod_style = hostname
        .rsplit('-')
        .next()
        .is_some_and(|tail| tail.len() == 5 && tail.chars().all(|c| c.is_ascii_alphanumeric()))
        && hostname.matches('-').count() >= 2;
    is_hex_id || pod_style
}

/// Hostname via gethostname(2)
pub fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Some(String::from_utf8_lossy(&buf[..end]).into_owned()).filter(|h| !h.is_empty())
}
