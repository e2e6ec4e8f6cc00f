//! Configuration for hooks-daemon
//!
//! The config file lives at `<project>/.claude/hooks-daemon.toml`. Every
//! section is optional; a missing file means defaults everywhere.

mod daemon;
mod handlers;
mod logging;
mod plugins;

pub use daemon::{DaemonConfig, InstancePolicySetting, IsolationWeights, ValidationMode};
pub use handlers::{CategoryHandlers, HandlerSettings, HandlersConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use plugins::{PluginEntry, PluginsConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::types::EventCategory;

/// Config schema version understood by this build
pub const CONFIG_VERSION: u32 = 1;

/// Main configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Daemon process settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-category handler overrides
    #[serde(default, skip_serializing_if = "HandlersConfig::is_empty")]
    pub handlers: HandlersConfig,
    /// External handler sources
    #[serde(default)]
    pub plugins: PluginsConfig,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            daemon: DaemonConfig::default(),
            logging: LoggingConfig::default(),
            handlers: HandlersConfig::new(),
            plugins: PluginsConfig::default(),
        }
    }
}

/// A single difference reported by [`Config::diff`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigChange {
    /// Dotted field path, e.g. `daemon.idle_timeout_secs`
    pub path: String,
    pub left: Option<Value>,
    pub right: Option<Value>,
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config if the file exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse a TOML document without validating it.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Handler settings for a category, if any were configured
    pub fn category(&self, category: EventCategory) -> Option<&CategoryHandlers> {
        self.handlers.get(category.config_key())
    }

    /// Validate all configuration fields.
    ///
    /// Every problem is reported with its field path, and all of them are
    /// reported together.
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }

    /// Collect validation errors without failing.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors: Vec<String> = Vec::new();

        if self.version != CONFIG_VERSION {
            errors.push(format!(
                "version: unsupported config version {} (expected {})",
                self.version, CONFIG_VERSION
            ));
        }

        // Daemon
        if self.daemon.request_timeout_secs == 0 {
            errors.push("daemon.request_timeout_secs must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.daemon.isolation_threshold) {
            errors.push("daemon.isolation_threshold must be between 0.0 and 1.0".to_string());
        }
        for (name, weight) in self.daemon.isolation_weights.fields() {
            if !(weight >= 0.0 && weight.is_finite()) {
                errors.push(format!(
                    "daemon.isolation_weights.{} must be a non-negative number",
                    name
                ));
            }
        }
        if self.daemon.startup_timeout_ms == 0 {
            errors.push("daemon.startup_timeout_ms must be positive".to_string());
        }
        for (field, path) in [
            ("socket_path", &self.daemon.socket_path),
            ("pid_path", &self.daemon.pid_path),
            ("log_path", &self.daemon.log_path),
        ] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                errors.push(format!("daemon.{} must not be empty", field));
            }
        }

        // Logging
        if self.logging.buffer_lines == 0 {
            errors.push("logging.buffer_lines must be positive".to_string());
        }

        // Handlers
        for key in self.handlers.keys() {
            if key.parse::<EventCategory>().is_err() {
                errors.push(format!("handlers.{}: unknown event category", key));
            }
        }

        // Plugins
        for (i, plugin) in self.plugins.plugins.iter().enumerate() {
            if plugin.path.as_os_str().is_empty() {
                errors.push(format!("plugins.plugins[{}].path must not be empty", i));
            }
            if let Some(category) = &plugin.target_category {
                if category.parse::<EventCategory>().is_err() {
                    errors.push(format!(
                        "plugins.plugins[{}].target_category: unknown event category '{}'",
                        i, category
                    ));
                }
            }
        }
        for (i, path) in self.plugins.paths.iter().enumerate() {
            if path.as_os_str().is_empty() {
                errors.push(format!("plugins.paths[{}] must not be empty", i));
            }
        }

        errors
    }

    /// Field-by-field differences between two configs (left = self).
    pub fn diff(&self, other: &Config) -> Result<Vec<ConfigChange>> {
        let left = serde_json::to_value(self)?;
        let right = serde_json::to_value(other)?;
        let mut changes = Vec::new();
        diff_values("", Some(&left), Some(&right), &mut changes);
        Ok(changes)
    }

    /// Merge a raw TOML user document onto a base config; user values win.
    ///
    /// Used to carry a project's settings forward onto newer defaults: fields
    /// absent from the document keep the base values.
    pub fn merge_document(base: &Config, user_toml: &str) -> Result<Config> {
        let user: toml::Value = toml::from_str(user_toml).context("Failed to parse user config")?;
        let mut merged = serde_json::to_value(base)?;
        merge_values(&mut merged, serde_json::to_value(user)?);
        let config: Config = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn diff_values(path: &str, left: Option<&Value>, right: Option<&Value>, out: &mut Vec<ConfigChange>) {
    match (left, right) {
        (Some(Value::Object(l)), Some(Value::Object(r))) => {
            let mut keys: Vec<&String> = l.keys().chain(r.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                diff_values(&join_path(path, key), l.get(key), r.get(key), out);
            }
        }
        (l, r) if l != r => out.push(ConfigChange {
            path: path.to_string(),
            left: l.cloned(),
            right: r.cloned(),
        }),
        _ => {}
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            for (key, value) in o {
                match b.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        b.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
