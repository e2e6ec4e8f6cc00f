//! External plugin configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One external handler source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Plugin manifest (`.toml`) or a directory containing `plugin.toml`
    pub path: PathBuf,
    /// Category for every handler in the manifest; overrides the manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_category: Option<String>,
    /// Handler ids to load from the manifest (empty = all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_names: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Plugin configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directories scanned for `*.toml` plugin manifests
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginEntry>,
}
