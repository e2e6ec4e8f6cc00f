//! External handler plugins
//!
//! A plugin is a TOML manifest declaring handlers backed by executables:
//!
//! ```toml
//! [[handlers]]
//! id = "no_todo_commits"
//! category = "pre_tool_use"
//! priority = 40
//! tags = ["custom"]
//! tools = ["Bash"]
//! command = "./check-commit.sh"
//! timeout_ms = 5000
//! ```
//!
//! The command receives `{"event": <wire name>, "input": <hook input>}` on
//! stdin and prints an outcome (`{"kind": "final", "decision": ...}` or
//! `{"kind": "advisory", "context": [...]}`) on stdout. Empty output passes.
//! Load failures are logged and the plugin is skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{PluginEntry, PluginsConfig};
use crate::dispatch::{Handler, HandlerMeta, HandlerSource, Outcome};
use crate::types::{EventCategory, HookEvent};
use crate::util::truncate_str;

use super::exec::run_with_timeout;

/// Manifest file name looked up when a plugin path is a directory
pub const MANIFEST_FILE: &str = "plugin.toml";

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    handlers: Vec<ManifestHandler>,
}

#[derive(Debug, Deserialize)]
struct ManifestHandler {
    id: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    tools: Vec<String>,
    command: PathBuf,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

fn default_priority() -> i32 {
    50
}

fn default_timeout_ms() -> u64 {
    5000
}

/// A resolved plugin handler, not yet admitted into a chain
#[derive(Debug, Clone)]
pub struct PluginHandlerSpec {
    pub meta: HandlerMeta,
    pub manifest: PathBuf,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub tools: Vec<String>,
    pub timeout: Duration,
}

impl PluginHandlerSpec {
    pub fn into_handler(self) -> Arc<dyn Handler> {
        Arc::new(ExternalHandler { spec: self })
    }
}

/// Resolve every enabled plugin declared in the config
pub fn load_plugins(config: &PluginsConfig, project_root: &Path) -> Vec<PluginHandlerSpec> {
    let mut specs = Vec::new();

    for dir in &config.paths {
        let dir = resolve(project_root, dir);
        let mut manifests: Vec<PathBuf> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .collect(),
            Err(e) => {
                warn!("Cannot read plugin directory {}: {}", dir.display(), e);
                continue;
            }
        };
        manifests.sort();
        for manifest in manifests {
            collect(&manifest, None, &[], &mut specs);
        }
    }

    for entry in config.plugins.iter().filter(|p| p.enabled) {
        let manifest = manifest_path(project_root, entry);
        let target = match entry.target_category.as_deref().map(str::parse::<EventCategory>) {
            None => None,
            Some(Ok(category)) => Some(category),
            Some(Err(e)) => {
                warn!("Skipping plugin {}: {}", manifest.display(), e);
                continue;
            }
        };
        collect(&manifest, target, &entry.class_names, &mut specs);
    }

    specs
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn manifest_path(root: &Path, entry: &PluginEntry) -> PathBuf {
    let path = resolve(root, &entry.path);
    if path.is_dir() {
        path.join(MANIFEST_FILE)
    } else {
        path
    }
}

fn collect(
    manifest: &Path,
    target: Option<EventCategory>,
    only: &[String],
    out: &mut Vec<PluginHandlerSpec>,
) {
    match parse_manifest(manifest, target, only) {
        Ok(specs) => {
            debug!("Plugin {} declares {} handlers", manifest.display(), specs.len());
            out.extend(specs);
        }
        Err(e) => warn!("Skipping plugin {}: {:#}", manifest.display(), e),
    }
}

fn parse_manifest(
    manifest: &Path,
    target: Option<EventCategory>,
    only: &[String],
) -> Result<Vec<PluginHandlerSpec>> {
    let content = fs::read_to_string(manifest)
        .with_context(|| format!("failed to read {}", manifest.display()))?;
    let parsed: Manifest = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", manifest.display()))?;
    let base = manifest.parent().unwrap_or(Path::new("."));

    let mut specs = Vec::new();
    for decl in parsed.handlers {
        if !only.is_empty() && !only.contains(&decl.id) {
            continue;
        }
        let category = match (target, decl.category.as_deref()) {
            (Some(category), _) => category,
            (None, Some(name)) => name
                .parse::<EventCategory>()
                .with_context(|| format!("handler '{}'", decl.id))?,
            (None, None) => bail!("handler '{}' has no category", decl.id),
        };
        let meta = HandlerMeta::new(decl.id, category, decl.priority)
            .with_tags(decl.tags)
            .with_source(HandlerSource::Plugin(manifest.to_path_buf()));
        specs.push(PluginHandlerSpec {
            meta,
            manifest: manifest.to_path_buf(),
            command: resolve(base, &decl.command),
            args: decl.args,
            tools: decl.tools,
            timeout: Duration::from_millis(decl.timeout_ms),
        });
    }
    Ok(specs)
}

/// Handler backed by an external executable
struct ExternalHandler {
    spec: PluginHandlerSpec,
}

impl Handler for ExternalHandler {
    fn meta(&self) -> &HandlerMeta {
        &self.spec.meta
    }

    fn matches(&self, event: &HookEvent) -> bool {
        self.spec.tools.is_empty()
            || event
                .tool_name()
                .is_some_and(|tool| self.spec.tools.iter().any(|t| t == tool))
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        let payload = json!({
            "event": event.category.wire_name(),
            "input": event.input,
        });
        let stdin = serde_json::to_vec(&payload)?;
        let mut command = Command::new(&self.spec.command);
        command.args(&self.spec.args);
        if let Some(dir) = self.spec.manifest.parent() {
            command.current_dir(dir);
        }

        let output = run_with_timeout(&mut command, Some(&stdin), self.spec.timeout)?;
        if !output.success() {
            bail!(
                "plugin exited with {}: {}",
                output.status,
                truncate_str(output.stderr.trim(), 200)
            );
        }

        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            return Ok(Outcome::pass());
        }
        serde_json::from_str(stdout).with_context(|| {
            format!("plugin printed an invalid outcome: {}", truncate_str(stdout, 200))
        })
    }
}
