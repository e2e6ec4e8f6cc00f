//! CLI command implementations

pub mod config;
pub mod daemon;
pub mod hook;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use hooks_daemon::client::{DaemonClient, Launcher};
use hooks_daemon::config::Config;
use hooks_daemon::daemon::paths::{resolve_project_root, ArtifactOverrides, ProjectLayout, RuntimeArtifacts};

/// Everything a command needs to know about the current project
pub struct ProjectContext {
    pub layout: ProjectLayout,
    pub config: Config,
    pub artifacts: RuntimeArtifacts,
}

impl ProjectContext {
    /// Resolve the project root and load its config
    pub fn resolve(explicit_root: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let root = resolve_project_root(explicit_root, &cwd)?;
        Self::for_root(root)
    }

    pub fn for_root(root: PathBuf) -> Result<Self> {
        let layout = ProjectLayout::new(root);
        let config = Config::load_or_default(&layout.config_path())?;
        let artifacts = RuntimeArtifacts::resolve(&layout, &config.daemon, &ArtifactOverrides::from_env());
        Ok(Self {
            layout,
            config,
            artifacts,
        })
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn client(&self) -> DaemonClient {
        DaemonClient::new(&self.artifacts.socket_path)
    }

    pub fn launcher(&self) -> Result<Launcher> {
        Launcher::new(
            self.root().to_path_buf(),
            self.artifacts.clone(),
            Duration::from_millis(self.config.daemon.startup_timeout_ms),
        )
    }

    /// Client for a running daemon, starting one if needed
    pub async fn connect(&self) -> Result<DaemonClient> {
        self.launcher()?.ensure_daemon_running().await?;
        Ok(self.client())
    }
}

pub(crate) fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
