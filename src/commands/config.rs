use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hooks_daemon::client::ClientError;
use hooks_daemon::config::Config;
use hooks_daemon::daemon::paths::ProjectLayout;
use hooks_daemon::daemon::protocol::SystemAction;
use hooks_daemon::handlers::HandlerRegistry;

use super::{print_json, ProjectContext};

/// Print the daemon's effective config, or the on-disk one if no daemon runs
pub async fn show(ctx: &ProjectContext) -> Result<()> {
    match ctx.client().system(SystemAction::Config).await {
        Ok(config) => print_json(&config),
        Err(ClientError::DaemonNotRunning(_)) => {
            print!("{}", ctx.config.to_toml()?);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn target_path(layout: &ProjectLayout, path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| layout.config_path())
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read config file '{}'", path.display()))
}

/// Report every problem in a config file, exiting non-zero if any
pub fn validate(layout: &ProjectLayout, path: Option<PathBuf>) -> Result<()> {
    let path = target_path(layout, path);
    let config = Config::parse(&read_document(&path)?)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;

    let mut errors = config.validation_errors();
    errors.extend(
        HandlerRegistry::builtin()
            .unknown_handler_ids(&config, layout.root())
            .into_iter()
            .map(|id| format!("{}: unknown handler id", id)),
    );

    if errors.is_empty() {
        println!("{}: valid", path.display());
        return Ok(());
    }
    for error in &errors {
        println!("  - {}", error);
    }
    anyhow::bail!("{}: {} problem(s) found", path.display(), errors.len())
}

/// Show fields where the config differs from the defaults
pub fn diff(layout: &ProjectLayout, path: Option<PathBuf>) -> Result<()> {
    let path = target_path(layout, path);
    let config = Config::parse(&read_document(&path)?)?;
    let changes = Config::default().diff(&config)?;
    if changes.is_empty() {
        println!("No differences from defaults");
        return Ok(());
    }
    for change in changes {
        let show = |v: &Option<serde_json::Value>| v.as_ref().map_or("(unset)".to_string(), |v| v.to_string());
        println!("{}: {} -> {}", change.path, show(&change.left), show(&change.right));
    }
    Ok(())
}

/// Carry a config file forward onto the current defaults
pub fn merge(layout: &ProjectLayout, path: Option<PathBuf>, write: bool) -> Result<()> {
    let path = target_path(layout, path);
    let merged = Config::merge_document(&HandlerRegistry::builtin().default_config(), &read_document(&path)?)?;
    let rendered = merged.to_toml()?;
    if write {
        std::fs::write(&path, &rendered)
            .with_context(|| format!("Failed to write config file '{}'", path.display()))?;
        println!("Wrote merged config to {}", path.display());
    } else {
        print!("{}", rendered);
    }
    Ok(())
}

/// Write a config listing every built-in handler with its defaults
pub fn init(layout: &ProjectLayout, force: bool) -> Result<()> {
    let path = layout.config_path();
    if path.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
    }
    std::fs::create_dir_all(layout.claude_dir())
        .with_context(|| format!("Failed to create {}", layout.claude_dir().display()))?;
    let rendered = HandlerRegistry::builtin().default_config().to_toml()?;
    std::fs::write(&path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
