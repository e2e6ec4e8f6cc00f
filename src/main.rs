//! hooks-daemon: persistent policy daemon for agent lifecycle hooks

mod commands;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use hooks_daemon::config::{LogLevel, LoggingConfig};
use hooks_daemon::daemon::paths::{resolve_project_root, ProjectLayout};
use hooks_daemon::logging;
use tracing::warn;

use commands::ProjectContext;

#[derive(Parser)]
#[command(name = "hooks-daemon")]
#[command(about = "Persistent policy daemon for AI coding agent hooks")]
#[command(version)]
struct Cli {
    /// Project root (default: nearest ancestor with a .claude directory)
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Run in this process instead of spawning a background daemon
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Stop, then start the daemon
    Restart,

    /// Show daemon status
    Status,

    /// Run daemon health checks
    Health,

    /// Show recent daemon log lines
    Logs {
        /// Number of lines
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
    },

    /// List loaded handlers per event
    Handlers,

    /// Show the effective configuration
    Config,

    /// Validate a config file
    ConfigValidate {
        /// Config file (default: the project config)
        path: Option<PathBuf>,
    },

    /// Show differences between a config file and the defaults
    ConfigDiff {
        /// Config file (default: the project config)
        path: Option<PathBuf>,
    },

    /// Merge a config file onto the current defaults
    ConfigMerge {
        /// Config file (default: the project config)
        path: Option<PathBuf>,

        /// Write the result back instead of printing it
        #[arg(long)]
        write: bool,
    },

    /// Write a default project config
    InitConfig {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Remove stale PID and socket files
    Repair,

    /// Forward a hook event read from stdin
    Hook {
        /// Event name, e.g. PreToolUse
        event: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.project_root.as_deref();
    let verbose = cli.verbose;

    match cli.command {
        Commands::Start { foreground: true } => {
            let ctx = ProjectContext::resolve(root)?;
            let logs = logging::init(&ctx.config.logging, ctx.config.daemon.log_level, verbose, true)?;
            commands::daemon::start_foreground(ctx, logs).await
        }
        Commands::Start { foreground: false } => {
            commands::daemon::start_background(&client_context(root, verbose)?).await
        }
        Commands::Stop => commands::daemon::stop(&client_context(root, verbose)?).await,
        Commands::Restart => commands::daemon::restart(&client_context(root, verbose)?).await,
        Commands::Status => commands::daemon::status(&client_context(root, verbose)?).await,
        Commands::Health => commands::daemon::health(&client_context(root, verbose)?).await,
        Commands::Logs { lines } => commands::daemon::logs(&client_context(root, verbose)?, lines).await,
        Commands::Handlers => commands::daemon::handlers(&client_context(root, verbose)?).await,
        Commands::Config => commands::config::show(&client_context(root, verbose)?).await,
        Commands::Repair => commands::daemon::repair(&client_context(root, verbose)?),
        Commands::ConfigValidate { path } => commands::config::validate(&layout(root, verbose)?, path),
        Commands::ConfigDiff { path } => commands::config::diff(&layout(root, verbose)?, path),
        Commands::ConfigMerge { path, write } => commands::config::merge(&layout(root, verbose)?, path, write),
        Commands::InitConfig { force } => commands::config::init(&layout(root, verbose)?, force),
        Commands::Hook { event } => match ProjectContext::resolve(root) {
            Ok(ctx) => {
                logging::init(&ctx.config.logging, LogLevel::Warn, verbose, false)?;
                commands::hook::run(&ctx, &event).await
            }
            Err(e) => {
                // Never block the agent because the project cannot be resolved
                logging::init(&LoggingConfig::default(), LogLevel::Warn, verbose, false)?;
                warn!("Hook forwarding skipped: {:#}", e);
                Ok(())
            }
        },
    }
}

/// Project context for commands that talk to the daemon
fn client_context(root: Option<&Path>, verbose: u8) -> Result<ProjectContext> {
    let ctx = ProjectContext::resolve(root)?;
    logging::init(&ctx.config.logging, LogLevel::Warn, verbose, false)?;
    Ok(ctx)
}

/// Project layout for commands that only touch config files, which must
/// work even when the project config is broken
fn layout(root: Option<&Path>, verbose: u8) -> Result<ProjectLayout> {
    logging::init(&LoggingConfig::default(), LogLevel::Warn, verbose, false)?;
    let cwd = std::env::current_dir()?;
    let root = resolve_project_root(root, &cwd).unwrap_or(cwd);
    Ok(ProjectLayout::new(root))
}
