//! `hook <event>`: forward one hook invocation to the daemon
//!
//! Reads the hook input from stdin, prints the daemon's response on stdout.
//! Failures print nothing and exit zero unless `daemon.strict_mode` is set,
//! so a broken daemon never blocks the agent.

use std::io::Read;

use anyhow::{Context, Result};
use hooks_daemon::types::EventCategory;
use serde_json::Value;
use tracing::warn;

use super::ProjectContext;

pub async fn run(ctx: &ProjectContext, event: &str) -> Result<()> {
    let strict = ctx.config.daemon.strict_mode;
    match forward(ctx, event).await {
        Ok(response) => {
            if let Some(error) = response.get("error").and_then(Value::as_str) {
                if strict {
                    anyhow::bail!("daemon rejected {} hook: {}", event, error);
                }
                warn!("Daemon error for {} hook, allowing: {}", event, error);
                return Ok(());
            }
            println!("{}", serde_json::to_string(&response)?);
            Ok(())
        }
        Err(e) if strict => Err(e),
        Err(e) => {
            warn!("Hook forwarding failed, allowing: {:#}", e);
            Ok(())
        }
    }
}

async fn forward(ctx: &ProjectContext, event: &str) -> Result<Value> {
    let category: EventCategory = event.parse()?;
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read hook input from stdin")?;
    let input: Value = if raw.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(&raw).context("hook input is not valid JSON")?
    };

    let client = ctx.connect().await?;
    Ok(client.hook(category, input).await?)
}
