//! Daemon Controller
//!
//! Owns everything a request needs: validation policy, the router, stats and
//! the control-plane actions. One instance per daemon, shared by `Arc`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, ValidationMode};
use crate::dispatch::{DispatchResult, EventRouter};
use crate::logging::LogBuffer;
use crate::types::{EventCategory, HookEvent};

use super::environment::{IsolationIndicators, InstancePolicy};
use super::lifecycle::read_pid;
use super::paths::{ProjectLayout, RuntimeArtifacts};
use super::protocol::{Request, SystemAction};
use super::response;
use super::stats::{DaemonStats, Gauge, RequestOutcome};
use super::validation::validate_input;

/// Lines returned by `logs` when the request does not say
const DEFAULT_LOG_LINES: usize = 100;

/// Delay between answering `shutdown` and acting on it
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Decrements the in-flight gauge however the request ends
struct InFlight<'a>(&'a Gauge);

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a Gauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// How single-instance enforcement was decided at startup
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    pub policy: InstancePolicy,
    pub isolation_score: f64,
    pub indicators: IsolationIndicators,
}

pub struct DaemonController {
    router: Arc<EventRouter>,
    config: Arc<Config>,
    layout: ProjectLayout,
    artifacts: RuntimeArtifacts,
    instance: InstanceInfo,
    stats: DaemonStats,
    logs: Option<LogBuffer>,
    shutdown_tx: broadcast::Sender<()>,
    last_activity: Mutex<Instant>,
}

impl DaemonController {
    pub fn new(
        router: EventRouter,
        config: Config,
        layout: ProjectLayout,
        artifacts: RuntimeArtifacts,
        instance: InstanceInfo,
        logs: Option<LogBuffer>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            router: Arc::new(router),
            config: Arc::new(config),
            layout,
            artifacts,
            instance,
            stats: DaemonStats::new(),
            logs,
            shutdown_tx,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn stats(&self) -> &DaemonStats {
        &self.stats
    }

    pub fn artifacts(&self) -> &RuntimeArtifacts {
        &self.artifacts
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Time since the last completed request
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn in_flight(&self) -> u64 {
        self.stats.in_flight.get()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.daemon.request_timeout_secs)
    }

    /// Handle one raw request line
    pub async fn handle_line(&self, line: &[u8]) -> Value {
        match Request::parse(line) {
            Ok(request) => self.handle(request).await,
            Err(rejected) => {
                warn!("Rejected request: {}", rejected);
                self.stats.record_rejected();
                response::error(rejected.to_string(), rejected.request_id.as_deref())
            }
        }
    }

    /// Handle a parsed request
    pub async fn handle(&self, request: Request) -> Value {
        match request {
            Request::Hook {
                request_id,
                category,
                input,
            } => self.handle_hook(request_id, category, input).await,
            Request::System {
                request_id,
                action,
                lines,
            } => {
                let result = self.handle_system(action, lines);
                self.stats.record_system();
                self.touch();
                response::system(result, request_id.as_deref())
            }
        }
    }

    async fn handle_hook(
        &self,
        request_id: Option<String>,
        category: EventCategory,
        input: Value,
    ) -> Value {
        let _in_flight = InFlight::enter(&self.stats.in_flight);
        let started = Instant::now();
        let trace_id = request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string()[..8].to_string());
        debug!(request = %trace_id, event = %category, "Hook request");

        let mode = self.config.daemon.input_validation;
        if mode != ValidationMode::Off {
            let problems = validate_input(category, &input);
            if !problems.is_empty() {
                let summary = problems.join("; ");
                if mode == ValidationMode::Strict {
                    warn!(request = %trace_id, "Invalid {} input: {}", category, summary);
                    self.stats.record(category, started.elapsed(), RequestOutcome::Failed);
                    return response::error(
                        format!("invalid hook_input: {}", summary),
                        request_id.as_deref(),
                    );
                }
                warn!(request = %trace_id, "Invalid {} input, dispatching anyway: {}", category, summary);
            }
        }

        let event = HookEvent::new(category, input);
        let router = self.router.clone();
        let strict = self.config.daemon.strict_mode;
        // On timeout the blocking task is left to finish on its own
        let task = tokio::task::spawn_blocking(move || match router.chain_for(category) {
            Some(chain) => chain.dispatch(&event, strict),
            None => Ok(DispatchResult::default()),
        });

        let timeout = self.request_timeout();
        let (value, outcome) = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(result))) => {
                debug!(
                    request = %trace_id,
                    decision = %result.decision,
                    decided_by = ?result.decided_by,
                    executed = ?result.executed,
                    "Dispatched in {:?}",
                    started.elapsed()
                );
                (response::render(category, &result), RequestOutcome::Completed)
            }
            Ok(Ok(Err(e))) => {
                warn!(request = %trace_id, "Dispatch aborted: {}", e);
                (response::error(e.to_string(), request_id.as_deref()), RequestOutcome::Failed)
            }
            Ok(Err(e)) => {
                warn!(request = %trace_id, "Dispatch task failed: {}", e);
                (
                    response::error(format!("dispatch failed: {}", e), request_id.as_deref()),
                    RequestOutcome::Failed,
                )
            }
            Err(_) => {
                warn!(request = %trace_id, "{} request timed out after {:?}", category, timeout);
                (
                    response::error(
                        format!("request timed out after {}s", timeout.as_secs()),
                        request_id.as_deref(),
                    ),
                    RequestOutcome::TimedOut,
                )
            }
        };

        self.stats.record(category, started.elapsed(), outcome);
        self.touch();
        value
    }

    fn handle_system(&self, action: SystemAction, lines: Option<usize>) -> Value {
        debug!("System action: {}", action.as_str());
        match action {
            SystemAction::Ping => json!("pong"),
            SystemAction::Status => self.status(),
            SystemAction::Health => self.health(),
            SystemAction::Handlers => self.handlers(),
            SystemAction::Logs => {
                let n = lines.unwrap_or(DEFAULT_LOG_LINES);
                let lines = self.logs.as_ref().map(|b| b.tail(n)).unwrap_or_default();
                json!({ "lines": lines })
            }
            SystemAction::Config => serde_json::to_value(&*self.config).unwrap_or(Value::Null),
            SystemAction::Shutdown => {
                info!("Shutdown requested via IPC");
                let tx = self.shutdown_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(SHUTDOWN_GRACE).await;
                    let _ = tx.send(());
                });
                json!({ "shutting_down": true })
            }
        }
    }

    fn status(&self) -> Value {
        json!({
            "running": true,
            "pid": std::process::id(),
            "version": env!("CARGO_PKG_VERSION"),
            "project_root": self.layout.root(),
            "socket_path": self.artifacts.socket_path,
            "pid_path": self.artifacts.pid_path,
            "log_path": self.artifacts.log_path,
            "discriminator": self.artifacts.discriminator,
            "instance": self.instance,
            "handlers_loaded": self.router.total_handlers(),
            "idle_timeout_secs": self.config.daemon.idle_timeout_secs,
            "idle_seconds": self.idle_for().as_secs(),
            "stats": self.stats.snapshot(),
        })
    }

    fn health(&self) -> Value {
        let pid_file_owned = read_pid(&self.artifacts.pid_path) == Some(std::process::id());
        let socket_present = self.artifacts.socket_path.exists();
        let handlers_loaded = self.router.total_handlers();
        let healthy = pid_file_owned && socket_present;
        json!({
            "healthy": healthy,
            "checks": {
                "pid_file_owned": pid_file_owned,
                "socket_present": socket_present,
                "handlers_loaded": handlers_loaded,
            },
            "uptime_seconds": self.stats.uptime().as_secs(),
        })
    }

    fn handlers(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .router
            .describe()
            .into_iter()
            .filter(|(_, handlers)| !handlers.is_empty())
            .map(|(category, handlers)| {
                (
                    category.wire_name().to_string(),
                    serde_json::to_value(handlers).unwrap_or(Value::Null),
                )
            })
            .collect();
        Value::Object(map)
    }
}
