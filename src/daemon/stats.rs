//! Daemon Statistics
//!
//! Request counters and timings, updated lock-free from connection tasks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EventCategory;

/// Atomic counter for thread-safe incrementing
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Atomic gauge for values that go up and down
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// How a hook request ended, as far as stats are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed,
    Failed,
    TimedOut,
}

/// Statistics for the lifetime of one daemon process
#[derive(Debug)]
pub struct DaemonStats {
    started_at: DateTime<Utc>,
    started: Instant,
    per_category: [Counter; EventCategory::ALL.len()],
    requests_total: Counter,
    errors_total: Counter,
    timeouts_total: Counter,
    processing_micros: Counter,
    system_requests: Counter,
    pub in_flight: Gauge,
    /// Millis since UNIX epoch of the last completed request (0 = none)
    last_request_ms: AtomicU64,
}

impl Default for DaemonStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            per_category: Default::default(),
            requests_total: Counter::default(),
            errors_total: Counter::default(),
            timeouts_total: Counter::default(),
            processing_micros: Counter::default(),
            system_requests: Counter::default(),
            in_flight: Gauge::default(),
            last_request_ms: AtomicU64::new(0),
        }
    }

    /// Record one finished hook request
    pub fn record(&self, category: EventCategory, elapsed: Duration, outcome: RequestOutcome) {
        self.per_category[category.index()].inc();
        self.requests_total.inc();
        self.processing_micros.add(elapsed.as_micros() as u64);
        match outcome {
            RequestOutcome::Completed => {}
            RequestOutcome::Failed => self.errors_total.inc(),
            RequestOutcome::TimedOut => {
                self.errors_total.inc();
                self.timeouts_total.inc();
            }
        }
        self.touch();
    }

    /// Record a control-plane request
    pub fn record_system(&self) {
        self.system_requests.inc();
        self.touch();
    }

    /// Record a request that failed before it could be routed
    pub fn record_rejected(&self) {
        self.errors_total.inc();
    }

    fn touch(&self) {
        self.last_request_ms
            .store(Utc::now().timestamp_millis().max(0) as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn last_request_at(&self) -> Option<DateTime<Utc>> {
        match self.last_request_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms as i64).single(),
        }
    }

    /// Take a snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let requests_total = self.requests_total.get();
        let processing_ms = self.processing_micros.get() as f64 / 1000.0;
        let requests_by_event = EventCategory::ALL
            .iter()
            .filter_map(|c| {
                let count = self.per_category[c.index()].get();
                (count > 0).then(|| (c.wire_name().to_string(), count))
            })
            .collect();

        StatsSnapshot {
            started_at: self.started_at,
            uptime_seconds: self.uptime().as_secs(),
            requests_total,
            requests_by_event,
            system_requests: self.system_requests.get(),
            errors_total: self.errors_total.get(),
            timeouts_total: self.timeouts_total.get(),
            in_flight: self.in_flight.get(),
            total_processing_ms: processing_ms,
            avg_processing_ms: if requests_total == 0 {
                0.0
            } else {
                processing_ms / requests_total as f64
            },
            last_request_at: self.last_request_at(),
            memory_usage_bytes: get_memory_usage(),
        }
    }
}

/// Point-in-time snapshot of daemon statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub requests_total: u64,
    pub requests_by_event: BTreeMap<String, u64>,
    pub system_requests: u64,
    pub errors_total: u64,
    pub timeouts_total: u64,
    pub in_flight: u64,
    pub total_processing_ms: f64,
    pub avg_processing_ms: f64,
    pub last_request_at: Option<DateTime<Utc>>,
    pub memory_usage_bytes: Option<u64>,
}

/// Resident memory of this process in bytes
#[cfg(target_os = "linux")]
fn get_memory_usage() -> Option<u64> {
    let content = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = content.split_whitespace().nth(1)?.parse().ok()?;
    // SAFETY: sysconf has no preconditions
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    Some(pages * page_size.max(4096) as u64)
}

#[cfg(not(target_os = "linux"))]
fn get_memory_usage() -> Option<u64> {
    None
}
