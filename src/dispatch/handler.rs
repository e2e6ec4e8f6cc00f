//! Handler trait and metadata

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::types::{EventCategory, HookEvent};

use super::outcome::Outcome;

/// Where a handler implementation came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "path", rename_all = "lowercase")]
pub enum HandlerSource {
    Builtin,
    Plugin(PathBuf),
}

impl fmt::Display for HandlerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("builtin"),
            Self::Plugin(path) => write!(f, "plugin:{}", path.display()),
        }
    }
}

/// Static description of a handler instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerMeta {
    pub id: String,
    pub category: EventCategory,
    /// Lower runs first
    pub priority: i32,
    pub tags: BTreeSet<String>,
    pub source: HandlerSource,
}

impl HandlerMeta {
    pub fn new(id: impl Into<String>, category: EventCategory, priority: i32) -> Self {
        Self {
            id: id.into(),
            category,
            priority,
            tags: BTreeSet::new(),
            source: HandlerSource::Builtin,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_source(mut self, source: HandlerSource) -> Self {
        self.source = source;
        self
    }
}

/// A policy unit in a handler chain
///
/// Instances are built once at startup and shared across every request for
/// the lifetime of the daemon, so implementations must not keep per-request
/// mutable state. Anything written to disk must be append-only or guarded.
pub trait Handler: Send + Sync {
    fn meta(&self) -> &HandlerMeta;

    /// Cheap predicate deciding whether `handle` runs for this event
    fn matches(&self, event: &HookEvent) -> bool;

    fn handle(&self, event: &HookEvent) -> anyhow::Result<Outcome>;

    fn id(&self) -> &str {
        &self.meta().id
    }

    fn priority(&self) -> i32 {
        self.meta().priority
    }
}

impl fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .finish()
    }
}
