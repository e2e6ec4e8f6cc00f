//! Handler outcomes
//!
//! A handler either settles the event (`Final`) or annotates it
//! (`Advisory`). The variant is the only source of truth for whether a handler
//! stops the chain.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tri-state permission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[default]
    Allow,
    Deny,
    Ask,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Ask => "ask",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative result of a handler that ends the chain
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
}

/// Non-blocking annotation contributed by a handler
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Advice {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
}

/// What a handler returns from `handle`
///
/// The JSON form (used by external plugins) is tagged:
/// `{"kind": "final", "decision": "deny", "reason": "..."}` or
/// `{"kind": "advisory", "context": ["..."]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Outcome {
    Final(Verdict),
    Advisory(Advice),
}

impl Outcome {
    pub fn allow() -> Self {
        Self::Final(Verdict::default())
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Final(Verdict {
            decision: Decision::Deny,
            reason: Some(reason.into()),
            ..Default::default()
        })
    }

    pub fn ask(reason: impl Into<String>) -> Self {
        Self::Final(Verdict {
            decision: Decision::Ask,
            reason: Some(reason.into()),
            ..Default::default()
        })
    }

    /// Advisory outcome carrying a single context line
    pub fn advise(context: impl Into<String>) -> Self {
        Self::Advisory(Advice {
            context: vec![context.into()],
            guidance: None,
        })
    }

    /// Advisory outcome that contributes nothing
    pub fn pass() -> Self {
        Self::Advisory(Advice::default())
    }

    /// Attach user-facing guidance to either variant
    pub fn with_guidance(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Final(v) => v.guidance = Some(text.into()),
            Self::Advisory(a) => a.guidance = Some(text.into()),
        }
        self
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final(_))
    }
}
