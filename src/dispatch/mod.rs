//! Dispatch Engine
//!
//! Handler trait, outcome types, per-category handler chains and the router
//! that selects a chain for each incoming event.

pub mod chain;
pub mod handler;
pub mod outcome;
pub mod router;

pub use chain::{ChainError, DispatchResult, HandlerChain};
pub use handler::{Handler, HandlerMeta, HandlerSource};
pub use outcome::{Advice, Decision, Outcome, Verdict};
pub use router::{EventRouter, HandlerSummary};
