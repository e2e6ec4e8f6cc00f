//! Event Router
//!
//! Maps each event category to its handler chain. Built once at startup and
//! read without synchronization afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::types::EventCategory;

use super::chain::HandlerChain;
use super::handler::{Handler, HandlerSource};

/// Summary of one handler, as reported by the `handlers` control action
#[derive(Debug, Clone, Serialize)]
pub struct HandlerSummary {
    pub id: String,
    pub priority: i32,
    pub tags: Vec<String>,
    pub source: HandlerSource,
}

/// Category -> chain lookup
pub struct EventRouter {
    chains: HashMap<EventCategory, HandlerChain>,
}

impl EventRouter {
    /// Build a router from per-category handler lists
    ///
    /// Every category gets a chain, empty if no handlers were supplied.
    pub fn new(mut handlers: HashMap<EventCategory, Vec<Arc<dyn Handler>>>) -> Self {
        let chains = EventCategory::ALL
            .iter()
            .map(|&category| {
                let list = handlers.remove(&category).unwrap_or_default();
                (category, HandlerChain::new(category, list))
            })
            .collect();
        Self { chains }
    }

    pub fn chain_for(&self, category: EventCategory) -> Option<&HandlerChain> {
        self.chains.get(&category)
    }

    pub fn total_handlers(&self) -> usize {
        self.chains.values().map(HandlerChain::len).sum()
    }

    /// Handler listing keyed by wire category name, in chain order
    pub fn describe(&self) -> Vec<(EventCategory, Vec<HandlerSummary>)> {
        EventCategory::ALL
            .iter()
            .filter_map(|category| {
                let chain = self.chains.get(category)?;
                let summaries = chain
                    .handlers()
                    .iter()
                    .map(|h| HandlerSummary {
                        id: h.id().to_string(),
                        priority: h.priority(),
                        tags: h.meta().tags.iter().cloned().collect(),
                        source: h.meta().source.clone(),
                    })
                    .collect();
                Some((*category, summaries))
            })
            .collect()
    }
}
