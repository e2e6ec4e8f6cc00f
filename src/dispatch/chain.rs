//! Handler Chain
//!
//! Chain-of-responsibility with context accumulation. Advisory handlers only
//! annotate; the first handler (in priority order) that returns
//! [`Outcome::Final`] settles the decision and no later handler runs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{EventCategory, HookEvent};

use super::handler::Handler;
use super::outcome::{Decision, Outcome};

/// Errors that abort a dispatch (strict mode only)
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("handler '{handler}' failed: {message}")]
    HandlerFailed { handler: String, message: String },
}

/// Aggregated result of running a chain against one event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DispatchResult {
    pub decision: Decision,
    pub reason: Option<String>,
    pub context: Vec<String>,
    pub guidance: Option<String>,
    /// Handler whose `Final` outcome settled the event
    pub decided_by: Option<String>,
    /// Handlers whose `handle` ran, in order
    pub executed: Vec<String>,
    /// Handlers that failed and were skipped
    pub errors: Vec<String>,
}

/// Priority-ordered handlers for one event category
pub struct HandlerChain {
    category: EventCategory,
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerChain {
    /// Build a chain, sorting by priority with the id as tie-break
    pub fn new(category: EventCategory, mut handlers: Vec<Arc<dyn Handler>>) -> Self {
        handlers.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.id().cmp(b.id()))
        });
        Self { category, handlers }
    }

    pub fn empty(category: EventCategory) -> Self {
        Self::new(category, Vec::new())
    }

    pub fn category(&self) -> EventCategory {
        self.category
    }

    pub fn handlers(&self) -> &[Arc<dyn Handler>] {
        &self.handlers
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the chain against an event
    ///
    /// Never fails unless `strict` is set: a handler that panics or returns an
    /// error is logged and treated as not matching.
    pub fn dispatch(&self, event: &HookEvent, strict: bool) -> Result<DispatchResult, ChainError> {
        let mut result = DispatchResult::default();
        let mut accumulated: Vec<String> = Vec::new();
        let mut last_guidance: Option<String> = None;

        for handler in &self.handlers {
            let id = handler.id();

            match guard(|| Ok(handler.matches(event))) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(message) => {
                    self.record_failure(id, "matches", &message, strict, &mut result)?;
                    continue;
                }
            }

            let outcome = match guard(|| handler.handle(event)) {
                Ok(outcome) => outcome,
                Err(message) => {
                    self.record_failure(id, "handle", &message, strict, &mut result)?;
                    continue;
                }
            };
            result.executed.push(id.to_string());

            match outcome {
                Outcome::Final(mut verdict) => {
                    debug!(
                        "{} settled by '{}': {}",
                        self.category, id, verdict.decision
                    );
                    accumulated.append(&mut verdict.context);
                    result.decision = verdict.decision;
                    result.reason = verdict.reason;
                    result.context = accumulated;
                    result.guidance = verdict.guidance;
                    result.decided_by = Some(id.to_string());
                    return Ok(result);
                }
                Outcome::Advisory(advice) => {
                    accumulated.extend(advice.context);
                    if advice.guidance.is_some() {
                        last_guidance = advice.guidance;
                    }
                }
            }
        }

        result.decision = Decision::Allow;
        result.context = accumulated;
        result.guidance = last_guidance;
        Ok(result)
    }

    fn record_failure(
        &self,
        id: &str,
        stage: &str,
        message: &str,
        strict: bool,
        result: &mut DispatchResult,
    ) -> Result<(), ChainError> {
        warn!(
            "Handler '{}' failed in {} for {}: {}",
            id, stage, self.category, message
        );
        if strict {
            return Err(ChainError::HandlerFailed {
                handler: id.to_string(),
                message: message.to_string(),
            });
        }
        result.errors.push(id.to_string());
        Ok(())
    }
}

/// Run handler code, converting both errors and panics into a message
fn guard<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dispatch::handler::HandlerMeta;
    use crate::dispatch::outcome::{Advice, Verdict};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Scripted handler recording every `handle` call
    pub struct ScriptedHandler {
        meta: HandlerMeta,
        matches: bool,
        outcome: Option<Outcome>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedHandler {
        pub fn new(
            id: &str,
            priority: i32,
            matches: bool,
            outcome: Option<Outcome>,
            calls: Arc<Mutex<Vec<String>>>,
        ) -> Arc<dyn Handler> {
            Arc::new(Self {
                meta: HandlerMeta::new(id, EventCategory::PreToolUse, priority),
                matches,
                outcome,
                calls,
            })
        }
    }

    impl Handler for ScriptedHandler {
        fn meta(&self) -> &HandlerMeta {
            &self.meta
        }

        fn matches(&self, _event: &HookEvent) -> bool {
            self.matches
        }

        fn handle(&self, _event: &HookEvent) -> anyhow::Result<Outcome> {
            self.calls.lock().push(self.meta.id.clone());
            match &self.outcome {
                Some(outcome) => Ok(outcome.clone()),
                None => anyhow::bail!("scripted failure"),
            }
        }
    }

    struct PanickingHandler(HandlerMeta);

    impl Handler for PanickingHandler {
        fn meta(&self) -> &HandlerMeta {
            &self.0
        }

        fn matches(&self, _event: &HookEvent) -> bool {
            panic!("matcher exploded")
        }

        fn handle(&self, _event: &HookEvent) -> anyhow::Result<Outcome> {
            Ok(Outcome::deny("unreachable"))
        }
    }

    fn event() -> HookEvent {
        HookEvent::new(
            EventCategory::PreToolUse,
            json!({"tool_name": "Bash", "tool_input": {"command": "ls"}}),
        )
    }

    fn calls() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_empty_chain_allows() {
        let chain = HandlerChain::empty(EventCategory::PreToolUse);
        let result = chain.dispatch(&event(), false).unwrap();
        assert_eq!(result.decision, Decision::Allow);
        assert!(result.context.is_empty());
        assert!(result.decided_by.is_none());
    }

    #[test]
    fn test_final_handler_stops_chain() {
        let log = calls();
        let chain = HandlerChain::new(
            EventCategory::PreToolUse,
            vec![
                ScriptedHandler::new("late", 20, true, Some(Outcome::deny("late")), log.clone()),
                ScriptedHandler::new("early", 10, true, Some(Outcome::deny("early")), log.clone()),
            ],
        );

        let result = chain.dispatch(&event(), false).unwrap();
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.reason.as_deref(), Some("early"));
        assert_eq!(result.decided_by.as_deref(), Some("early"));
        assert_eq!(*log.lock(), vec!["early"]);
    }

    #[test]
    fn test_advisory_context_accumulates_in_priority_order() {
        let log = calls();
        let chain = HandlerChain::new(
            EventCategory::PreToolUse,
            vec![
                ScriptedHandler::new("nine", 9, true, Some(Outcome::advise("from nine")), log.clone()),
                ScriptedHandler::new("five", 5, true, Some(Outcome::advise("from five")), log.clone()),
            ],
        );

        let result = chain.dispatch(&event(), false).unwrap();
        assert_eq!(result.decision, Decision::Allow);
        assert_eq!(result.context, vec!["from five", "from nine"]);
        assert_eq!(result.executed, vec!["five", "nine"]);
    }

    #[test]
    fn test_accumulated_context_prepended_to_final() {
        let log = calls();
        let verdict = Outcome::Final(Verdict {
            decision: Decision::Ask,
            reason: Some("confirm".into()),
            context: vec!["own".into()],
            guidance: None,
        });
        let chain = HandlerChain::new(
            EventCategory::PreToolUse,
            vec![
                ScriptedHandler::new("advisor", 1, true, Some(Outcome::advise("before")), log.clone()),
                ScriptedHandler::new("gate", 2, true, Some(verdict), log.clone()),
                ScriptedHandler::new("after", 3, true, Some(Outcome::advise("after")), log.clone()),
            ],
        );

        let result = chain.dispatch(&event(), false).unwrap();
        assert_eq!(result.decision, Decision::Ask);
        assert_eq!(result.context, vec!["before", "own"]);
        assert_eq!(*log.lock(), vec!["advisor", "gate"]);
    }

    #[test]
    fn test_non_matching_handlers_skipped() {
        let log = calls();
        let chain = HandlerChain::new(
            EventCategory::PreToolUse,
            vec![
                ScriptedHandler::new("blocker", 1, false, Some(Outcome::deny("x")), log.clone()),
                ScriptedHandler::new("advisor", 2, true, Some(Outcome::pass()), log.clone()),
            ],
        );
        let result = chain.dispatch(&event(), false).unwrap();
        assert_eq!(result.decision, Decision::Allow);
        assert_eq!(*log.lock(), vec!["advisor"]);
    }

    #[test]
    fn test_equal_priority_ordered_by_id() {
        let log = calls();
        let chain = HandlerChain::new(
            EventCategory::PreToolUse,
            vec![
                ScriptedHandler::new("zeta", 5, true, Some(Outcome::advise("z")), log.clone()),
                ScriptedHandler::new("alpha", 5, true, Some(Outcome::advise("a")), log.clone()),
            ],
        );
        let ids: Vec<&str> = chain.handlers().iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_failures_are_isolated() {
        let log = calls();
        let panicking: Arc<dyn Handler> = Arc::new(PanickingHandler(HandlerMeta::new(
            "panics",
            EventCategory::PreToolUse,
            1,
        )));
        let chain = HandlerChain::new(
            EventCategory::PreToolUse,
            vec![
                panicking,
                ScriptedHandler::new("errors", 2, true, None, log.clone()),
                ScriptedHandler::new("ok", 3, true, Some(Outcome::advise("still here")), log.clone()),
            ],
        );

        let result = chain.dispatch(&event(), false).unwrap();
        assert_eq!(result.decision, Decision::Allow);
        assert_eq!(result.context, vec!["still here"]);
        assert_eq!(result.errors, vec!["panics", "errors"]);
    }

    #[test]
    fn test_strict_mode_aborts_on_failure() {
        let log = calls();
        let chain = HandlerChain::new(
            EventCategory::PreToolUse,
            vec![ScriptedHandler::new("errors", 2, true, None, log)],
        );
        let err = chain.dispatch(&event(), true).unwrap_err();
        assert!(err.to_string().contains("errors"));
    }

    #[test]
    fn test_last_advisory_guidance_kept() {
        let log = calls();
        let chain = HandlerChain::new(
            EventCategory::PreToolUse,
            vec![ScriptedHandler::new(
                "guide",
                1,
                true,
                Some(Outcome::Advisory(Advice {
                    context: vec![],
                    guidance: Some("slow down".into()),
                })),
                log,
            )],
        );
        let result = chain.dispatch(&event(), false).unwrap();
        assert_eq!(result.guidance.as_deref(), Some("slow down"));
    }
}
