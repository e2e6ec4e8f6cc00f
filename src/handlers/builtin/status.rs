//! Status line segments

use std::sync::Arc;

use anyhow::Result;

use crate::dispatch::{Handler, HandlerMeta, Outcome};
use crate::handlers::registry::HandlerContext;
use crate::types::HookEvent;

/// Shows the active model's display name
pub struct StatusLineModel {
    meta: HandlerMeta,
}

impl StatusLineModel {
    pub fn build(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Self { meta: ctx.meta }))
    }
}

fn model_name(event: &HookEvent) -> Option<&str> {
    let model = event.input.get("model")?;
    model
        .get("display_name")
        .or_else(|| model.get("id"))
        .and_then(|v| v.as_str())
        .or_else(|| model.as_str())
}

impl Handler for StatusLineModel {
    fn meta(&self) -> &HandlerMeta {
        &self.meta
    }

    fn matches(&self, event: &HookEvent) -> bool {
        model_name(event).is_some()
    }

    fn handle(&self, event: &HookEvent) -> Result<Outcome> {
        Ok(model_name(event).map(Outcome::advise).unwrap_or_else(Outcome::pass))
    }
}
