//! Handler Registry
//!
//! Flat catalogue of handler factories keyed by (category, id). Chains are
//! built from three sources, in this order of precedence:
//!
//! 1. the built-in catalogue (plus anything registered at build time),
//! 2. project config overrides (enable/disable, priority, options, tags),
//! 3. external plugin handlers declared in the config.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{CategoryHandlers, Config, HandlerSettings};
use crate::daemon::paths::ProjectLayout;
use crate::dispatch::{EventRouter, Handler, HandlerMeta};
use crate::types::EventCategory;

use super::builtin;
use super::plugins::{self, PluginHandlerSpec};

/// Everything a factory needs to build one handler instance
pub struct HandlerContext<'a> {
    /// Final metadata (priority already overridden by config)
    pub meta: HandlerMeta,
    pub options: &'a BTreeMap<String, Value>,
    pub project_root: &'a Path,
    /// Directory for handler-owned state files
    pub state_dir: PathBuf,
}

impl HandlerContext<'_> {
    /// String list option, or the given default when unset
    pub fn string_list(&self, key: &str, default: &[&str]) -> Result<Vec<String>> {
        match self.options.get(key) {
            None => Ok(default.iter().map(|s| s.to_string()).collect()),
            Some(value) => serde_json::from_value(value.clone()).with_context(|| {
                format!("option '{}' of handler '{}' must be a list of strings", key, self.meta.id)
            }),
        }
    }

    /// Unsigned integer option, or the given default when unset
    pub fn u64_option(&self, key: &str, default: u64) -> Result<u64> {
        match self.options.get(key) {
            None => Ok(default),
            Some(value) => value.as_u64().with_context(|| {
                format!("option '{}' of handler '{}' must be a positive integer", key, self.meta.id)
            }),
        }
    }
}

/// Builds a handler from its context
pub type HandlerFactory = fn(HandlerContext<'_>) -> Result<Arc<dyn Handler>>;

/// One catalogue entry
#[derive(Clone)]
pub struct CatalogueEntry {
    pub id: &'static str,
    pub category: EventCategory,
    pub priority: i32,
    pub tags: &'static [&'static str],
    pub factory: HandlerFactory,
}

/// Registry of handler factories
#[derive(Clone)]
pub struct HandlerRegistry {
    entries: Vec<CatalogueEntry>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl HandlerRegistry {
    /// Registry with the built-in catalogue
    pub fn builtin() -> Self {
        Self {
            entries: builtin::catalogue(),
        }
    }

    /// Registry with no entries
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register an additional handler at build time
    ///
    /// An entry with the same category and id replaces the existing one.
    pub fn register(&mut self, entry: CatalogueEntry) {
        self.entries
            .retain(|e| !(e.category == entry.category && e.id == entry.id));
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn find(&self, category: EventCategory, id: &str) -> Option<&CatalogueEntry> {
        self.entries
            .iter()
            .find(|e| e.category == category && e.id == id)
    }

    /// Build the router for a project from config and plugins
    pub fn build_router(&self, config: &Config, layout: &ProjectLayout) -> Result<EventRouter> {
        let default_category = CategoryHandlers::default();
        let default_settings = HandlerSettings::default();
        let mut chains: HashMap<EventCategory, Vec<Arc<dyn Handler>>> = HashMap::new();

        let plugin_specs = plugins::load_plugins(&config.plugins, layout.root());
        for id in self.unknown_ids(config, &plugin_specs) {
            warn!("Config references unknown handler '{}', ignoring", id);
        }

        // Built-in catalogue + overrides
        for entry in &self.entries {
            let cat_cfg = config.category(entry.category).unwrap_or(&default_category);
            let settings = cat_cfg.handlers.get(entry.id).unwrap_or(&default_settings);

            if !settings.enabled {
                debug!("Handler {}.{} disabled by config", entry.category.config_key(), entry.id);
                continue;
            }

            let meta = HandlerMeta::new(
                entry.id,
                entry.category,
                settings.priority.unwrap_or(entry.priority),
            )
            .with_tags(entry.tags.iter().copied());

            if !cat_cfg.admits(&meta.tags) {
                debug!("Handler {}.{} filtered by tags", entry.category.config_key(), entry.id);
                continue;
            }

            let ctx = HandlerContext {
                meta,
                options: &settings.options,
                project_root: layout.root(),
                state_dir: layout.state_dir(),
            };
            let handler = (entry.factory)(ctx).with_context(|| {
                format!(
                    "handlers.{}.{}: failed to build handler",
                    entry.category.config_key(),
                    entry.id
                )
            })?;
            chains.entry(entry.category).or_default().push(handler);
        }

        // External plugins
        for spec in plugin_specs {
            if let Some(handler) = self.admit_plugin(spec, config, &default_category) {
                chains.entry(handler.meta().category).or_default().push(handler);
            }
        }

        let router = EventRouter::new(chains);
        info!("Loaded {} handlers", router.total_handlers());
        Ok(router)
    }

    fn admit_plugin(
        &self,
        spec: PluginHandlerSpec,
        config: &Config,
        default_category: &CategoryHandlers,
    ) -> Option<Arc<dyn Handler>> {
        let category = spec.meta.category;
        let id = spec.meta.id.clone();

        if self.entries.iter().any(|e| e.id == id) {
            warn!(
                "Plugin handler '{}' from {} conflicts with a built-in handler; keeping the built-in",
                id,
                spec.manifest.display()
            );
            return None;
        }

        let cat_cfg = config.category(category).unwrap_or(default_category);
        let mut spec = spec;
        if let Some(settings) = cat_cfg.handlers.get(&id) {
            if !settings.enabled {
                debug!("Plugin handler {}.{} disabled by config", category.config_key(), id);
                return None;
            }
            if let Some(priority) = settings.priority {
                spec.meta.priority = priority;
            }
        }
        if !cat_cfg.admits(&spec.meta.tags) {
            debug!("Plugin handler {}.{} filtered by tags", category.config_key(), id);
            return None;
        }

        info!(
            "Loaded plugin handler {}.{} (priority {})",
            category.config_key(),
            id,
            spec.meta.priority
        );
        Some(spec.into_handler())
    }

    /// Handler ids in the config that match neither the catalogue nor a
    /// plugin declared in the same config
    pub fn unknown_handler_ids(&self, config: &Config, project_root: &Path) -> Vec<String> {
        let specs = plugins::load_plugins(&config.plugins, project_root);
        self.unknown_ids(config, &specs)
    }

    fn unknown_ids(&self, config: &Config, plugin_specs: &[PluginHandlerSpec]) -> Vec<String> {
        let mut unknown = Vec::new();
        for (key, cat_cfg) in &config.handlers {
            let Ok(category) = key.parse::<EventCategory>() else {
                continue;
            };
            for id in cat_cfg.handlers.keys() {
                let known = self.find(category, id).is_some()
                    || plugin_specs
                        .iter()
                        .any(|s| s.meta.category == category && &s.meta.id == id);
                if !known {
                    unknown.push(format!("handlers.{}.{}", key, id));
                }
            }
        }
        unknown
    }

    /// Config document listing every built-in handler with its defaults
    pub fn default_config(&self) -> Config {
        let mut config = Config::default();
        for entry in &self.entries {
            config
                .handlers
                .entry(entry.category.config_key().to_string())
                .or_default()
                .handlers
                .insert(
                    entry.id.to_string(),
                    HandlerSettings {
                        enabled: true,
                        priority: Some(entry.priority),
                        options: BTreeMap::new(),
                    },
                );
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Decision, Outcome};
    use crate::types::HookEvent;
    use serde_json::json;

    struct Fixed(HandlerMeta);

    impl Handler for Fixed {
        fn meta(&self) -> &HandlerMeta {
            &self.0
        }

        fn matches(&self, _event: &HookEvent) -> bool {
            true
        }

        fn handle(&self, _event: &HookEvent) -> Result<Outcome> {
            Ok(Outcome::advise(format!("seen by {}", self.0.id)))
        }
    }

    fn fixed_factory(ctx: HandlerContext<'_>) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(Fixed(ctx.meta)))
    }

    fn layout() -> (tempfile::TempDir, ProjectLayout) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(tmp.path().to_path_buf());
        (tmp, layout)
    }

    fn test_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::empty();
        registry.register(CatalogueEntry {
            id: "first",
            category: EventCategory::Stop,
            priority: 10,
            tags: &["advisory"],
            factory: fixed_factory,
        });
        registry.register(CatalogueEntry {
            id: "second",
            category: EventCategory::Stop,
            priority: 20,
            tags: &["quality"],
            factory: fixed_factory,
        });
        registry
    }

    fn stop_ids(router: &EventRouter) -> Vec<String> {
        router
            .chain_for(EventCategory::Stop)
            .unwrap()
            .handlers()
            .iter()
            .map(|h| h.id().to_string())
            .collect()
    }

    #[test]
    fn test_builtin_catalogue_ids_unique_per_category() {
        let registry = HandlerRegistry::builtin();
        let mut seen = std::collections::HashSet::new();
        for entry in registry.entries() {
            assert!(seen.insert((entry.category, entry.id)), "duplicate {}", entry.id);
        }
        assert!(registry.find(EventCategory::PreToolUse, "destructive_git").is_some());
    }

    #[test]
    fn test_priority_override_reorders_chain() {
        let (_tmp, layout) = layout();
        let mut config = Config::default();
        let mut cat = CategoryHandlers::default();
        cat.handlers.insert(
            "second".into(),
            HandlerSettings {
                priority: Some(1),
                ..Default::default()
            },
        );
        config.handlers.insert("stop".into(), cat);

        let router = test_registry().build_router(&config, &layout).unwrap();
        assert_eq!(stop_ids(&router), vec!["second", "first"]);
    }

    #[test]
    fn test_disabled_and_tag_filtered_handlers_are_dropped() {
        let (_tmp, layout) = layout();
        let mut config = Config::default();
        let mut cat = CategoryHandlers::default();
        cat.disable_tags = vec!["advisory".into()];
        config.handlers.insert("stop".into(), cat);
        let router = test_registry().build_router(&config, &layout).unwrap();
        assert_eq!(stop_ids(&router), vec!["second"]);

        let mut config = Config::default();
        let mut cat = CategoryHandlers::default();
        cat.handlers.insert(
            "second".into(),
            HandlerSettings {
                enabled: false,
                ..Default::default()
            },
        );
        config.handlers.insert("stop".into(), cat);
        let router = test_registry().build_router(&config, &layout).unwrap();
        assert_eq!(stop_ids(&router), vec!["first"]);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = test_registry();
        registry.register(CatalogueEntry {
            id: "first",
            category: EventCategory::Stop,
            priority: 99,
            tags: &[],
            factory: fixed_factory,
        });
        assert_eq!(registry.entries().len(), 2);
        assert_eq!(registry.find(EventCategory::Stop, "first").unwrap().priority, 99);
    }

    #[test]
    fn test_unknown_handler_ids_reported_with_path() {
        let mut config = Config::default();
        let mut cat = CategoryHandlers::default();
        cat.handlers.insert("ghost".into(), HandlerSettings::default());
        cat.handlers.insert("first".into(), HandlerSettings::default());
        config.handlers.insert("stop".into(), cat);
        assert_eq!(test_registry().unknown_handler_ids(&config, Path::new(".")), vec!["handlers.stop.ghost"]);
    }

    #[test]
    fn test_default_config_lists_catalogue() {
        let registry = HandlerRegistry::builtin();
        let config = registry.default_config();
        assert!(config.validate().is_ok());
        assert!(registry.unknown_handler_ids(&config, Path::new(".")).is_empty());
        let pre = &config.handlers["pre_tool_use"];
        assert_eq!(pre.handlers["destructive_git"].priority, Some(10));

        let reparsed = Config::parse(&config.to_toml().unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_builtin_router_denies_destructive_git() {
        let (_tmp, layout) = layout();
        let router = HandlerRegistry::builtin()
            .build_router(&Config::default(), &layout)
            .unwrap();
        let event = HookEvent::new(
            EventCategory::PreToolUse,
            json!({"tool_name": "Bash", "tool_input": {"command": "git reset --hard HEAD"}}),
        );
        let result = router
            .chain_for(EventCategory::PreToolUse)
            .unwrap()
            .dispatch(&event, false)
            .unwrap();
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.decided_by.as_deref(), Some("destructive_git"));
    }
}
