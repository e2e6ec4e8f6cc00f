//! Per-category handler configuration

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Overrides for a single handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Replaces the handler's default priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Handler-specific options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
            options: BTreeMap::new(),
        }
    }
}

/// Handler configuration for one event category
///
/// ```toml
/// [handlers.pre_tool_use]
/// disable_tags = ["advisory"]
///
/// [handlers.pre_tool_use.destructive_git]
/// enabled = true
/// priority = 10
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryHandlers {
    /// When non-empty, only handlers carrying one of these tags are loaded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_tags: Vec<String>,
    /// Handlers carrying any of these tags are dropped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disable_tags: Vec<String>,
    /// Handler id -> overrides
    #[serde(flatten)]
    pub handlers: BTreeMap<String, HandlerSettings>,
}

impl CategoryHandlers {
    /// Whether a handler with the given tags passes the tag filters
    pub fn admits<'a>(&self, tags: impl IntoIterator<Item = &'a String> + Clone) -> bool {
        if tags.clone().into_iter().any(|t| self.disable_tags.contains(t)) {
            return false;
        }
        self.enable_tags.is_empty() || tags.into_iter().any(|t| self.enable_tags.contains(t))
    }
}

/// Category config key -> handler configuration
pub type HandlersConfig = BTreeMap<String, CategoryHandlers>;

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tag_filters() {
        let mut cat = CategoryHandlers::default();
        assert!(cat.admits(&tags(&["git"])));
        assert!(cat.admits(&tags(&[])));

        cat.disable_tags = tags(&["advisory"]);
        assert!(!cat.admits(&tags(&["git", "advisory"])));
        assert!(cat.admits(&tags(&["git"])));

        cat.enable_tags = tags(&["safety"]);
        assert!(!cat.admits(&tags(&["git"])));
        assert!(cat.admits(&tags(&["safety", "git"])));
    }

    #[test]
    fn test_parse_category_with_flattened_handlers() {
        let doc = r#"
            disable_tags = ["advisory"]

            [destructive_git]
            priority = 5

            [sudo_confirm]
            enabled = false
            options = { allow = ["sudo ls"] }
        "#;
        let cat: CategoryHandlers = toml::from_str(doc).unwrap();
        assert_eq!(cat.disable_tags, vec!["advisory"]);
        assert_eq!(cat.handlers["destructive_git"].priority, Some(5));
        assert!(cat.handlers["destructive_git"].enabled);
        assert!(!cat.handlers["sudo_confirm"].enabled);
        assert!(cat.handlers["sudo_confirm"].options.contains_key("allow"));
    }
}
