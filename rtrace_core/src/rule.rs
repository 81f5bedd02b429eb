//! Default category rules.
//!
//! A rule list is a JSON array of `{module, category, enabled}` objects.
//! Every field is optional: a missing or empty pattern matches any name and
//! a missing `enabled` means off. Matching is exact string equality, never
//! prefix or glob.

use serde::{Deserialize, Serialize};

/// One `{module, category, enabled}` rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledRule {
    /// Module pattern; empty matches any
    #[serde(default)]
    pub module: String,
    /// Category pattern; empty matches any
    #[serde(default)]
    pub category: String,
    /// State applied to matching categories
    #[serde(default)]
    pub enabled: bool,
}

impl EnabledRule {
    /// Build a rule
    pub fn new(module: impl Into<String>, category: impl Into<String>, enabled: bool) -> Self {
        Self {
            module: module.into(),
            category: category.into(),
            enabled,
        }
    }

    /// True when both patterns match
    pub fn matches(&self, module: &str, category: &str) -> bool {
        pattern_matches(&self.module, module) && pattern_matches(&self.category, category)
    }
}

/// Empty pattern is a wildcard, anything else must be equal
#[inline]
pub fn pattern_matches(pattern: &str, value: &str) -> bool {
    pattern.is_empty() || pattern == value
}

/// Last rule in `rules` matching the pair; later rules override earlier ones
pub fn last_match<'a>(rules: &'a [EnabledRule], module: &str, category: &str) -> Option<&'a EnabledRule> {
    rules.iter().rev().find(|rule| rule.matches(module, category))
}

/// Parse a JSON rule array
pub fn parse_rules(json: &str) -> Result<Vec<EnabledRule>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Serialise a rule list as a JSON array
pub fn rules_to_json(rules: &[EnabledRule]) -> Result<String, serde_json::Error> {
    serde_json::to_string(rules)
}
