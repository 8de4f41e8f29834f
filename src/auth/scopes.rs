//! Scope-to-path authorization.
//!
//! Policy is data: each configured scope names the path prefixes it
//! grants and the path substrings that disqualify it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Path rules for one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeRule {
    /// Path substrings that disqualify this scope.
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    /// Path prefixes this scope grants access to.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

/// Check a space-separated scope list against a request path.
///
/// A scope grants access when the path starts with one of its allowed
/// prefixes and contains none of its excluded substrings. The first
/// granting scope wins; scopes without configuration are ignored.
pub fn authorised(rules: &HashMap<String, ScopeRule>, scopes: &str, path: &str) -> bool {
    for scope in scopes.split_whitespace() {
        let rule = match rules.get(scope) {
            Some(rule) => rule,
            None => continue,
        };

        if rule
            .excluded_paths
            .iter()
            .any(|excluded| path.contains(excluded.as_str()))
        {
            continue;
        }

        if rule
            .allowed_paths
            .iter()
            .any(|allowed| path.starts_with(allowed.as_str()))
        {
            return true;
        }
    }
    false
}
