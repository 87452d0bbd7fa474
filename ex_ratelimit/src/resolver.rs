use serde::Deserialize;

use crate::category::Category;
use crate::error::RateLimitError;
use crate::error::Result;

/// One `(prefix, method?) -> category` mapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolverRule {
    pub prefix: String,
    /// Only match this HTTP method; any method when absent
    #[serde(default)]
    pub method: Option<String>,
    pub category: Category,
}

impl ResolverRule {
    pub fn new(prefix: impl Into<String>, category: Category) -> Self {
        Self { prefix: prefix.into(), method: None, category }
    }

    pub fn with_method(prefix: impl Into<String>, method: impl Into<String>, category: Category) -> Self {
        Self { prefix: prefix.into(), method: Some(method.into()), category }
    }

    fn matches_path(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        rest.is_empty() || self.prefix.ends_with('/') || rest.starts_with('/') || rest.starts_with('?')
    }

    fn matches_method(&self, method: &str) -> bool {
        self.method.as_deref().is_none_or(|expected| expected.eq_ignore_ascii_case(method))
    }
}

/// Maps an outbound call's endpoint to its rate limit category
///
/// Rules bound to a method are consulted before method-less rules; within each
/// group the first match wins. Prefixes match whole path segments, so
/// `/v1/order` does not match `/v1/orders`. Read-only after construction.
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    method_rules: Vec<ResolverRule>,
    path_rules: Vec<ResolverRule>,
    default_category: Category,
}

impl CategoryResolver {
    pub fn new(rules: Vec<ResolverRule>, default_category: Category) -> Result<Self> {
        let mut method_rules = Vec::new();
        let mut path_rules = Vec::new();

        for rule in rules {
            if !rule.prefix.starts_with('/') {
                return Err(RateLimitError::InvalidConfig(format!("resolver prefix {:?} must start with '/'", rule.prefix)));
            }
            match rule.method.as_deref() {
                Some(method) if method.trim().is_empty() => {
                    return Err(RateLimitError::InvalidConfig(format!("resolver rule for {:?} has an empty method", rule.prefix)));
                }
                Some(_) => method_rules.push(rule),
                None => path_rules.push(rule),
            }
        }

        Ok(Self { method_rules, path_rules, default_category })
    }

    pub fn default_category(&self) -> Category {
        self.default_category
    }

    /// Category for `method path`; the default category when nothing matches
    pub fn resolve(&self, path: &str, method: &str) -> Category {
        let path = strip_origin(path);

        self.method_rules
            .iter()
            .find(|rule| rule.matches_method(method) && rule.matches_path(path))
            .or_else(|| self.path_rules.iter().find(|rule| rule.matches_path(path)))
            .map_or(self.default_category, |rule| rule.category)
    }
}

/// Reduce `scheme://host/path` to `/path`; plain paths pass through
fn strip_origin(endpoint: &str) -> &str {
    match endpoint.split_once("://") {
        Some((_, rest)) => rest.find(['/', '?']).map_or("/", |idx| &rest[idx..]),
        None => endpoint,
    }
}
