use std::time::Duration;

use serde::Deserialize;

use crate::category::Category;
use crate::category::CategoryRule;
use crate::category::MeasurementUnit;
use crate::cold_start::ColdStartPolicy;
use crate::error::RateLimitError;
use crate::error::Result;
use crate::presets;
use crate::resolver::CategoryResolver;
use crate::resolver::ResolverRule;
use crate::window::RateWindow;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 1_000;

/// One quota as written in configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowConfig {
    pub max_requests: u32,
    pub window_seconds: f64,
}

/// Quotas of one category as written in configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryConfig {
    pub category: Category,
    pub unit: MeasurementUnit,
    pub windows: Vec<WindowConfig>,
}

impl CategoryConfig {
    fn to_rule(&self) -> Result<CategoryRule> {
        let windows = self
            .windows
            .iter()
            .map(|w| RateWindow::from_secs_f64(w.max_requests, w.window_seconds))
            .collect::<Result<Vec<_>>>()
            .map_err(|err| RateLimitError::InvalidConfig(format!("{}: {}", self.category, err)))?;

        CategoryRule::new(windows, self.unit).map_err(|err| RateLimitError::InvalidConfig(format!("{}: {}", self.category, err)))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub default_category: Category,
    pub rules: Vec<ResolverRule>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { default_category: presets::DEFAULT_CATEGORY, rules: presets::resolver_rules() }
    }
}

/// Retry behaviour of the blocking acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    /// Checks made before giving up with `Exceeded`
    pub max_attempts: u32,

    /// Cap on a single wait between checks
    pub max_backoff_ms: u64,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, max_backoff_ms: DEFAULT_MAX_BACKOFF_MS }
    }
}

impl AcquireConfig {
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RateLimitError::InvalidConfig("acquire.max_attempts must be greater than 0".to_string()));
        }
        if self.max_backoff_ms == 0 {
            return Err(RateLimitError::InvalidConfig("acquire.max_backoff_ms must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Complete static configuration of a coordinator
///
/// Every section defaults to the built-in presets, so a file only needs the
/// sections it changes. The category table is replaced as a whole.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub categories: Vec<CategoryConfig>,
    pub resolver: ResolverConfig,
    pub cold_start: ColdStartPolicy,
    pub acquire: AcquireConfig,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            categories: presets::category_configs(),
            resolver: ResolverConfig::default(),
            cold_start: ColdStartPolicy::default(),
            acquire: AcquireConfig::default(),
        }
    }
}

impl LimiterConfig {
    /// Validated rules, one per category in [`Category::ALL`] order
    pub fn category_rules(&self) -> Result<Vec<CategoryRule>> {
        let mut rules: Vec<Option<CategoryRule>> = vec![None; Category::ALL.len()];

        for entry in &self.categories {
            let slot = &mut rules[entry.category.index()];
            if slot.is_some() {
                return Err(RateLimitError::InvalidConfig(format!("duplicate rule for {}", entry.category)));
            }
            *slot = Some(entry.to_rule()?);
        }

        Category::ALL
            .iter()
            .zip(rules)
            .map(|(category, rule)| rule.ok_or_else(|| RateLimitError::InvalidConfig(format!("no rule for {category}"))))
            .collect()
    }

    pub fn build_resolver(&self) -> Result<CategoryResolver> {
        CategoryResolver::new(self.resolver.rules.clone(), self.resolver.default_category)
    }

    /// Check every section without building anything long-lived
    pub fn validate(&self) -> Result<()> {
        self.category_rules()?;
        self.build_resolver()?;
        self.cold_start.validate()?;
        self.acquire.validate()
    }
}
