use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::category::Category;
use crate::cold_start::CategorySnapshot;
use crate::cold_start::ColdStartGate;
use crate::config::AcquireConfig;
use crate::config::LimiterConfig;
use crate::error::RateLimitError;
use crate::error::Result;
use crate::limiter::Admission;
use crate::resolver::CategoryResolver;
use crate::time::Clock;
use crate::time::MonotonicClock;

/// Floor on a single wait so a zero hint cannot spin
const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Process-wide entry point: one cold-start gate per category
///
/// Built once at startup and shared (typically behind an `Arc`) by every
/// caller that talks to the exchange. Categories are fully independent; each
/// gate serialises only its own callers.
pub struct RateLimiterCoordinator {
    /// Indexed by [`Category::index`]
    gates: Vec<ColdStartGate>,
    resolver: CategoryResolver,
    acquire: AcquireConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiterCoordinator {
    /// Build from configuration using the monotonic clock
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Build from configuration with an explicit clock
    ///
    /// Fails if any part of the configuration is invalid; every gate starts
    /// its cold-start phases at the clock's current reading.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.cold_start.validate()?;
        config.acquire.validate()?;
        let rules = config.category_rules()?;
        let resolver = config.build_resolver()?;

        let now = clock.now_nanos();
        let gates: Vec<ColdStartGate> =
            Category::ALL.iter().zip(rules).map(|(&category, rule)| ColdStartGate::new(category, rule, config.cold_start, now)).collect();

        info!(
            "Rate limiter ready: {} categories, startup {}s, warmup until {}s, max {} attempts per acquire",
            gates.len(),
            config.cold_start.startup_secs,
            config.cold_start.warmup_end_secs,
            config.acquire.max_attempts
        );

        Ok(Self { gates, resolver, acquire: config.acquire, clock })
    }

    #[inline(always)]
    pub fn gate(&self, category: Category) -> &ColdStartGate {
        &self.gates[category.index()]
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn acquire_config(&self) -> &AcquireConfig {
        &self.acquire
    }

    /// Category of an outbound call
    pub fn resolve(&self, path: &str, method: &str) -> Category {
        self.resolver.resolve(path, method)
    }

    /// Check once without waiting; admitted requests are charged
    pub fn try_acquire(&self, category: Category) -> Admission {
        self.gate(category).check(self.clock.now_nanos())
    }

    /// Wait until `category` admits a request, using the configured attempt budget
    pub async fn acquire(&self, category: Category, cancel: &CancellationToken) -> Result<()> {
        self.acquire_with_attempts(category, self.acquire.max_attempts, cancel).await
    }

    /// Resolve the endpoint, then wait for its category
    pub async fn acquire_endpoint(&self, path: &str, method: &str, cancel: &CancellationToken) -> Result<Category> {
        let category = self.resolve(path, method);
        self.acquire(category, cancel).await?;
        Ok(category)
    }

    /// Wait until `category` admits a request, checking at most `max_attempts` times
    ///
    /// Between checks the task sleeps for the gate's hint, clamped to the
    /// configured backoff cap. Cancellation during a sleep returns
    /// [`RateLimitError::Cancelled`]; only an admitted check charges quota.
    pub async fn acquire_with_attempts(&self, category: Category, max_attempts: u32, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled { category });
        }

        let max_attempts = max_attempts.max(1);
        let max_backoff = self.acquire.max_backoff();
        let mut last_hint = Duration::ZERO;

        for attempt in 1..=max_attempts {
            let retry_after = match self.try_acquire(category) {
                Admission::Admitted => return Ok(()),
                Admission::Rejected { retry_after } => retry_after,
            };
            last_hint = retry_after;

            if attempt == max_attempts {
                break;
            }

            let wait = retry_after.clamp(MIN_BACKOFF, max_backoff);
            debug!("{category} rejected (attempt {attempt}/{max_attempts}), retry after {retry_after:?}, sleeping {wait:?}");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("{category} acquire cancelled after {attempt} attempts");
                    return Err(RateLimitError::Cancelled { category });
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        warn!("{category} still limited after {max_attempts} attempts, retry after {last_hint:?}");
        Err(RateLimitError::Exceeded { category, retry_after: last_hint })
    }

    /// Phase, age and window counters of every category; never mutates
    pub fn status(&self) -> BTreeMap<Category, CategorySnapshot> {
        let now = self.clock.now_nanos();
        self.gates.iter().map(|gate| (gate.category(), gate.snapshot(now))).collect()
    }
}
