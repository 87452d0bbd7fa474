use parking_lot::Mutex;

use crate::category::CategoryRule;
use crate::category::MeasurementUnit;
use crate::error::Result;
use crate::limiter::Admission;
use crate::limiter::RateLimiter;
use crate::window::RateWindow;
use crate::window::SlidingWindowCounter;
use crate::window::WindowSnapshot;

/// All windows of one category, admitted together or not at all
///
/// Exchanges enforce several quotas on the same endpoints at once, e.g. a
/// per-second burst limit and a per-minute sustained limit. A request is
/// admitted only if every window accepts it, and only then is it charged to
/// every window. Evaluation and commit run under one lock so concurrent
/// callers cannot interleave.
pub struct CategoryLimiter {
    rule: CategoryRule,
    counters: Mutex<Vec<SlidingWindowCounter>>,
}

impl CategoryLimiter {
    /// Create a limiter whose windows start at `now`
    pub fn new(rule: CategoryRule, now: u64) -> Self {
        let counters = rule.windows().iter().map(|window| SlidingWindowCounter::new(*window, now)).collect();
        Self { rule, counters: Mutex::new(counters) }
    }

    /// Create a new limiter builder
    pub fn builder() -> CategoryLimiterBuilder {
        CategoryLimiterBuilder::new()
    }

    pub fn rule(&self) -> &CategoryRule {
        &self.rule
    }

    /// Evaluate every window at full quota; charge all of them if all accept
    pub fn check(&self, now: u64) -> Admission {
        self.check_scaled(now, 1.0)
    }

    /// Same as [`CategoryLimiter::check`] with every quota multiplied by
    /// `ratio`. A scaled quota never drops below one request.
    pub(crate) fn check_scaled(&self, now: u64, ratio: f64) -> Admission {
        let mut counters = self.counters.lock();

        let mut verdict = Admission::Admitted;
        for counter in counters.iter_mut() {
            let limit = (counter.window().max_requests() as f64 * ratio).max(1.0);
            verdict = verdict.max_wait(counter.evaluate_with_limit(now, limit));
        }

        if verdict.is_admitted() {
            for counter in counters.iter_mut() {
                counter.commit(now);
            }
        }

        verdict
    }

    pub fn snapshot(&self) -> Vec<WindowSnapshot> {
        self.counters.lock().iter().map(SlidingWindowCounter::snapshot).collect()
    }

    /// Window counters as they read at `now`, without rolling the stored state
    pub fn snapshot_at(&self, now: u64) -> Vec<WindowSnapshot> {
        self.counters.lock().iter().map(|counter| counter.snapshot_at(now)).collect()
    }
}

impl RateLimiter for CategoryLimiter {
    fn check_at(&self, now: u64) -> Admission {
        self.check(now)
    }

    fn windows(&self) -> Vec<WindowSnapshot> {
        self.snapshot()
    }
}

/// Builder for creating a category limiter
pub struct CategoryLimiterBuilder {
    windows: Vec<RateWindow>,
    unit: MeasurementUnit,
    start: u64,
}

impl CategoryLimiterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self { windows: Vec::new(), unit: MeasurementUnit::Ip, start: 0 }
    }

    /// Add a window. The first window added is the primary one.
    pub fn with_window(mut self, window: RateWindow) -> Self {
        self.windows.push(window);
        self
    }

    pub fn unit(mut self, unit: MeasurementUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Clock reading at which the first windows open
    pub fn start_at(mut self, now: u64) -> Self {
        self.start = now;
        self
    }

    /// Build the limiter; fails when no window was added
    pub fn build(self) -> Result<CategoryLimiter> {
        let rule = CategoryRule::new(self.windows, self.unit)?;
        Ok(CategoryLimiter::new(rule, self.start))
    }
}

impl Default for CategoryLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::RateLimitError;
    use crate::time::secs_to_nanos;

    fn per_second_and_minute(per_second: u32, per_minute: u32) -> CategoryLimiter {
        CategoryLimiter::builder()
            .with_window(RateWindow::per_second(per_second).unwrap())
            .with_window(RateWindow::per_minute(per_minute).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_builder_is_rejected() {
        assert!(matches!(CategoryLimiter::builder().build(), Err(RateLimitError::InvalidConfig(_))));
    }

    #[test]
    fn test_single_window() {
        let limiter = CategoryLimiter::builder().with_window(RateWindow::per_second(3).unwrap()).build().unwrap();

        for _ in 0..3 {
            assert!(limiter.check(0).is_admitted());
        }
        assert!(!limiter.check(0).is_admitted());
        assert_eq!(limiter.snapshot()[0].current_count, 3);
    }

    #[test]
    fn test_all_or_nothing() {
        // 10 per second is never the binding constraint here; 15 per minute is
        let limiter = per_second_and_minute(10, 15);

        for second in 0..3u64 {
            for _ in 0..5 {
                assert!(limiter.check(secs_to_nanos(second as f64)).is_admitted());
            }
        }

        let rejected = limiter.check(secs_to_nanos(3.0));
        assert!(!rejected.is_admitted());

        // The per-second window accepted but must not have been charged
        let windows = limiter.snapshot();
        assert_eq!(windows[0].current_count, 0);
        assert_eq!(windows[1].current_count, 15);
    }

    #[test]
    fn test_retry_after_is_the_slowest_window() {
        let limiter = per_second_and_minute(2, 2);

        assert!(limiter.check(0).is_admitted());
        assert!(limiter.check(0).is_admitted());

        // Per second: (2 + 1 - 2) / 2 * 1s = 0.5s. Per minute: (2 + 1 - 2) / 2 * 60s = 30s.
        let rejected = limiter.check(0);
        assert_eq!(rejected.retry_after(), Duration::from_secs(30));
    }

    #[test]
    fn test_scaled_check_never_drops_below_one_request() {
        let limiter = CategoryLimiter::builder().with_window(RateWindow::new(1, Duration::from_secs(2)).unwrap()).build().unwrap();

        assert!(limiter.check_scaled(0, 0.3).is_admitted());
        assert!(!limiter.check_scaled(0, 0.3).is_admitted());
    }

    #[test]
    fn test_rule_is_kept() {
        let limiter = CategoryLimiter::builder()
            .with_window(RateWindow::per_second(8).unwrap())
            .unit(MeasurementUnit::Account)
            .start_at(42)
            .build()
            .unwrap();

        assert_eq!(limiter.rule().unit(), MeasurementUnit::Account);
        assert_eq!(limiter.windows()[0].max_requests, 8);
    }

    #[test]
    fn test_concurrent_access() {
        let limiter = Arc::new(per_second_and_minute(100, 1000));
        let mut handles = vec![];

        // Spawn 10 threads each trying to acquire 15 times within the same instant
        for _ in 0..10 {
            let limiter_clone = Arc::clone(&limiter);
            let handle = std::thread::spawn(move || {
                let mut acquired = 0;
                for _ in 0..15 {
                    if limiter_clone.check_at(0).is_admitted() {
                        acquired += 1;
                    }
                }
                acquired
            });
            handles.push(handle);
        }

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // Exactly the per-second quota, and both windows charged in lockstep
        assert_eq!(total, 100);
        let windows = limiter.snapshot();
        assert_eq!(windows[0].current_count, 100);
        assert_eq!(windows[1].current_count, 100);
    }
}
