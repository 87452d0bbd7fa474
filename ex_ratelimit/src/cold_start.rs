//! Cold-start admission policy
//!
//! A freshly started process has no request history, so the sliding window
//! estimate starts at zero and would happily admit a whole queue of pending
//! requests at once. The gate layers three phases over a [`CategoryLimiter`],
//! keyed to time since the gate was created:
//!
//! - **Startup** (`age < startup_secs`): a hard cap on total admissions,
//!   independent of the windows.
//! - **Warmup** (`startup_secs <= age < warmup_end_secs`): every quota scaled
//!   by a ratio that grows linearly from `warmup_floor` to 1, plus a minimum
//!   spacing of `warmup_interval_margin` times the scaled per-request interval.
//! - **Steady** (`age >= warmup_end_secs`): the plain limiter plus a minimum
//!   spacing of one per-request interval.
//!
//! Quotas and intervals are taken from the rule's primary window.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::trace;

use crate::category::Category;
use crate::category::CategoryRule;
use crate::category::MeasurementUnit;
use crate::category_limiter::CategoryLimiter;
use crate::error::RateLimitError;
use crate::error::Result;
use crate::limiter::Admission;
use crate::limiter::RateLimiter;
use crate::time::nanos_to_secs;
use crate::time::secs_to_nanos;
use crate::time::wait_from_secs;
use crate::window::RateWindow;
use crate::window::WindowSnapshot;

pub const DEFAULT_STARTUP_SECS: f64 = 5.0;
pub const DEFAULT_WARMUP_END_SECS: f64 = 30.0;
pub const DEFAULT_STARTUP_RATIO: f64 = 0.1;
pub const DEFAULT_WARMUP_FLOOR: f64 = 0.3;
pub const DEFAULT_WARMUP_INTERVAL_MARGIN: f64 = 1.5;

// Guards the startup cap against 0.1 * n landing a hair below an integer
const CAP_EPSILON: f64 = 1e-9;

/// Lifecycle phase of a gate, derived from its age
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Startup,
    Warmup,
    Steady,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Startup => f.write_str("startup"),
            Phase::Warmup => f.write_str("warmup"),
            Phase::Steady => f.write_str("steady"),
        }
    }
}

/// Phase thresholds and ratios
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ColdStartPolicy {
    /// End of the startup phase, in seconds of gate age
    pub startup_secs: f64,

    /// End of the warmup phase, in seconds of gate age
    pub warmup_end_secs: f64,

    /// Share of the primary quota admitted in total during startup
    pub startup_ratio: f64,

    /// Share of every quota available at the start of warmup
    pub warmup_floor: f64,

    /// Multiplier on the scaled per-request interval during warmup
    pub warmup_interval_margin: f64,
}

impl Default for ColdStartPolicy {
    fn default() -> Self {
        Self {
            startup_secs: DEFAULT_STARTUP_SECS,
            warmup_end_secs: DEFAULT_WARMUP_END_SECS,
            startup_ratio: DEFAULT_STARTUP_RATIO,
            warmup_floor: DEFAULT_WARMUP_FLOOR,
            warmup_interval_margin: DEFAULT_WARMUP_INTERVAL_MARGIN,
        }
    }
}

impl ColdStartPolicy {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(RateLimitError::InvalidConfig(format!("cold_start: {msg}")));

        if !(self.startup_secs > 0.0 && self.startup_secs < self.warmup_end_secs) || !self.warmup_end_secs.is_finite() {
            return invalid("require 0 < startup_secs < warmup_end_secs");
        }
        if !(self.startup_ratio > 0.0 && self.startup_ratio <= 1.0) {
            return invalid("startup_ratio must be in (0, 1]");
        }
        if !(self.warmup_floor > 0.0 && self.warmup_floor <= 1.0) {
            return invalid("warmup_floor must be in (0, 1]");
        }
        if !(self.warmup_interval_margin >= 1.0 && self.warmup_interval_margin.is_finite()) {
            return invalid("warmup_interval_margin must be at least 1");
        }
        Ok(())
    }

    pub fn phase_at(&self, age_secs: f64) -> Phase {
        if age_secs < self.startup_secs {
            Phase::Startup
        } else if age_secs < self.warmup_end_secs {
            Phase::Warmup
        } else {
            Phase::Steady
        }
    }

    /// Total admissions allowed during startup: `max(1, floor(max_requests * startup_ratio))`
    pub fn startup_cap(&self, max_requests: u32) -> u64 {
        ((max_requests as f64 * self.startup_ratio + CAP_EPSILON).floor() as u64).max(1)
    }

    /// Share of each quota available at `age_secs`, clamped to `[warmup_floor, 1]`
    pub fn warmup_ratio(&self, age_secs: f64) -> f64 {
        let span = self.warmup_end_secs - self.startup_secs;
        let progress = ((age_secs - self.startup_secs) / span).clamp(0.0, 1.0);
        self.warmup_floor + (1.0 - self.warmup_floor) * progress
    }

    /// Effective cap on the primary window at `age_secs`
    pub fn warmup_limit(&self, max_requests: u32, age_secs: f64) -> f64 {
        max_requests as f64 * self.warmup_ratio(age_secs)
    }
}

/// Observability view of one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySnapshot {
    pub category: Category,
    pub unit: MeasurementUnit,
    pub phase: Phase,
    pub age_seconds: f64,
    pub total_admitted: u64,
    pub windows: Vec<WindowSnapshot>,
}

#[derive(Debug)]
struct ColdStartState {
    /// Clock reading at construction; never reset
    start: u64,
    total_admitted: u64,
    last_admitted: Option<u64>,
    /// Latest phase seen by a check, for transition logging
    observed: Phase,
}

/// Phased admission gate around one category's limiter
pub struct ColdStartGate {
    category: Category,
    policy: ColdStartPolicy,
    limiter: CategoryLimiter,
    state: Mutex<ColdStartState>,
}

impl ColdStartGate {
    /// Create a gate whose age counts from `now`
    pub fn new(category: Category, rule: CategoryRule, policy: ColdStartPolicy, now: u64) -> Self {
        Self {
            category,
            policy,
            limiter: CategoryLimiter::new(rule, now),
            state: Mutex::new(ColdStartState { start: now, total_admitted: 0, last_admitted: None, observed: Phase::Startup }),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn policy(&self) -> &ColdStartPolicy {
        &self.policy
    }

    pub fn limiter(&self) -> &CategoryLimiter {
        &self.limiter
    }

    /// Decide whether one request may proceed at `now`, charging it if so
    pub fn check(&self, now: u64) -> Admission {
        let mut state = self.state.lock();

        let age = nanos_to_secs(now.saturating_sub(state.start));
        let phase = self.policy.phase_at(age);
        if phase > state.observed {
            info!("{} entered {} phase at {:.3}s ({} admitted so far)", self.category, phase, age, state.total_admitted);
            state.observed = phase;
        }

        let primary = *self.limiter.rule().primary();
        let admission = match phase {
            Phase::Startup => self.check_startup(&state, age, &primary),
            Phase::Warmup => self.check_warmup(&state, now, age, &primary),
            Phase::Steady => self.check_steady(&state, now, &primary),
        };

        if admission.is_admitted() {
            state.total_admitted += 1;
            state.last_admitted = Some(now);
            trace!("{} admitted in {} phase at {:.3}s (total {})", self.category, phase, age, state.total_admitted);
        }

        admission
    }

    /// Startup bypasses the windows and only counts its own admissions
    fn check_startup(&self, state: &ColdStartState, age: f64, primary: &RateWindow) -> Admission {
        if state.total_admitted < self.policy.startup_cap(primary.max_requests()) {
            return Admission::Admitted;
        }
        Admission::Rejected { retry_after: wait_from_secs(self.policy.startup_secs - age) }
    }

    fn check_warmup(&self, state: &ColdStartState, now: u64, age: f64, primary: &RateWindow) -> Admission {
        let limit = self.policy.warmup_limit(primary.max_requests(), age);
        let interval = self.policy.warmup_interval_margin * primary.window_secs() / limit;

        if let Some(wait) = interval_shortfall(state.last_admitted, now, interval) {
            return Admission::Rejected { retry_after: wait };
        }

        // Window limits below one request would never admit again
        self.limiter.check_scaled(now, limit.max(1.0) / primary.max_requests() as f64)
    }

    fn check_steady(&self, state: &ColdStartState, now: u64, primary: &RateWindow) -> Admission {
        let interval = primary.window_secs() / primary.max_requests() as f64;

        if let Some(wait) = interval_shortfall(state.last_admitted, now, interval) {
            return Admission::Rejected { retry_after: wait };
        }

        self.limiter.check(now)
    }

    /// Phase, age and counters at `now`, without touching any state
    pub fn snapshot(&self, now: u64) -> CategorySnapshot {
        let state = self.state.lock();
        let age = nanos_to_secs(now.saturating_sub(state.start));

        CategorySnapshot {
            category: self.category,
            unit: self.limiter.rule().unit(),
            phase: self.policy.phase_at(age),
            age_seconds: age,
            total_admitted: state.total_admitted,
            windows: self.limiter.snapshot_at(now),
        }
    }
}

impl RateLimiter for ColdStartGate {
    fn check_at(&self, now: u64) -> Admission {
        self.check(now)
    }

    fn windows(&self) -> Vec<WindowSnapshot> {
        self.limiter.snapshot()
    }
}

/// Remaining wait if fewer than `interval_secs` passed since the last admission
#[inline(always)]
fn interval_shortfall(last_admitted: Option<u64>, now: u64, interval_secs: f64) -> Option<Duration> {
    let last = last_admitted?;
    let interval = secs_to_nanos(interval_secs);
    let since = now.saturating_sub(last);
    (since < interval).then(|| Duration::from_nanos(interval - since))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn rule(windows: &[(u32, f64)]) -> CategoryRule {
        let windows = windows.iter().map(|&(max, secs)| RateWindow::from_secs_f64(max, secs).unwrap()).collect();
        CategoryRule::new(windows, MeasurementUnit::Ip).unwrap()
    }

    fn gate(windows: &[(u32, f64)]) -> ColdStartGate {
        ColdStartGate::new(Category::Quotation, rule(windows), ColdStartPolicy::default(), 0)
    }

    fn at(secs: f64) -> u64 {
        secs_to_nanos(secs)
    }

    #[test]
    fn test_phase_boundaries() {
        let policy = ColdStartPolicy::default();
        assert_eq!(policy.phase_at(0.0), Phase::Startup);
        assert_eq!(policy.phase_at(4.999), Phase::Startup);
        assert_eq!(policy.phase_at(5.0), Phase::Warmup);
        assert_eq!(policy.phase_at(29.999), Phase::Warmup);
        assert_eq!(policy.phase_at(30.0), Phase::Steady);
        assert_eq!(policy.phase_at(86_400.0), Phase::Steady);
    }

    #[test]
    fn test_startup_cap() {
        let policy = ColdStartPolicy::default();
        assert_eq!(policy.startup_cap(1), 1);
        assert_eq!(policy.startup_cap(5), 1);
        assert_eq!(policy.startup_cap(10), 1);
        assert_eq!(policy.startup_cap(30), 3);
        assert_eq!(policy.startup_cap(35), 3);
        assert_eq!(policy.startup_cap(70), 7);
    }

    #[test]
    fn test_warmup_limit_boundaries() {
        let policy = ColdStartPolicy::default();
        assert!((policy.warmup_limit(10, 5.0) - 3.0).abs() < 1e-9);
        assert!((policy.warmup_limit(10, 17.5) - 6.5).abs() < 1e-9);
        assert!((policy.warmup_limit(10, 30.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_policy_validation() {
        assert!(ColdStartPolicy::default().validate().is_ok());

        let inverted = ColdStartPolicy { startup_secs: 30.0, warmup_end_secs: 5.0, ..Default::default() };
        assert!(matches!(inverted.validate(), Err(RateLimitError::InvalidConfig(_))));

        let zero_ratio = ColdStartPolicy { startup_ratio: 0.0, ..Default::default() };
        assert!(zero_ratio.validate().is_err());

        let loose_margin = ColdStartPolicy { warmup_interval_margin: 0.5, ..Default::default() };
        assert!(loose_margin.validate().is_err());
    }

    #[test]
    fn test_startup_admits_cap_then_waits_out_phase() {
        let gate = gate(&[(10, 1.0)]);

        assert!(gate.check(at(0.0)).is_admitted());

        let rejected = gate.check(at(1.0));
        assert!(!rejected.is_admitted());
        assert_eq!(rejected.retry_after(), Duration::from_secs(4));

        let rejected = gate.check(at(4.5));
        assert_eq!(rejected.retry_after(), Duration::from_millis(500));
    }

    #[test]
    fn test_startup_bypasses_windows() {
        let gate = gate(&[(50, 1.0), (600, 60.0)]);

        for _ in 0..5 {
            assert!(gate.check(at(0.1)).is_admitted());
        }
        assert!(!gate.check(at(0.1)).is_admitted());

        for window in gate.windows() {
            assert_eq!(window.current_count, 0);
        }
        assert_eq!(gate.snapshot(at(0.1)).total_admitted, 5);
    }

    #[test]
    fn test_warmup_enforces_spacing() {
        let gate = gate(&[(10, 1.0)]);

        assert!(gate.check(at(5.0)).is_admitted());

        // At age 5.1 the limit is ~3.03, so the spacing is 1.5 / 3.03 ~= 0.495s
        let rejected = gate.check(at(5.1));
        assert!(!rejected.is_admitted());
        let wait = rejected.retry_after().as_secs_f64();
        assert!(wait > 0.35 && wait < 0.45, "unexpected wait {wait}");

        assert!(gate.check(at(5.6)).is_admitted());
    }

    #[test]
    fn test_warmup_spacing_follows_fractional_limit() {
        // 1 per 2s: the limit starts at 0.3, so the spacing starts at 1.5 * 2 / 0.3 = 10s
        let gate = gate(&[(1, 2.0)]);

        assert!(gate.check(at(5.0)).is_admitted());

        // At age 8.1 the limit is ~0.387 and the spacing ~7.76s
        let rejected = gate.check(at(8.1));
        assert!(!rejected.is_admitted());
        let wait = rejected.retry_after().as_secs_f64();
        assert!(wait > 4.6 && wait < 4.7, "unexpected wait {wait}");

        // Spacing is met from ~6.3s after the last admission
        assert!(!gate.check(at(11.0)).is_admitted());
        assert!(gate.check(at(11.5)).is_admitted());
    }

    #[test]
    fn test_snapshot_reports_counts_as_of_now() {
        let gate = gate(&[(10, 1.0)]);
        assert!(gate.check(at(30.0)).is_admitted());

        assert_eq!(gate.snapshot(at(30.5)).windows[0].current_count, 1);
        let later = gate.snapshot(at(31.2));
        assert_eq!(later.windows[0].current_count, 0);
        assert_eq!(later.windows[0].previous_count, 1);
        assert_eq!(gate.snapshot(at(40.0)).windows[0].previous_count, 0);

        // Stored counters are untouched
        assert_eq!(gate.windows()[0].current_count, 1);
    }

    #[test]
    fn test_warmup_commits_through_windows() {
        let gate = gate(&[(10, 1.0), (100, 60.0)]);

        assert!(gate.check(at(6.0)).is_admitted());
        let windows = gate.windows();
        assert_eq!(windows[0].current_count, 1);
        assert_eq!(windows[1].current_count, 1);
    }

    #[test]
    fn test_warmup_scales_every_window() {
        // The per-minute window binds: 20 * ~0.31 stays below 7 over these 0.66s.
        // Spacing of 60ms clears the ~50ms warmup interval of the per-second window.
        let gate = gate(&[(100, 1.0), (20, 60.0)]);

        let mut admitted = 0;
        let mut now = at(5.0);
        for _ in 0..12 {
            if gate.check(now).is_admitted() {
                admitted += 1;
            }
            now += at(0.06);
        }
        assert_eq!(admitted, 6);
    }

    #[test]
    fn test_steady_state_spacing() {
        let gate = gate(&[(10, 1.0)]);

        assert!(gate.check(at(30.0)).is_admitted());

        let rejected = gate.check(at(30.05));
        assert_eq!(rejected.retry_after(), Duration::from_millis(50));

        assert!(gate.check(at(30.1)).is_admitted());
    }

    #[test]
    fn test_steady_state_matches_plain_limiter() {
        let gate = gate(&[(5, 1.0), (40, 60.0)]);
        let limiter = CategoryLimiter::new(rule(&[(5, 1.0), (40, 60.0)]), 0);

        // Spaced exactly one primary interval apart, so only the windows can reject
        let outcomes = |limiter: &dyn RateLimiter| -> Vec<bool> {
            (0..120).map(|k| limiter.check_at(at(30.0) + k * at(0.2)).is_admitted()).collect()
        };

        let gated = outcomes(&gate);
        let plain = outcomes(&limiter);
        assert_eq!(gated, plain);
        assert!(gated.iter().any(|admitted| !admitted), "the per-minute window should bind");
    }

    #[test]
    fn test_phase_is_monotonic_and_snapshot_is_read_only() {
        let gate = gate(&[(10, 1.0)]);

        assert_eq!(gate.snapshot(at(1.0)).phase, Phase::Startup);
        assert_eq!(gate.snapshot(at(10.0)).phase, Phase::Warmup);
        let steady = gate.snapshot(at(31.0));
        assert_eq!(steady.phase, Phase::Steady);
        assert!((steady.age_seconds - 31.0).abs() < 1e-9);
        assert_eq!(steady.total_admitted, 0);
        assert_eq!(steady.category, Category::Quotation);
        assert_eq!(steady.unit, MeasurementUnit::Ip);
    }

    proptest! {
        #[test]
        fn prop_startup_never_exceeds_cap(
            max in 1u32..500,
            offsets in prop::collection::vec(0u64..5_000_000_000, 1..300),
        ) {
            let mut sorted = offsets;
            sorted.sort_unstable();

            let gate = gate(&[(max, 1.0)]);
            let admitted = sorted.into_iter().filter(|&now| gate.check(now).is_admitted()).count() as u64;

            prop_assert!(admitted <= ColdStartPolicy::default().startup_cap(max));
        }

        #[test]
        fn prop_warmup_limit_non_decreasing(max in 1u32..1000, a in 5.0f64..30.0, b in 5.0f64..30.0) {
            let policy = ColdStartPolicy::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.warmup_limit(max, lo) <= policy.warmup_limit(max, hi));
        }

        #[test]
        fn prop_steady_state_is_limiter_plus_spacing(steps in prop::collection::vec(0u64..400_000_000, 1..200)) {
            let gate = gate(&[(5, 1.0), (60, 60.0)]);
            let limiter = CategoryLimiter::new(rule(&[(5, 1.0), (60, 60.0)]), 0);
            let interval = at(0.2);

            let mut now = at(30.0);
            let mut last_admitted: Option<u64> = None;
            for step in steps {
                now += step;
                let spaced = last_admitted.is_none_or(|last| now - last >= interval);
                let expected = spaced && limiter.check(now).is_admitted();
                if expected {
                    last_admitted = Some(now);
                }
                prop_assert_eq!(gate.check(now).is_admitted(), expected);
            }
        }
    }
}
