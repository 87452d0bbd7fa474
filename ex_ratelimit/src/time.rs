use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Monotonic time source for rate limiters
///
/// Timestamps are nanoseconds since the clock's own epoch. Every gate owned by
/// one coordinator reads the same clock, so their timestamps are comparable.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since the clock's epoch
    fn now_nanos(&self) -> u64;
}

/// Clock backed by tokio's `Instant`
///
/// Follows virtual time when the tokio runtime is paused, which is what the
/// async tests rely on.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Create a new clock with the current instant as epoch
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline(always)]
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_to_nanos(by), Ordering::AcqRel);
    }

    /// Jump to an absolute offset from the epoch. Going backwards is ignored.
    pub fn set(&self, at: Duration) {
        self.nanos.fetch_max(duration_to_nanos(at), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline(always)]
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::Acquire)
    }
}

/// Convert fractional seconds to nanoseconds, clamping negatives to zero
#[inline(always)]
pub fn secs_to_nanos(secs: f64) -> u64 {
    (secs.max(0.0) * NANOS_PER_SEC).round() as u64
}

/// Convert nanoseconds to fractional seconds
#[inline(always)]
pub fn nanos_to_secs(nanos: u64) -> f64 {
    nanos as f64 / NANOS_PER_SEC
}

/// Convert duration to nanoseconds, saturating at `u64::MAX`
#[inline(always)]
pub fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Convert a non-negative wait in seconds to a `Duration`
#[inline(always)]
pub(crate) fn wait_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 { Duration::from_secs_f64(secs) } else { Duration::ZERO }
}
