use std::time::Duration;

use serde::Serialize;

use crate::error::RateLimitError;
use crate::error::Result;
use crate::limiter::Admission;
use crate::time::nanos_to_secs;
use crate::time::wait_from_secs;

/// One quota: at most `max_requests` per `window`
///
/// Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    max_requests: u32,
    window: Duration,
    window_nanos: u64,
}

impl RateWindow {
    /// Create a new window, rejecting a zero quota or a zero-length window
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(RateLimitError::InvalidConfig("max_requests must be greater than 0".to_string()));
        }
        let window_nanos = u64::try_from(window.as_nanos())
            .map_err(|_| RateLimitError::InvalidConfig(format!("window {window:?} is too long")))?;
        if window_nanos == 0 {
            return Err(RateLimitError::InvalidConfig("window must be longer than 0".to_string()));
        }
        Ok(Self { max_requests, window, window_nanos })
    }

    /// Create a window from fractional seconds, as configuration files express it
    pub fn from_secs_f64(max_requests: u32, window_seconds: f64) -> Result<Self> {
        if !window_seconds.is_finite() || window_seconds <= 0.0 {
            return Err(RateLimitError::InvalidConfig(format!("window_seconds must be positive, got {window_seconds}")));
        }
        let window = Duration::try_from_secs_f64(window_seconds).map_err(|err| RateLimitError::InvalidConfig(err.to_string()))?;
        Self::new(max_requests, window)
    }

    pub fn per_second(max_requests: u32) -> Result<Self> {
        Self::new(max_requests, Duration::from_secs(1))
    }

    pub fn per_minute(max_requests: u32) -> Result<Self> {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn window_secs(&self) -> f64 {
        nanos_to_secs(self.window_nanos)
    }

    pub(crate) fn window_nanos(&self) -> u64 {
        self.window_nanos
    }

    /// Steady rate in requests per second
    pub fn rate(&self) -> f64 {
        self.max_requests as f64 / self.window_secs()
    }
}

/// Read-only view of one window's counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowSnapshot {
    pub max_requests: u32,
    pub window_seconds: f64,
    pub current_count: u32,
    pub previous_count: u32,
}

/// Sliding window counter using the weighted overlap of two fixed windows
///
/// Only two counts are kept: the admitted count of the current window and of
/// the one before it. The number of requests in the trailing window is
/// estimated by decaying the previous count linearly across the current
/// window. State rolls forward lazily whenever it is touched.
///
/// Evaluation and commit are separate so a caller holding several counters
/// can evaluate all of them before charging any.
#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    window: RateWindow,
    current_count: u32,
    previous_count: u32,
    /// Start of the window containing the latest observed time, in nanoseconds
    current_window_start: u64,
    current_last_commit: Option<u64>,
    previous_last_commit: Option<u64>,
}

impl SlidingWindowCounter {
    /// Create an empty counter whose first window starts at `now`
    pub fn new(window: RateWindow, now: u64) -> Self {
        Self {
            window,
            current_count: 0,
            previous_count: 0,
            current_window_start: now,
            current_last_commit: None,
            previous_last_commit: None,
        }
    }

    pub fn window(&self) -> &RateWindow {
        &self.window
    }

    /// Roll the window forward if `now` has left it, returning the nanoseconds
    /// elapsed inside the (possibly new) current window
    #[inline(always)]
    fn roll(&mut self, now: u64) -> u64 {
        let window_nanos = self.window.window_nanos();
        let elapsed = now.saturating_sub(self.current_window_start);

        if elapsed < window_nanos {
            return elapsed;
        }

        let windows_elapsed = elapsed / window_nanos;
        if windows_elapsed == 1 {
            self.previous_count = self.current_count;
            self.previous_last_commit = self.current_last_commit;
        } else {
            // A gap of more than one window makes the old counts irrelevant
            self.previous_count = 0;
            self.previous_last_commit = None;
        }
        self.current_count = 0;
        self.current_last_commit = None;
        self.current_window_start += windows_elapsed * window_nanos;

        elapsed - windows_elapsed * window_nanos
    }

    /// Weighted estimate of requests in the trailing window, given the time
    /// already elapsed in the current window
    #[inline(always)]
    fn estimate(&self, now: u64, elapsed: u64) -> f64 {
        let window_nanos = self.window.window_nanos();

        let previous_contribution = match self.previous_last_commit {
            // Every request of the previous window is already older than a full window
            Some(last) if now.saturating_sub(last) >= window_nanos => 0.0,
            _ if self.previous_count == 0 => 0.0,
            _ => {
                let remaining_weight = window_nanos.saturating_sub(elapsed) as f64 / window_nanos as f64;
                self.previous_count as f64 * remaining_weight
            }
        };

        previous_contribution + self.current_count as f64
    }

    /// Estimated number of requests active at `now`
    pub fn estimated_rate(&mut self, now: u64) -> f64 {
        let elapsed = self.roll(now);
        self.estimate(now, elapsed)
    }

    /// Decide whether one more request fits under the window's own quota
    ///
    /// Does not charge the request; see [`SlidingWindowCounter::commit`].
    pub fn evaluate(&mut self, now: u64) -> Admission {
        self.evaluate_with_limit(now, self.window.max_requests as f64)
    }

    /// Decide whether one more request fits under `limit`, which may be lower
    /// than the window's quota (cold-start scaling)
    pub fn evaluate_with_limit(&mut self, now: u64, limit: f64) -> Admission {
        let estimated = self.estimated_rate(now);

        if estimated + 1.0 > limit {
            let retry_secs = (estimated + 1.0 - limit) / limit * self.window.window_secs();
            return Admission::Rejected { retry_after: wait_from_secs(retry_secs) };
        }

        Admission::Admitted
    }

    /// Charge one request at `now`
    pub fn commit(&mut self, now: u64) {
        self.roll(now);
        self.current_count = self.current_count.saturating_add(1);
        self.current_last_commit = Some(now);
    }

    /// Counters as they would read at `now`; the stored state is left as is
    pub fn snapshot_at(&self, now: u64) -> WindowSnapshot {
        let mut rolled = self.clone();
        rolled.roll(now);
        rolled.snapshot()
    }

    /// Counters as currently stored, without rolling
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            max_requests: self.window.max_requests,
            window_seconds: self.window.window_secs(),
            current_count: self.current_count,
            previous_count: self.previous_count,
        }
    }
}
