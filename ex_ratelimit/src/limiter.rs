use std::time::Duration;

use crate::window::WindowSnapshot;

/// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed and has been charged
    Admitted,
    /// The request must wait at least `retry_after` before checking again
    Rejected { retry_after: Duration },
}

impl Admission {
    #[inline(always)]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    /// Wait hint; zero when admitted
    #[inline(always)]
    pub fn retry_after(&self) -> Duration {
        match self {
            Admission::Admitted => Duration::ZERO,
            Admission::Rejected { retry_after } => *retry_after,
        }
    }

    /// Combine two rejections, keeping the longest wait
    pub(crate) fn max_wait(self, other: Admission) -> Admission {
        match (self, other) {
            (Admission::Admitted, other) => other,
            (this, Admission::Admitted) => this,
            (Admission::Rejected { retry_after: a }, Admission::Rejected { retry_after: b }) => Admission::Rejected { retry_after: a.max(b) },
        }
    }
}

/// Core trait for admission checks against a clock reading
///
/// `check_at` evaluates and, when admitted, charges in one step. It never
/// blocks beyond the implementation's own short critical section.
pub trait RateLimiter: Send + Sync {
    /// Decide whether one request may proceed at `now` (nanoseconds since the clock epoch)
    fn check_at(&self, now: u64) -> Admission;

    /// Current counters of every window
    fn windows(&self) -> Vec<WindowSnapshot>;
}
