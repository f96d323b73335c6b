//! Monotonic time helpers for periodic activation.
//!
//! Absolute timestamps are [`std::time::Instant`] values; comparison,
//! addition and difference come from the standard operators. The one thing
//! the standard library does not provide is an absolute-time sleep that is
//! robust to early wake-ups, which is what periodic pacing needs.

use std::time::{Duration, Instant};

/// Suspends the calling thread until `deadline` has been reached.
///
/// The underlying sleep may wake early; the wait is retried until the
/// monotonic clock has actually passed the target. Returns immediately if
/// the deadline is already in the past.
pub fn sleep_until(deadline: Instant) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(deadline - now);
    }
}

/// Duration since an earlier instant, zero if `earlier` is in the future.
pub fn elapsed_since(earlier: Instant) -> Duration {
    Instant::now().saturating_duration_since(earlier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_until_reaches_target() {
        let target = Instant::now() + Duration::from_millis(20);
        sleep_until(target);
        assert!(Instant::now() >= target);
    }

    #[test]
    fn sleep_until_past_deadline_returns_immediately() {
        let target = Instant::now() - Duration::from_millis(5);
        let before = Instant::now();
        sleep_until(target);
        assert!(before.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn elapsed_since_future_is_zero() {
        let future = Instant::now() + Duration::from_secs(10);
        assert_eq!(elapsed_since(future), Duration::ZERO);
    }
}
