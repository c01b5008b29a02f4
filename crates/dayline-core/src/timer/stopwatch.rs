//! Monotonic stopwatch with a starting offset.

use std::time::Instant;

/// Counts up from `offset_ms` since `origin`, on the monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopwatch {
    offset_ms: u64,
    origin: Instant,
}

impl Stopwatch {
    pub fn start_at(origin: Instant, offset_ms: u64) -> Self {
        Self { offset_ms, origin }
    }

    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        let since = now.saturating_duration_since(self.origin).as_millis();
        self.offset_ms
            .saturating_add(u64::try_from(since).unwrap_or(u64::MAX))
    }

    /// Continue from `elapsed_ms` as of `now`.
    pub fn rebase(&mut self, now: Instant, elapsed_ms: u64) {
        self.origin = now;
        self.offset_ms = elapsed_ms;
    }
}

/// Wall-clock estimate of elapsed time is ahead of the monotonic one by more
/// than `tolerance_ms`: the monotonic clock stood still while the machine
/// slept. Returns the value to rebase onto.
pub(crate) fn suspended_gap(
    monotonic_ms: u64,
    wall_estimate_ms: u64,
    tolerance_ms: u64,
    max_ms: u64,
) -> Option<u64> {
    let wall = wall_estimate_ms.min(max_ms);
    (wall > monotonic_ms.saturating_add(tolerance_ms)).then_some(wall)
}
