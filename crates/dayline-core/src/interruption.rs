//! Interruption tracking.
//!
//! An interruption is a logged distraction with a start and an end. While one
//! is open it is persisted as-is under [`INTERRUPTION_KEY`]; its start time is
//! the wall-clock anchor, so recovery after a restart yields the full time
//! since it began.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::recovery::{self, ActiveSpan, RecoverySnapshot, SpanStatus, TimerRecoveryResult};
use crate::storage::{load_record, save_record, RecoveryStore, INTERRUPTION_KEY};
use crate::time::{self, Clock, SystemClock};
use crate::timer::stopwatch::{suspended_gap, Stopwatch};
use crate::timer::{LifecycleEvent, TimerSettings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptionSpan {
    pub id: String,
    #[serde(default)]
    pub reason: Option<String>,
    /// Task that was interrupted, if any.
    #[serde(default)]
    pub task_id: Option<String>,
    pub started_at_wall_clock: DateTime<Utc>,
    #[serde(default)]
    pub ended_at_wall_clock: Option<DateTime<Utc>>,
}

impl InterruptionSpan {
    pub fn open(reason: Option<String>, task_id: Option<String>, started: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reason,
            task_id,
            started_at_wall_clock: started,
            ended_at_wall_clock: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at_wall_clock.is_none()
    }

    /// Wall-clock length, up to the end or `now` while open.
    pub fn duration_ms(&self, now: DateTime<Utc>) -> u64 {
        let end = self.ended_at_wall_clock.unwrap_or(now);
        time::millis_between(self.started_at_wall_clock, end)
            .max(0)
            .unsigned_abs()
    }
}

impl ActiveSpan for InterruptionSpan {
    fn recovery_snapshot(&self) -> RecoverySnapshot {
        RecoverySnapshot {
            status: if self.is_active() {
                SpanStatus::Active
            } else {
                SpanStatus::Inactive
            },
            elapsed_ms: 0,
            last_sync_wall_clock: self.started_at_wall_clock,
        }
    }
}

#[derive(Debug)]
struct OpenInterruption {
    span: InterruptionSpan,
    watch: Stopwatch,
}

/// Tracks at most one open interruption.
#[derive(Debug)]
pub struct InterruptionTracker<S, C = SystemClock> {
    store: S,
    clock: C,
    settings: TimerSettings,
    open: Option<OpenInterruption>,
}

impl<S: RecoveryStore, C: Clock> InterruptionTracker<S, C> {
    pub fn new(store: S, clock: C, settings: TimerSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            open: None,
        }
    }

    pub fn active(&self) -> Option<&InterruptionSpan> {
        self.open.as_ref().map(|o| &o.span)
    }

    pub fn is_active(&self) -> bool {
        self.open.is_some()
    }

    /// Monotonic length of the open interruption, 0 when none is open.
    pub fn elapsed_ms(&self) -> u64 {
        self.open
            .as_ref()
            .map_or(0, |o| o.watch.elapsed_ms(self.clock.monotonic_now()))
    }

    /// Open an interruption. `None` if one is already open.
    pub fn start(&mut self, reason: Option<String>, task_id: Option<String>) -> Option<Event> {
        if let Some(open) = &self.open {
            tracing::debug!(id = %open.span.id, "interruption already open");
            return None;
        }
        let span = InterruptionSpan::open(reason, task_id, self.clock.wall_now());
        let event = Event::InterruptionStarted {
            id: span.id.clone(),
            reason: span.reason.clone(),
            task_id: span.task_id.clone(),
            at: span.started_at_wall_clock,
        };
        tracing::info!(id = %span.id, reason = ?span.reason, "interruption started");
        self.open = Some(OpenInterruption {
            span,
            watch: Stopwatch::start_at(self.clock.monotonic_now(), 0),
        });
        self.persist();
        Some(event)
    }

    /// Close the open interruption and return it. The end instant is the
    /// start plus the measured length, so the span's wall-clock duration
    /// matches what was counted.
    pub fn end(&mut self) -> Option<InterruptionSpan> {
        let OpenInterruption { mut span, watch } = self.open.take()?;
        let elapsed = watch.elapsed_ms(self.clock.monotonic_now());
        let length = TimeDelta::try_milliseconds(i64::try_from(elapsed).unwrap_or(i64::MAX))
            .unwrap_or(TimeDelta::MAX);
        span.ended_at_wall_clock = Some(span.started_at_wall_clock + length);
        self.discard_record();
        tracing::info!(id = %span.id, duration_ms = elapsed, "interruption ended");
        Some(span)
    }

    pub fn on_lifecycle(&mut self, event: LifecycleEvent) -> bool {
        match event {
            LifecycleEvent::Hidden | LifecycleEvent::Teardown => {
                self.persist();
                false
            }
            LifecycleEvent::Resumed => self.reconcile_after_resume(),
        }
    }

    fn reconcile_after_resume(&mut self) -> bool {
        let mono_now = self.clock.monotonic_now();
        let wall_now = self.clock.wall_now();
        let Some(open) = self.open.as_mut() else {
            return false;
        };
        let since_start = time::millis_between(open.span.started_at_wall_clock, wall_now);
        if since_start < 0 {
            return false;
        }
        let monotonic = open.watch.elapsed_ms(mono_now);
        let Some(to) = suspended_gap(
            monotonic,
            since_start.unsigned_abs(),
            self.settings.resume_tolerance_ms,
            self.settings.limits.max_elapsed_ms,
        ) else {
            return false;
        };
        open.watch.rebase(mono_now, to);
        tracing::info!(id = %open.span.id, from_ms = monotonic, to_ms = to, "rebased interruption after suspend");
        true
    }

    /// Resume an interruption left open by a previous run.
    pub fn recover(&mut self) -> TimerRecoveryResult {
        if self.open.is_some() {
            return TimerRecoveryResult::nothing_to_recover();
        }
        let span = match load_record::<InterruptionSpan>(&self.store, INTERRUPTION_KEY) {
            Ok(Some(span)) => span,
            Ok(None) => return TimerRecoveryResult::nothing_to_recover(),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable interruption record");
                self.discard_record();
                return TimerRecoveryResult::rejected(e.to_string());
            }
        };

        let result = recovery::recover(
            &span.recovery_snapshot(),
            self.clock.wall_now(),
            self.settings.limits,
        );
        if result.success {
            tracing::info!(id = %span.id, recovered_ms = result.recovered_elapsed_ms, "recovered open interruption");
            self.open = Some(OpenInterruption {
                span,
                watch: Stopwatch::start_at(self.clock.monotonic_now(), result.recovered_elapsed_ms),
            });
        } else {
            // Rejected, or a closed span that was never cleared.
            self.discard_record();
        }
        result
    }

    pub fn recovery_event(&self, result: &TimerRecoveryResult) -> Option<Event> {
        let at = self.clock.wall_now();
        if result.success {
            let span = self.active()?;
            Some(Event::InterruptionRecovered {
                id: span.id.clone(),
                recovered_elapsed_ms: result.recovered_elapsed_ms,
                away_ms: result.away_ms,
                at,
            })
        } else if !result.is_valid {
            Some(Event::RecoveryRejected {
                key: INTERRUPTION_KEY.to_string(),
                error: result.error.clone().unwrap_or_default(),
                at,
            })
        } else {
            None
        }
    }

    fn persist(&self) {
        let Some(open) = &self.open else {
            return;
        };
        if let Err(e) = save_record(&self.store, INTERRUPTION_KEY, &open.span) {
            tracing::warn!(error = %e, "failed to persist interruption; continuing in memory");
        }
    }

    fn discard_record(&self) {
        if let Err(e) = self.store.remove(INTERRUPTION_KEY) {
            tracing::warn!(error = %e, "failed to clear interruption record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::time::ManualClock;
    use chrono::TimeZone;
    use std::time::Duration;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 10, 14, 0, 0).unwrap())
    }

    fn tracker<'a>(
        store: &'a MemoryStore,
        clock: &'a ManualClock,
    ) -> InterruptionTracker<&'a MemoryStore, &'a ManualClock> {
        InterruptionTracker::new(store, clock, TimerSettings::default())
    }

    #[test]
    fn start_and_end() {
        let store = MemoryStore::new();
        let clock = clock();
        let mut tracker = tracker(&store, &clock);
        assert!(tracker.end().is_none());

        let event = tracker.start(Some("phone".into()), Some("a".into()));
        assert!(matches!(event, Some(Event::InterruptionStarted { .. })));
        assert!(tracker.start(None, None).is_none());
        assert!(!store.is_empty());

        clock.advance(Duration::from_secs(4 * 60));
        assert_eq!(tracker.elapsed_ms(), 240_000);

        let span = tracker.end().unwrap();
        assert!(!span.is_active());
        assert_eq!(span.duration_ms(clock.wall_now()), 240_000);
        assert_eq!(span.reason.as_deref(), Some("phone"));
        assert!(store.is_empty());
        assert!(!tracker.is_active());
        assert_eq!(tracker.elapsed_ms(), 0);
    }

    #[test]
    fn end_uses_measured_length_not_wall_jumps() {
        let store = MemoryStore::new();
        let clock = clock();
        let mut tracker = tracker(&store, &clock);
        tracker.start(None, None);
        clock.advance(Duration::from_secs(60));
        clock.advance_wall(Duration::from_secs(3600));
        let span = tracker.end().unwrap();
        assert_eq!(span.duration_ms(clock.wall_now()), 60_000);
    }

    #[test]
    fn recovers_open_interruption() {
        let store = MemoryStore::new();
        let clock = clock();
        let id = {
            let mut tracker = tracker(&store, &clock);
            tracker.start(Some("doorbell".into()), None);
            tracker.active().unwrap().id.clone()
        };
        clock.advance_wall(Duration::from_secs(15 * 60));

        let mut tracker = tracker(&store, &clock);
        let result = tracker.recover();
        assert!(result.success);
        assert_eq!(result.recovered_elapsed_ms, 900_000);
        assert_eq!(tracker.active().unwrap().id, id);
        assert_eq!(tracker.elapsed_ms(), 900_000);
        assert!(matches!(
            tracker.recovery_event(&result),
            Some(Event::InterruptionRecovered { recovered_elapsed_ms: 900_000, .. })
        ));

        clock.advance(Duration::from_secs(60));
        let span = tracker.end().unwrap();
        assert_eq!(span.duration_ms(clock.wall_now()), 960_000);
    }

    #[test]
    fn closed_or_future_records_are_dropped() {
        let store = MemoryStore::new();
        let clock = clock();
        let mut closed = InterruptionSpan::open(None, None, clock.wall_now());
        closed.ended_at_wall_clock = Some(clock.wall_now());
        save_record(&store, INTERRUPTION_KEY, &closed).unwrap();

        let mut tracker = tracker(&store, &clock);
        let result = tracker.recover();
        assert!(!result.success);
        assert!(result.is_valid);
        assert!(store.is_empty());

        let future = InterruptionSpan::open(None, None, clock.wall_now() + TimeDelta::minutes(5));
        save_record(&store, INTERRUPTION_KEY, &future).unwrap();
        let result = tracker.recover();
        assert!(!result.is_valid);
        assert!(!tracker.is_active());
        assert!(store.is_empty());
        assert!(matches!(
            tracker.recovery_event(&result),
            Some(Event::RecoveryRejected { .. })
        ));
    }

    #[test]
    fn long_interruption_is_clamped() {
        let store = MemoryStore::new();
        let clock = clock();
        let span = InterruptionSpan::open(None, None, clock.wall_now() - TimeDelta::hours(30));
        save_record(&store, INTERRUPTION_KEY, &span).unwrap();

        let mut tracker = tracker(&store, &clock);
        let result = tracker.recover();
        assert!(result.success);
        assert!(result.clamped);
        assert_eq!(result.recovered_elapsed_ms, 24 * 3_600_000);
    }

    #[test]
    fn resume_rebases_on_wall_clock() {
        let store = MemoryStore::new();
        let clock = clock();
        let mut tracker = tracker(&store, &clock);
        tracker.start(None, None);
        clock.advance(Duration::from_secs(30));
        assert!(!tracker.on_lifecycle(LifecycleEvent::Resumed));

        clock.advance_wall(Duration::from_secs(600));
        assert!(tracker.on_lifecycle(LifecycleEvent::Resumed));
        assert_eq!(tracker.elapsed_ms(), 630_000);
    }
}
