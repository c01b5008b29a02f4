//! Timer engine implementation.
//!
//! The engine counts elapsed time for the active task on the monotonic clock
//! and keeps a wall-clock anchor beside it for cross-session recovery. It does
//! not use internal threads - the owner calls `tick()` periodically and
//! forwards lifecycle signals through `on_lifecycle()`.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Stopped -> Running
//! Idle -> Recovering -> (Running | Stopped | Idle)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(&db, SystemClock, settings);
//! engine.recover();            // always before start
//! engine.start(25 * 60, 0);
//! // In a loop:
//! engine.tick();               // persists on the sync interval
//! ```

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stopwatch::{suspended_gap, Stopwatch};
use crate::events::Event;
use crate::recovery::{
    self, ActiveSpan, RecoveryLimits, RecoverySnapshot, SpanStatus, TimerRecoveryResult,
};
use crate::storage::{load_record, save_record, RecoveryStore, TIMER_KEY};
use crate::time::{self, Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    /// Reading the persisted record on start-up.
    Recovering,
    Running,
    Stopped,
}

/// Countdown colour derived from remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerColor {
    Green,
    Yellow,
    Red,
}

impl TimerColor {
    pub fn for_remaining(remaining_ms: i64, warning_threshold_secs: u64) -> Self {
        let threshold_ms = i64::try_from(warning_threshold_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        if remaining_ms <= 0 {
            TimerColor::Red
        } else if remaining_ms <= threshold_ms {
            TimerColor::Yellow
        } else {
            TimerColor::Green
        }
    }
}

/// Signals from the host about the process lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    /// Lost visibility or focus. State is persisted.
    Hidden,
    /// Visible again, possibly after the machine slept.
    Resumed,
    /// About to exit. State is persisted.
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    pub warning_threshold_secs: u64,
    pub sync_interval_secs: u64,
    pub limits: RecoveryLimits,
    pub resume_tolerance_ms: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            warning_threshold_secs: 300,
            sync_interval_secs: 10,
            limits: RecoveryLimits::default(),
            resume_tolerance_ms: 2000,
        }
    }
}

/// The timer's record in the recovery store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTimer {
    pub status: SpanStatus,
    pub elapsed_ms: i64,
    pub last_sync_wall_clock: DateTime<Utc>,
    pub timer_started_at_wall_clock: DateTime<Utc>,
    pub planned_duration_secs: u64,
    #[serde(default)]
    pub task_id: Option<String>,
}

impl ActiveSpan for PersistedTimer {
    fn recovery_snapshot(&self) -> RecoverySnapshot {
        RecoverySnapshot {
            status: self.status,
            elapsed_ms: self.elapsed_ms,
            last_sync_wall_clock: self.last_sync_wall_clock,
        }
    }
}

/// Read-only view of the engine for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRuntimeState {
    pub elapsed_ms: u64,
    pub is_running: bool,
    pub timer_started_at_wall_clock: Option<DateTime<Utc>>,
    pub last_sync_wall_clock: Option<DateTime<Utc>>,
}

/// Core timer engine.
///
/// Owns its store handle and clock; share one store between engines with
/// `&Database` or `Rc<MemoryStore>`.
#[derive(Debug)]
pub struct TimerEngine<S, C = SystemClock> {
    store: S,
    clock: C,
    settings: TimerSettings,
    state: TimerState,
    task_id: Option<String>,
    planned_duration_secs: u64,
    /// Present while running.
    watch: Option<Stopwatch>,
    /// Elapsed time while not running.
    stopped_elapsed_ms: u64,
    timer_started_at_wall_clock: Option<DateTime<Utc>>,
    stopped_at_wall_clock: Option<DateTime<Utc>>,
    last_sync_wall_clock: Option<DateTime<Utc>>,
    /// Elapsed time written by the last successful sync.
    last_sync_elapsed_ms: u64,
    last_sync_attempt: Option<Instant>,
    overtime_announced: bool,
}

impl<S: RecoveryStore, C: Clock> TimerEngine<S, C> {
    pub fn new(store: S, clock: C, settings: TimerSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            state: TimerState::Idle,
            task_id: None,
            planned_duration_secs: 0,
            watch: None,
            stopped_elapsed_ms: 0,
            timer_started_at_wall_clock: None,
            stopped_at_wall_clock: None,
            last_sync_wall_clock: None,
            last_sync_elapsed_ms: 0,
            last_sync_attempt: None,
            overtime_announced: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.watch.is_some()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn planned_duration_secs(&self) -> u64 {
        self.planned_duration_secs
    }

    pub fn timer_started_at_wall_clock(&self) -> Option<DateTime<Utc>> {
        self.timer_started_at_wall_clock
    }

    pub fn stopped_at_wall_clock(&self) -> Option<DateTime<Utc>> {
        self.stopped_at_wall_clock
    }

    pub fn elapsed_ms(&self) -> u64 {
        match &self.watch {
            Some(watch) => watch.elapsed_ms(self.clock.monotonic_now()),
            None => self.stopped_elapsed_ms,
        }
    }

    /// Planned minus elapsed. Negative in overtime.
    pub fn remaining_ms(&self) -> i64 {
        let planned = i64::try_from(self.planned_duration_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        let elapsed = i64::try_from(self.elapsed_ms()).unwrap_or(i64::MAX);
        planned.saturating_sub(elapsed)
    }

    pub fn color(&self) -> TimerColor {
        TimerColor::for_remaining(self.remaining_ms(), self.settings.warning_threshold_secs)
    }

    pub fn runtime_state(&self) -> TimerRuntimeState {
        TimerRuntimeState {
            elapsed_ms: self.elapsed_ms(),
            is_running: self.is_running(),
            timer_started_at_wall_clock: self.timer_started_at_wall_clock,
            last_sync_wall_clock: self.last_sync_wall_clock,
        }
    }

    /// A periodic sync is owed.
    pub fn sync_due(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        let interval = Duration::from_secs(self.settings.sync_interval_secs);
        self.last_sync_attempt.map_or(true, |at| {
            self.clock.monotonic_now().saturating_duration_since(at) >= interval
        })
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            state: self.state,
            task_id: self.task_id.clone(),
            planned_duration_secs: self.planned_duration_secs,
            elapsed_ms: self.elapsed_ms(),
            remaining_ms: self.remaining_ms(),
            color: self.color(),
            at: self.clock.wall_now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start (or restart) counting for an unnamed task.
    pub fn start(&mut self, planned_duration_secs: u64, resume_from_ms: u64) -> Event {
        self.begin(None, planned_duration_secs, resume_from_ms)
    }

    pub fn start_task(
        &mut self,
        task_id: impl Into<String>,
        planned_duration_secs: u64,
        resume_from_ms: u64,
    ) -> Event {
        self.begin(Some(task_id.into()), planned_duration_secs, resume_from_ms)
    }

    fn begin(
        &mut self,
        task_id: Option<String>,
        planned_duration_secs: u64,
        resume_from_ms: u64,
    ) -> Event {
        if self.is_running() {
            tracing::info!(previous = ?self.task_id, next = ?task_id, "restarting running timer");
        }
        let wall = self.clock.wall_now();
        self.watch = Some(Stopwatch::start_at(self.clock.monotonic_now(), resume_from_ms));
        self.state = TimerState::Running;
        self.task_id = task_id;
        self.planned_duration_secs = planned_duration_secs;
        self.stopped_elapsed_ms = 0;
        self.stopped_at_wall_clock = None;
        self.timer_started_at_wall_clock = Some(wall);
        self.overtime_announced = false;
        self.persist(SpanStatus::Active);

        Event::TimerStarted {
            task_id: self.task_id.clone(),
            planned_duration_secs,
            resume_from_ms,
            at: wall,
        }
    }

    /// Stop counting and return the final elapsed time. Stopping a timer
    /// that is not running returns the last value unchanged.
    pub fn stop(&mut self) -> u64 {
        let Some(watch) = self.watch.take() else {
            return self.stopped_elapsed_ms;
        };
        let elapsed = watch.elapsed_ms(self.clock.monotonic_now());
        self.stopped_elapsed_ms = elapsed;
        self.stopped_at_wall_clock = Some(self.clock.wall_now());
        self.state = TimerState::Stopped;
        self.persist(SpanStatus::Inactive);
        tracing::info!(task_id = ?self.task_id, elapsed_ms = elapsed, "timer stopped");
        elapsed
    }

    /// `TimerStopped` for the last stop, if the timer is stopped.
    pub fn stopped_event(&self) -> Option<Event> {
        if self.state != TimerState::Stopped {
            return None;
        }
        Some(Event::TimerStopped {
            task_id: self.task_id.clone(),
            planned_duration_secs: self.planned_duration_secs,
            elapsed_ms: self.stopped_elapsed_ms,
            at: self.stopped_at_wall_clock.unwrap_or_else(|| self.clock.wall_now()),
        })
    }

    /// Forget everything, including the persisted record.
    pub fn reset(&mut self) {
        self.watch = None;
        self.state = TimerState::Idle;
        self.task_id = None;
        self.planned_duration_secs = 0;
        self.stopped_elapsed_ms = 0;
        self.timer_started_at_wall_clock = None;
        self.stopped_at_wall_clock = None;
        self.last_sync_wall_clock = None;
        self.last_sync_elapsed_ms = 0;
        self.last_sync_attempt = None;
        self.discard_record();
    }

    /// Persist if the sync interval has passed, and report the first
    /// crossing into overtime.
    pub fn tick(&mut self) -> Option<Event> {
        if !self.is_running() {
            return None;
        }
        if self.sync_due() {
            self.sync();
        }
        if !self.overtime_announced && self.remaining_ms() <= 0 {
            self.overtime_announced = true;
            tracing::info!(task_id = ?self.task_id, "timer entered overtime");
            return Some(Event::TimerOvertime {
                task_id: self.task_id.clone(),
                planned_duration_secs: self.planned_duration_secs,
                at: self.clock.wall_now(),
            });
        }
        None
    }

    /// Write the current elapsed time now. Returns whether the write
    /// succeeded; failures are logged and otherwise ignored.
    pub fn sync(&mut self) -> bool {
        self.is_running() && self.persist(SpanStatus::Active)
    }

    pub fn on_lifecycle(&mut self, event: LifecycleEvent) -> Option<Event> {
        tracing::debug!(?event, state = ?self.state, "lifecycle signal");
        match event {
            LifecycleEvent::Hidden | LifecycleEvent::Teardown => {
                self.sync();
                None
            }
            LifecycleEvent::Resumed => self.reconcile_after_resume(),
        }
    }

    /// The monotonic clock may not advance while the machine sleeps. Move
    /// elapsed forward to the wall-clock estimate when it is clearly ahead.
    fn reconcile_after_resume(&mut self) -> Option<Event> {
        if !self.is_running() {
            return None;
        }
        let wall = self.clock.wall_now();
        let gap = time::millis_between(self.last_sync_wall_clock?, wall);
        if gap < 0 {
            tracing::debug!(gap_ms = gap, "wall clock moved backwards; keeping monotonic time");
            return None;
        }
        let monotonic = self.elapsed_ms();
        let estimate = self.last_sync_elapsed_ms.saturating_add(gap.unsigned_abs());
        let to = suspended_gap(
            monotonic,
            estimate,
            self.settings.resume_tolerance_ms,
            self.settings.limits.max_elapsed_ms,
        )?;

        let now = self.clock.monotonic_now();
        if let Some(watch) = self.watch.as_mut() {
            watch.rebase(now, to);
        }
        tracing::info!(from_ms = monotonic, to_ms = to, "rebased timer after suspend");
        self.sync();
        Some(Event::TimerRebased {
            from_ms: monotonic,
            to_ms: to,
            at: wall,
        })
    }

    /// Resume from the persisted record. Call once, before the first
    /// `start`. A running timer is left alone.
    pub fn recover(&mut self) -> TimerRecoveryResult {
        if self.is_running() {
            tracing::warn!("recover called on a running timer; ignoring");
            return TimerRecoveryResult::nothing_to_recover();
        }
        self.state = TimerState::Recovering;

        let record = match load_record::<PersistedTimer>(&self.store, TIMER_KEY) {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.state = TimerState::Idle;
                return TimerRecoveryResult::nothing_to_recover();
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable timer record");
                self.discard_record();
                self.state = TimerState::Idle;
                return TimerRecoveryResult::rejected(e.to_string());
            }
        };

        let result = recovery::recover(
            &record.recovery_snapshot(),
            self.clock.wall_now(),
            self.settings.limits,
        );

        if result.success {
            tracing::info!(
                task_id = ?record.task_id,
                recovered_ms = result.recovered_elapsed_ms,
                away_ms = result.away_ms,
                "recovered running timer"
            );
            self.begin(
                record.task_id,
                record.planned_duration_secs,
                result.recovered_elapsed_ms,
            );
        } else if !result.is_valid {
            self.discard_record();
            self.state = TimerState::Idle;
        } else {
            // Last write was a stop: show the finished timer.
            self.task_id = record.task_id;
            self.planned_duration_secs = record.planned_duration_secs;
            self.stopped_elapsed_ms = record.elapsed_ms.max(0).unsigned_abs();
            self.timer_started_at_wall_clock = Some(record.timer_started_at_wall_clock);
            self.stopped_at_wall_clock = Some(record.last_sync_wall_clock);
            self.last_sync_wall_clock = Some(record.last_sync_wall_clock);
            self.state = TimerState::Stopped;
        }
        result
    }

    /// Event describing a recovery outcome, if there is anything to report.
    pub fn recovery_event(&self, result: &TimerRecoveryResult) -> Option<Event> {
        let at = self.clock.wall_now();
        if result.success {
            Some(Event::TimerRecovered {
                task_id: self.task_id.clone(),
                recovered_elapsed_ms: result.recovered_elapsed_ms,
                away_ms: result.away_ms,
                clamped: result.clamped,
                at,
            })
        } else if !result.is_valid {
            Some(Event::RecoveryRejected {
                key: TIMER_KEY.to_string(),
                error: result.error.clone().unwrap_or_default(),
                at,
            })
        } else {
            None
        }
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn persist(&mut self, status: SpanStatus) -> bool {
        let wall = self.clock.wall_now();
        let elapsed = self.elapsed_ms();
        self.last_sync_attempt = Some(self.clock.monotonic_now());

        let record = PersistedTimer {
            status,
            elapsed_ms: i64::try_from(elapsed).unwrap_or(i64::MAX),
            last_sync_wall_clock: wall,
            timer_started_at_wall_clock: self.timer_started_at_wall_clock.unwrap_or(wall),
            planned_duration_secs: self.planned_duration_secs,
            task_id: self.task_id.clone(),
        };
        match save_record(&self.store, TIMER_KEY, &record) {
            Ok(()) => {
                self.last_sync_wall_clock = Some(wall);
                self.last_sync_elapsed_ms = elapsed;
                tracing::debug!(elapsed_ms = elapsed, ?status, "timer synced");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist timer; continuing in memory");
                false
            }
        }
    }

    fn discard_record(&self) {
        if let Err(e) = self.store.remove(TIMER_KEY) {
            tracing::warn!(error = %e, "failed to clear timer record");
        }
    }
}
