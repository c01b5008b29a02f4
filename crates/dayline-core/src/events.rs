use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interruption::InterruptionSpan;
use crate::timer::{TimerColor, TimerState};

/// Every state change in the timer and interruption tracker produces an
/// Event. The CLI prints them; a UI would render or forward them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        task_id: Option<String>,
        planned_duration_secs: u64,
        resume_from_ms: u64,
        at: DateTime<Utc>,
    },
    TimerStopped {
        task_id: Option<String>,
        planned_duration_secs: u64,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    /// Remaining time reached zero; the timer keeps counting overtime.
    TimerOvertime {
        task_id: Option<String>,
        planned_duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// A running timer was resumed from its persisted record.
    TimerRecovered {
        task_id: Option<String>,
        recovered_elapsed_ms: u64,
        away_ms: i64,
        clamped: bool,
        at: DateTime<Utc>,
    },
    /// Elapsed time was moved forward to the wall clock after the process
    /// was suspended.
    TimerRebased {
        from_ms: u64,
        to_ms: u64,
        at: DateTime<Utc>,
    },
    /// A persisted record could not be trusted and was discarded.
    RecoveryRejected {
        key: String,
        error: String,
        at: DateTime<Utc>,
    },
    InterruptionStarted {
        id: String,
        reason: Option<String>,
        task_id: Option<String>,
        at: DateTime<Utc>,
    },
    InterruptionEnded {
        id: String,
        reason: Option<String>,
        task_id: Option<String>,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    InterruptionRecovered {
        id: String,
        recovered_elapsed_ms: u64,
        away_ms: i64,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: TimerState,
        task_id: Option<String>,
        planned_duration_secs: u64,
        elapsed_ms: u64,
        /// Negative once in overtime.
        remaining_ms: i64,
        color: TimerColor,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// `InterruptionEnded` for a closed span. `None` if the span is open.
    pub fn interruption_ended(span: &InterruptionSpan) -> Option<Self> {
        let ended = span.ended_at_wall_clock?;
        Some(Event::InterruptionEnded {
            id: span.id.clone(),
            reason: span.reason.clone(),
            task_id: span.task_id.clone(),
            duration_ms: span.duration_ms(ended),
            at: ended,
        })
    }
}
