//! Day schedule calculation.
//!
//! Turns an ordered task list plus a start time into concrete start/end
//! times:
//! - Flexible tasks run back to back in sequence order
//! - Fixed tasks start at their planned time, or late if the day overran
//! - A flexible task that would run into a fixed task is split around it
//! - The schedule is flagged when it runs past local midnight
//! - Overlapping fixed tasks are reported as conflicts
//!
//! [`calculate_schedule`] is a pure function. Callers recompute after every
//! edit (debouncing is their business) and treat the result as a snapshot.

mod calculator;
mod conflicts;

pub use calculator::calculate_schedule;
pub use conflicts::detect_fixed_conflicts;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::task::Task;
use crate::time;

/// Where the schedule is anchored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Anchor at the `now` passed to the calculator.
    #[default]
    StartNow,
    /// Anchor at `ScheduleConfig::custom_start`.
    CustomStart,
}

/// Per-plan schedule settings, owned by the caller and read on every
/// recompute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub mode: ScheduleMode,
    /// Required iff `mode` is `CustomStart`.
    #[serde(default)]
    pub custom_start: Option<DateTime<Utc>>,
    /// Offset used to decide where "midnight" is.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl ScheduleConfig {
    pub fn start_now() -> Self {
        Self::default()
    }

    pub fn custom(start: DateTime<Utc>) -> Self {
        Self {
            mode: ScheduleMode::CustomStart,
            custom_start: Some(start),
            utc_offset_minutes: 0,
        }
    }

    pub fn with_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Reject `CustomStart` without a start and out-of-range offsets.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.mode == ScheduleMode::CustomStart && self.custom_start.is_none() {
            return Err(ValidationError::MissingCustomStart);
        }
        if time::offset_from_minutes(self.utc_offset_minutes).is_none() {
            return Err(ValidationError::InvalidValue {
                field: "utc_offset_minutes".into(),
                message: format!("{} is not a valid UTC offset", self.utc_offset_minutes),
            });
        }
        Ok(())
    }

    /// The instant the first task starts at.
    ///
    /// An unvalidated `CustomStart` without a start falls back to `now`.
    pub fn anchor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match (self.mode, self.custom_start) {
            (ScheduleMode::CustomStart, Some(start)) => start,
            _ => now,
        }
    }

    pub fn offset(&self) -> FixedOffset {
        time::offset_from_minutes(self.utc_offset_minutes).unwrap_or_else(|| Utc.fix())
    }
}

/// One task placed on the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task: Task,
    pub calculated_start: DateTime<Utc>,
    /// For an interrupted task this is when the resumed remainder ends.
    pub calculated_end: DateTime<Utc>,
    pub is_interrupted: bool,
    /// When the interrupting fixed task begins.
    pub pause_instant: Option<DateTime<Utc>>,
    /// When work resumes after the interrupting fixed task(s).
    pub resume_instant: Option<DateTime<Utc>>,
    pub seconds_before_pause: u64,
    pub seconds_remaining_after_pause: u64,
}

impl ScheduledTask {
    pub(crate) fn contiguous(task: &Task, start: DateTime<Utc>) -> Self {
        Self {
            task: task.clone(),
            calculated_start: start,
            calculated_end: time::add_secs(start, task.duration_seconds),
            is_interrupted: false,
            pause_instant: None,
            resume_instant: None,
            seconds_before_pause: 0,
            seconds_remaining_after_pause: 0,
        }
    }

    /// Seconds a fixed task starts after its planned start. Always 0 for
    /// flexible tasks.
    pub fn delay_seconds(&self) -> u64 {
        self.task
            .planned_start()
            .map(|planned| (self.calculated_start - planned).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    pub fn is_late(&self) -> bool {
        self.delay_seconds() > 0
    }
}

/// Two fixed tasks whose planned intervals overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedTaskConflict {
    /// The task that starts first.
    pub first_task_id: String,
    pub second_task_id: String,
    pub overlap_seconds: u64,
    pub message: String,
}

/// Output of one calculation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleResult {
    /// In sequence order.
    pub tasks: Vec<ScheduledTask>,
    pub schedule_start: DateTime<Utc>,
    pub schedule_end: DateTime<Utc>,
    /// The schedule ends after the first local midnight following its start.
    pub has_overflow: bool,
    pub conflicts: Vec<FixedTaskConflict>,
}

impl ScheduleResult {
    pub fn get(&self, task_id: &str) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|t| t.task.id == task_id)
    }

    pub fn total_planned_seconds(&self) -> u64 {
        self.tasks
            .iter()
            .fold(0u64, |total, t| total.saturating_add(t.task.duration_seconds))
    }

    /// Fixed tasks that start after their planned time.
    pub fn late_fixed_tasks(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks.iter().filter(|t| t.is_late())
    }
}
