//! Fixed-task conflict detection.
//!
//! Only fixed tasks can conflict; flexible tasks yield by construction. A
//! fixed task that merely starts late because the day overran is not a
//! conflict either, callers read that from [`ScheduledTask::delay_seconds`].
//!
//! [`ScheduledTask::delay_seconds`]: super::ScheduledTask::delay_seconds

use chrono::FixedOffset;

use super::FixedTaskConflict;
use crate::task::Task;
use crate::time;

/// Compare fixed tasks pairwise in planned-start order and report each
/// adjacent pair whose `[start, start + duration)` intervals overlap.
///
/// Tasks with equal planned starts keep their input order.
pub fn detect_fixed_conflicts(tasks: &[Task], offset: FixedOffset) -> Vec<FixedTaskConflict> {
    let mut fixed: Vec<&Task> = tasks.iter().filter(|t| t.is_fixed()).collect();
    fixed.sort_by_key(|t| t.planned_start());

    fixed
        .windows(2)
        .filter_map(|pair| conflict_between(pair[0], pair[1], offset))
        .collect()
}

fn conflict_between(first: &Task, second: &Task, offset: FixedOffset) -> Option<FixedTaskConflict> {
    let (first_start, first_end) = (first.planned_start()?, first.planned_end()?);
    let (second_start, second_end) = (second.planned_start()?, second.planned_end()?);

    let overlap = (first_end.min(second_end) - second_start).num_seconds();
    if overlap <= 0 {
        return None;
    }
    let overlap_seconds = overlap as u64;

    let message = format!(
        "\"{}\" ({}-{}) overlaps \"{}\" ({}-{}) by {}",
        first.name,
        time::format_clock(first_start, offset),
        time::format_clock(first_end, offset),
        second.name,
        time::format_clock(second_start, offset),
        time::format_clock(second_end, offset),
        time::format_duration(overlap_seconds),
    );

    Some(FixedTaskConflict {
        first_task_id: first.id.clone(),
        second_task_id: second.id.clone(),
        overlap_seconds,
        message,
    })
}
