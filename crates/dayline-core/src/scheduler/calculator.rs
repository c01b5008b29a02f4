//! Single forward pass over the task list with a running cursor.
//!
//! ## Interruptions
//!
//! When a flexible task would still be running at the planned start of the
//! next fixed task, the flexible task pauses there. The fixed task runs at
//! its planned time, followed by any fixed tasks at the immediately following
//! sequence positions that would otherwise cut into the resumed remainder.
//! The flexible task resumes when that run ends.
//!
//! ```text
//! A (flexible, 2h) from 08:30, B (fixed 09:00, 1h)
//!
//! 08:30 ── A ── 09:00 ── B ── 10:00 ──── A ──── 11:30
//!        1800s                         5400s
//! ```
//!
//! Fixed tasks placed this way are consumed: when the pass reaches their own
//! sequence position it skips them without moving the cursor.

use chrono::{DateTime, Utc};

use super::conflicts::detect_fixed_conflicts;
use super::{ScheduleConfig, ScheduleResult, ScheduledTask};
use crate::task::{Task, TaskKind};
use crate::time;

/// Place every task on the timeline.
///
/// Pure and deterministic: identical inputs give identical output. Linear in
/// the number of tasks apart from the initial sort by `sequence_index`
/// (stable, so equal indices keep input order).
pub fn calculate_schedule(
    tasks: &[Task],
    config: &ScheduleConfig,
    now: DateTime<Utc>,
) -> ScheduleResult {
    let anchor = config.anchor(now);

    let mut order: Vec<&Task> = tasks.iter().collect();
    order.sort_by_key(|t| t.sequence_index);

    // Sequence positions of fixed tasks, ascending.
    let fixed_positions: Vec<usize> = order
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_fixed())
        .map(|(pos, _)| pos)
        .collect();

    let mut placed: Vec<Option<ScheduledTask>> = vec![None; order.len()];
    let mut next_fixed = 0usize;
    let mut cursor = anchor;

    for pos in 0..order.len() {
        if placed[pos].is_some() {
            continue;
        }
        let task = order[pos];

        match task.kind {
            TaskKind::Fixed { planned_start } => {
                let scheduled = ScheduledTask::contiguous(task, cursor.max(planned_start));
                cursor = scheduled.calculated_end;
                placed[pos] = Some(scheduled);
            }
            TaskKind::Flexible => {
                while fixed_positions
                    .get(next_fixed)
                    .is_some_and(|&fp| placed[fp].is_some())
                {
                    next_fixed += 1;
                }

                let naive_end = time::add_secs(cursor, task.duration_seconds);
                let interrupter = fixed_positions
                    .get(next_fixed)
                    .copied()
                    .filter(|_| task.duration_seconds > 0)
                    .filter(|&fp| starts_before(order[fp], naive_end));

                let scheduled = match interrupter {
                    None => ScheduledTask::contiguous(task, cursor),
                    Some(_) => {
                        let (scheduled, consumed) = split_around_fixed_run(
                            task,
                            cursor,
                            &order,
                            &fixed_positions[next_fixed..],
                            &mut placed,
                        );
                        next_fixed += consumed;
                        scheduled
                    }
                };
                cursor = scheduled.calculated_end;
                placed[pos] = Some(scheduled);
            }
        }
    }

    let scheduled: Vec<ScheduledTask> = placed.into_iter().flatten().collect();

    let schedule_end = scheduled
        .iter()
        .map(|t| t.calculated_end)
        .max()
        .unwrap_or(anchor);
    let has_overflow = schedule_end > time::next_local_midnight(anchor, config.offset());
    let conflicts = detect_fixed_conflicts(tasks, config.offset());

    tracing::debug!(
        tasks = scheduled.len(),
        conflicts = conflicts.len(),
        has_overflow,
        "schedule calculated"
    );

    ScheduleResult {
        tasks: scheduled,
        schedule_start: anchor,
        schedule_end,
        has_overflow,
        conflicts,
    }
}

fn starts_before(task: &Task, instant: DateTime<Utc>) -> bool {
    task.planned_start().is_some_and(|start| start < instant)
}

/// Pause `task` at the first fixed task in `run`, place the fixed run, and
/// resume after it. Returns the interrupted task and how many entries of
/// `run` were placed.
fn split_around_fixed_run(
    task: &Task,
    start: DateTime<Utc>,
    order: &[&Task],
    run: &[usize],
    placed: &mut [Option<ScheduledTask>],
) -> (ScheduledTask, usize) {
    let first = order[run[0]];
    // A fixed task that is already overdue takes over immediately.
    let pause = first.planned_start().map_or(start, |p| p.max(start));
    let seconds_before_pause = ((pause - start).num_seconds().max(0) as u64).min(task.duration_seconds);
    let seconds_remaining_after_pause = task.duration_seconds - seconds_before_pause;

    let mut run_end = pause;
    let mut consumed = 0;
    for (i, &fp) in run.iter().enumerate() {
        if i > 0 {
            let contiguous = fp == run[i - 1] + 1;
            let cuts_remainder =
                starts_before(order[fp], time::add_secs(run_end, seconds_remaining_after_pause));
            if !(contiguous && cuts_remainder) {
                break;
            }
        }
        let fixed = order[fp];
        let fixed_start = fixed.planned_start().map_or(run_end, |p| p.max(run_end));
        let scheduled = ScheduledTask::contiguous(fixed, fixed_start);
        run_end = scheduled.calculated_end;
        placed[fp] = Some(scheduled);
        consumed += 1;
    }

    let scheduled = ScheduledTask {
        task: task.clone(),
        calculated_start: start,
        calculated_end: time::add_secs(run_end, seconds_remaining_after_pause),
        is_interrupted: true,
        pause_instant: Some(pause),
        resume_instant: Some(run_end),
        seconds_before_pause,
        seconds_remaining_after_pause,
    };
    (scheduled, consumed)
}
