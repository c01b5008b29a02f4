//! Property tests for the schedule calculator and recovery.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use dayline_core::recovery::{recover, RecoveryLimits, RecoverySnapshot, SpanStatus};
use dayline_core::{calculate_schedule, ScheduleConfig, Task};
use proptest::prelude::*;

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()
}

/// (is_fixed, duration, minutes after the anchor for fixed tasks)
fn task_specs() -> impl Strategy<Value = Vec<(bool, u64, i64)>> {
    prop::collection::vec((any::<bool>(), 0u64..4 * 3600, 0i64..16 * 60), 0..12)
}

fn build(specs: &[(bool, u64, i64)]) -> Vec<Task> {
    specs
        .iter()
        .enumerate()
        .map(|(i, &(fixed, duration, offset_min))| {
            let id = format!("t{i}");
            if fixed {
                Task::fixed(id, "fixed", anchor() + TimeDelta::minutes(offset_min), duration, i as u32)
            } else {
                Task::flexible(id, "flexible", duration, i as u32)
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn flexible_tasks_run_back_to_back(durations in prop::collection::vec(0u64..10 * 3600, 0..20)) {
        let tasks: Vec<Task> = durations
            .iter()
            .enumerate()
            .map(|(i, &d)| Task::flexible(format!("t{i}"), "task", d, i as u32))
            .collect();
        let result = calculate_schedule(&tasks, &ScheduleConfig::custom(anchor()), anchor());

        if let Some(first) = result.tasks.first() {
            prop_assert_eq!(first.calculated_start, anchor());
        }
        for pair in result.tasks.windows(2) {
            prop_assert_eq!(pair[1].calculated_start, pair[0].calculated_end);
        }
        prop_assert!(result.tasks.iter().all(|t| !t.is_interrupted));
    }

    #[test]
    fn interrupted_tasks_conserve_duration(specs in task_specs()) {
        let tasks = build(&specs);
        let result = calculate_schedule(&tasks, &ScheduleConfig::custom(anchor()), anchor());
        prop_assert_eq!(result.tasks.len(), tasks.len());
        for scheduled in result.tasks.iter().filter(|t| t.is_interrupted) {
            prop_assert_eq!(
                scheduled.seconds_before_pause + scheduled.seconds_remaining_after_pause,
                scheduled.task.duration_seconds
            );
        }
    }

    #[test]
    fn calculation_is_idempotent(specs in task_specs()) {
        let tasks = build(&specs);
        let config = ScheduleConfig::custom(anchor());
        prop_assert_eq!(
            calculate_schedule(&tasks, &config, anchor()),
            calculate_schedule(&tasks, &config, anchor())
        );
    }

    #[test]
    fn lone_fixed_task_never_moves(
        before in prop::collection::vec(0u64..6 * 3600, 0..6),
        after in prop::collection::vec(0u64..6 * 3600, 0..6),
        fixed_offset_min in 0i64..12 * 60,
    ) {
        let planned = anchor() + TimeDelta::minutes(fixed_offset_min);
        let mut tasks = Vec::new();
        for &d in &before {
            tasks.push(Task::flexible(format!("b{}", tasks.len()), "before", d, tasks.len() as u32));
        }
        tasks.push(Task::fixed("fixed", "fixed", planned, 1800, tasks.len() as u32));
        for &d in &after {
            tasks.push(Task::flexible(format!("a{}", tasks.len()), "after", d, tasks.len() as u32));
        }

        let result = calculate_schedule(&tasks, &ScheduleConfig::custom(anchor()), anchor());
        let fixed = result.get("fixed").unwrap();
        prop_assert_eq!(fixed.calculated_start, planned);
        prop_assert_eq!(fixed.delay_seconds(), 0);
    }

    #[test]
    fn resizing_a_flexible_task_keeps_fixed_tasks_in_place(
        specs in task_specs(),
        pick in any::<prop::sample::Index>(),
        extra in 1u64..4 * 3600,
    ) {
        let flexible: Vec<usize> = specs
            .iter()
            .enumerate()
            .filter(|(_, spec)| !spec.0)
            .map(|(i, _)| i)
            .collect();
        prop_assume!(!flexible.is_empty());
        let resized = flexible[pick.index(flexible.len())];

        let config = ScheduleConfig::custom(anchor());
        let before = calculate_schedule(&build(&specs), &config, anchor());
        let mut grown = specs.clone();
        grown[resized].1 += extra;
        let after = calculate_schedule(&build(&grown), &config, anchor());

        for (i, spec) in specs.iter().enumerate().filter(|(_, spec)| spec.0) {
            let id = format!("t{i}");
            let old = before.get(&id).unwrap();
            let new = after.get(&id).unwrap();
            if i < resized {
                // Nothing later in the sequence moves an earlier fixed task.
                prop_assert_eq!(new.calculated_start, old.calculated_start);
            }
            if old.delay_seconds() == 0 && new.delay_seconds() == 0 {
                prop_assert_eq!(new.calculated_start, old.calculated_start);
            }
            prop_assert!(new.calculated_start >= anchor() + TimeDelta::minutes(spec.2));
        }
    }

    #[test]
    fn recovery_adds_the_gap(elapsed in 0i64..12 * 3_600_000, gap in 0i64..12 * 3_600_000) {
        let last_sync = anchor();
        let snapshot = RecoverySnapshot {
            status: SpanStatus::Active,
            elapsed_ms: elapsed,
            last_sync_wall_clock: last_sync,
        };
        let result = recover(&snapshot, last_sync + TimeDelta::milliseconds(gap), RecoveryLimits::default());
        prop_assert!(result.success);
        prop_assert_eq!(result.recovered_elapsed_ms, (elapsed + gap) as u64);
        prop_assert!(!result.clamped);
    }

    #[test]
    fn recovery_never_goes_negative(elapsed in any::<i64>(), behind_ms in 1i64..48 * 3_600_000) {
        let last_sync = anchor();
        let snapshot = RecoverySnapshot {
            status: SpanStatus::Active,
            elapsed_ms: elapsed,
            last_sync_wall_clock: last_sync,
        };
        let result = recover(&snapshot, last_sync - TimeDelta::milliseconds(behind_ms), RecoveryLimits::default());
        prop_assert!(!result.is_valid);
        prop_assert!(!result.success);
        prop_assert_eq!(result.recovered_elapsed_ms, 0);
    }

    #[test]
    fn recovery_stays_within_bounds(elapsed in any::<i64>(), gap in 0i64..72 * 3_600_000) {
        let limits = RecoveryLimits::default();
        let snapshot = RecoverySnapshot {
            status: SpanStatus::Active,
            elapsed_ms: elapsed,
            last_sync_wall_clock: anchor(),
        };
        let result = recover(&snapshot, anchor() + TimeDelta::milliseconds(gap), limits);
        prop_assert!(result.is_valid);
        prop_assert!(result.recovered_elapsed_ms <= limits.max_elapsed_ms);
    }
}
