//! Integration tests for timer and interruption recovery through SQLite.
//!
//! Each test opens the database file, drops it (the "crash"), reopens it and
//! recovers, driving time with a manual clock.

use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use dayline_core::storage::{load_record, TIMER_KEY};
use dayline_core::{
    Database, InterruptionTracker, ManualClock, PersistedTimer, RecoveryStore, SpanStatus,
    TimerEngine, TimerSettings, TimerState,
};

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap())
}

#[test]
fn test_timer_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dayline.db");
    let clock = clock();

    {
        let db = Database::open_at(&path).unwrap();
        let mut timer = TimerEngine::new(&db, &clock, TimerSettings::default());
        assert!(!timer.recover().success);
        timer.start_task("report", 3600, 0);
        clock.advance(Duration::from_secs(20 * 60));
        timer.tick();
    }
    clock.advance_wall(Duration::from_secs(10 * 60));

    let db = Database::open_at(&path).unwrap();
    let record: PersistedTimer = load_record(&db, TIMER_KEY).unwrap().unwrap();
    assert_eq!(record.status, SpanStatus::Active);
    assert_eq!(record.elapsed_ms, 1_200_000);

    let mut timer = TimerEngine::new(&db, &clock, TimerSettings::default());
    let result = timer.recover();
    assert!(result.success);
    assert_eq!(result.recovered_elapsed_ms, 1_800_000);
    assert_eq!(timer.state(), TimerState::Running);
    assert_eq!(timer.task_id(), Some("report"));

    clock.advance(Duration::from_secs(60));
    assert_eq!(timer.stop(), 1_860_000);
}

#[test]
fn test_clamped_recovery_after_long_absence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dayline.db");
    let clock = clock();

    {
        let db = Database::open_at(&path).unwrap();
        let mut timer = TimerEngine::new(&db, &clock, TimerSettings::default());
        timer.start(1500, 0);
    }
    clock.advance_wall(Duration::from_secs(3 * 24 * 3600));

    let db = Database::open_at(&path).unwrap();
    let mut timer = TimerEngine::new(&db, &clock, TimerSettings::default());
    let result = timer.recover();
    assert!(result.success);
    assert!(result.clamped);
    assert_eq!(result.recovered_elapsed_ms, 24 * 3_600_000);
}

#[test]
fn test_clock_set_back_resets_timer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dayline.db");
    let clock = clock();

    {
        let db = Database::open_at(&path).unwrap();
        let mut timer = TimerEngine::new(&db, &clock, TimerSettings::default());
        timer.start(1500, 0);
    }
    clock.set_wall(clock_start() - TimeDelta::minutes(30));

    let db = Database::open_at(&path).unwrap();
    let mut timer = TimerEngine::new(&db, &clock, TimerSettings::default());
    let result = timer.recover();
    assert!(!result.is_valid);
    assert_eq!(result.recovered_elapsed_ms, 0);
    assert_eq!(timer.state(), TimerState::Idle);
    assert!(db.load_raw(TIMER_KEY).unwrap().is_none());
}

fn clock_start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()
}

#[test]
fn test_timer_and_interruption_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dayline.db");
    let clock = clock();

    {
        let db = Database::open_at(&path).unwrap();
        let mut timer = TimerEngine::new(&db, &clock, TimerSettings::default());
        let mut interruptions = InterruptionTracker::new(&db, &clock, TimerSettings::default());
        timer.start_task("report", 3600, 0);
        clock.advance(Duration::from_secs(5 * 60));
        interruptions.start(Some("phone".into()), Some("report".into()));
        clock.advance(Duration::from_secs(2 * 60));
        timer.tick();
    }
    clock.advance_wall(Duration::from_secs(3 * 60));

    let db = Database::open_at(&path).unwrap();
    let mut timer = TimerEngine::new(&db, &clock, TimerSettings::default());
    let mut interruptions = InterruptionTracker::new(&db, &clock, TimerSettings::default());
    assert_eq!(timer.recover().recovered_elapsed_ms, 10 * 60_000);
    assert_eq!(interruptions.recover().recovered_elapsed_ms, 5 * 60_000);

    let span = interruptions.end().unwrap();
    db.record_interruption(&span).unwrap();
    let rows = db.interruptions_since(clock_start()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].duration_ms, 5 * 60_000);
    assert_eq!(rows[0].task_id.as_deref(), Some("report"));
    assert!(timer.is_running());
}
