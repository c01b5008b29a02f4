use chrono::{TimeDelta, Utc};
use clap::Subcommand;
use dayline_core::storage::RecoveryStore;
use dayline_core::time::{self, Clock};
use dayline_core::{Config, Database, Event, LifecycleEvent, TimerEngine};

use super::{print_json, since_days, CmdResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start timing a task (restarts a running timer)
    Start {
        /// Planned duration, e.g. "25m", "1h30m", "1:30:00"; a bare number is minutes
        #[arg(long)]
        duration: String,
        /// Task ID to attach the timing to
        #[arg(long)]
        task: Option<String>,
        /// Time already spent on the task
        #[arg(long)]
        resume_from: Option<String>,
    },
    /// Print current timer state as JSON
    Status,
    /// Stop the timer and record the session
    Stop,
    /// List recorded sessions
    Log {
        /// Number of days to include, counting today
        #[arg(long, default_value = "1")]
        days: u32,
    },
}

/// Stop a running timer and write its history row.
fn stop_and_record<S: RecoveryStore, C: Clock>(
    db: &Database,
    engine: &mut TimerEngine<S, C>,
) -> Result<Option<Event>, Box<dyn std::error::Error>> {
    if !engine.is_running() {
        return Ok(None);
    }
    let elapsed_ms = engine.stop();
    let stopped_at = engine.stopped_at_wall_clock().unwrap_or_else(Utc::now);
    // Effective start; a recovered timer's anchor is the recovery instant.
    let started_at = stopped_at
        - TimeDelta::try_milliseconds(i64::try_from(elapsed_ms)?).unwrap_or(TimeDelta::zero());
    db.record_task_session(
        engine.task_id(),
        engine.planned_duration_secs(),
        elapsed_ms,
        started_at,
        stopped_at,
    )?;
    Ok(engine.stopped_event())
}

pub fn run(action: TimerAction) -> CmdResult {
    let config = Config::load_or_default();
    let db = Database::open()?;
    let mut engine = TimerEngine::new(&db, time::SystemClock, config.timer.settings());

    let recovery = engine.recover();
    if let Some(event) = engine.recovery_event(&recovery) {
        tracing::info!(?event, "timer recovery");
    }

    match action {
        TimerAction::Start {
            duration,
            task,
            resume_from,
        } => {
            let planned = time::parse_duration(&duration)?;
            let resume_from_ms = resume_from
                .as_deref()
                .map(time::parse_duration)
                .transpose()?
                .unwrap_or(0)
                .saturating_mul(1000);
            if let Some(event) = stop_and_record(&db, &mut engine)? {
                tracing::info!(?event, "stopped previous timer");
            }
            let event = match task {
                Some(id) => engine.start_task(id, planned, resume_from_ms),
                None => engine.start(planned, resume_from_ms),
            };
            print_json(&event)?;
        }
        TimerAction::Status => {
            let overtime = engine.tick();
            print_json(&engine.snapshot())?;
            if let Some(event) = overtime {
                print_json(&event)?;
            }
        }
        TimerAction::Stop => match stop_and_record(&db, &mut engine)? {
            Some(event) => print_json(&event)?,
            None => {
                eprintln!("no timer running");
                print_json(&engine.snapshot())?;
            }
        },
        TimerAction::Log { days } => {
            let offset = time::offset_from_minutes(config.utc_offset_minutes())
                .unwrap_or_else(time::local_offset);
            let sessions = db.task_sessions_since(since_days(days, Utc::now(), offset))?;
            print_json(&sessions)?;
        }
    }

    engine.on_lifecycle(LifecycleEvent::Teardown);
    Ok(())
}
