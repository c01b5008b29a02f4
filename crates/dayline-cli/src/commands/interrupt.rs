use chrono::Utc;
use clap::Subcommand;
use dayline_core::recovery::SpanStatus;
use dayline_core::storage::{load_record, TIMER_KEY};
use dayline_core::time;
use dayline_core::{Config, Database, Event, InterruptionTracker, LifecycleEvent, PersistedTimer};

use super::{print_json, since_days, CmdResult};

#[derive(Subcommand)]
pub enum InterruptAction {
    /// Log the start of an interruption
    Start {
        /// What interrupted you
        #[arg(long)]
        reason: Option<String>,
        /// Interrupted task ID. Defaults to the running timer's task
        #[arg(long)]
        task: Option<String>,
    },
    /// End the open interruption and record it
    End,
    /// Print the open interruption as JSON
    Status,
    /// List recorded interruptions
    Log {
        /// Number of days to include, counting today
        #[arg(long, default_value = "1")]
        days: u32,
    },
}

/// Task of the running timer, if any.
fn running_task(db: &Database) -> Option<String> {
    let record: PersistedTimer = load_record(db, TIMER_KEY).ok().flatten()?;
    (record.status == SpanStatus::Active)
        .then_some(record.task_id)
        .flatten()
}

pub fn run(action: InterruptAction) -> CmdResult {
    let config = Config::load_or_default();
    let db = Database::open()?;
    let mut tracker = InterruptionTracker::new(&db, time::SystemClock, config.timer.settings());

    let recovery = tracker.recover();
    if let Some(event) = tracker.recovery_event(&recovery) {
        tracing::info!(?event, "interruption recovery");
    }

    match action {
        InterruptAction::Start { reason, task } => {
            let task = task.or_else(|| running_task(&db));
            match tracker.start(reason, task) {
                Some(event) => print_json(&event)?,
                None => {
                    eprintln!("an interruption is already open");
                    print_json(&serde_json::json!({
                        "active": tracker.active(),
                        "elapsed_ms": tracker.elapsed_ms(),
                    }))?;
                }
            }
        }
        InterruptAction::End => match tracker.end() {
            Some(span) => {
                db.record_interruption(&span)?;
                if let Some(event) = Event::interruption_ended(&span) {
                    print_json(&event)?;
                }
            }
            None => eprintln!("no open interruption"),
        },
        InterruptAction::Status => {
            print_json(&serde_json::json!({
                "active": tracker.active(),
                "elapsed_ms": tracker.elapsed_ms(),
            }))?;
        }
        InterruptAction::Log { days } => {
            let offset = time::offset_from_minutes(config.utc_offset_minutes())
                .unwrap_or_else(time::local_offset);
            let rows = db.interruptions_since(since_days(days, Utc::now(), offset))?;
            print_json(&rows)?;
        }
    }

    tracker.on_lifecycle(LifecycleEvent::Teardown);
    Ok(())
}
