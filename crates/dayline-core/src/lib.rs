//! # Dayline Core Library
//!
//! This library provides the core logic for Dayline, a single-day planner
//! and task timer. All operations are available through the standalone
//! `dayline` CLI, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Schedule Calculator**: a pure, single-pass function from an ordered
//!   task list and a start time to concrete start/end times, with fixed-task
//!   interruption, midnight overflow and conflict detection
//! - **Timer Engine**: a monotonic-clock state machine for the active task that
//!   persists a wall-clock anchor; the caller invokes `tick()` periodically
//! - **Recovery**: reconstructs elapsed time for the timer and for an open
//!   interruption after the process was gone
//! - **Storage**: SQLite-backed recovery records and history, TOML configuration
//!
//! ## Key Components
//!
//! - [`calculate_schedule`]: the schedule calculator
//! - [`TimerEngine`]: active task timer
//! - [`InterruptionTracker`]: open interruption tracking
//! - [`Database`]: recovery store and history
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod interruption;
pub mod recovery;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod time;
pub mod timer;

pub use error::{ConfigError, CoreError, StoreError, ValidationError};
pub use events::Event;
pub use interruption::{InterruptionSpan, InterruptionTracker};
pub use recovery::{recover, ActiveSpan, RecoveryLimits, RecoverySnapshot, SpanStatus, TimerRecoveryResult};
pub use scheduler::{
    calculate_schedule, detect_fixed_conflicts, FixedTaskConflict, ScheduleConfig, ScheduleMode,
    ScheduleResult, ScheduledTask,
};
pub use storage::{Config, Database, MemoryStore, RecoveryStore};
pub use task::{parse_start, tasks_from_records, Task, TaskKind, TaskListFile, TaskRecord};
pub use time::{Clock, ManualClock, SystemClock};
pub use timer::{LifecycleEvent, PersistedTimer, TimerColor, TimerEngine, TimerSettings, TimerState};
