mod config;
pub mod database;
pub mod store;

pub use config::{Config, ScheduleDefaults, TimerConfig};
pub use database::{Database, InterruptionRecord, TaskSessionRecord};
pub use store::{load_record, save_record, MemoryStore, RecoveryStore, INTERRUPTION_KEY, TIMER_KEY};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/dayline[-dev]/` based on DAYLINE_ENV.
///
/// Set DAYLINE_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("DAYLINE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("dayline-dev")
    } else {
        base_dir.join("dayline")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::NoDataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
