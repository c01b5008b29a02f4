//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Timer colour threshold and sync cadence
//! - Recovery bounds
//! - Calendar offset used for the midnight check
//!
//! Configuration is stored at `~/.config/dayline/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::recovery::RecoveryLimits;
use crate::timer::TimerSettings;
use crate::time;

/// Timer and recovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Remaining time at or below which the countdown turns yellow.
    #[serde(default = "default_warning_threshold_secs")]
    pub warning_threshold_secs: u64,
    /// How often a running timer is persisted.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Upper bound on recovered elapsed time.
    #[serde(default = "default_max_recovery_hours")]
    pub max_recovery_hours: u64,
    /// Wall-vs-monotonic drift tolerated before a resumed timer is rebased.
    #[serde(default = "default_resume_tolerance_ms")]
    pub resume_tolerance_ms: u64,
}

/// Defaults for schedule calculation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDefaults {
    /// Minutes east of UTC. Unset means the host's local offset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/dayline/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub schedule: ScheduleDefaults,
}

fn default_warning_threshold_secs() -> u64 {
    300
}
fn default_sync_interval_secs() -> u64 {
    10
}
fn default_max_recovery_hours() -> u64 {
    24
}
fn default_resume_tolerance_ms() -> u64 {
    2000
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            warning_threshold_secs: default_warning_threshold_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            max_recovery_hours: default_max_recovery_hours(),
            resume_tolerance_ms: default_resume_tolerance_ms(),
        }
    }
}

impl TimerConfig {
    pub fn settings(&self) -> TimerSettings {
        TimerSettings {
            warning_threshold_secs: self.warning_threshold_secs,
            sync_interval_secs: self.sync_interval_secs,
            limits: RecoveryLimits::from_hours(self.max_recovery_hours),
            resume_tolerance_ms: self.resume_tolerance_ms,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let obj = current.as_object_mut().ok_or_else(unknown)?;
            if parts.peek().is_some() {
                current = obj.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => value
                    .parse::<bool>()
                    .map(serde_json::Value::Bool)
                    .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                // Optional numeric fields serialize as null when unset; "none"
                // clears them and is rejected later for required fields.
                serde_json::Value::Number(_) | serde_json::Value::Null => {
                    if value.eq_ignore_ascii_case("none") || value.is_empty() {
                        serde_json::Value::Null
                    } else {
                        value
                            .parse::<i64>()
                            .map(|n| serde_json::Value::Number(n.into()))
                            .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?
                    }
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    return Err(invalid("cannot set a whole section".into()));
                }
                serde_json::Value::String(_) => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return (and write) the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key in memory. Returns error if key is unknown
    /// or the value does not fit the field.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timer.sync_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timer.sync_interval_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        if let Some(minutes) = self.schedule.utc_offset_minutes {
            if time::offset_from_minutes(minutes).is_none() {
                return Err(ConfigError::InvalidValue {
                    key: "schedule.utc_offset_minutes".into(),
                    message: format!("{minutes} is outside -1439..=1439"),
                });
            }
        }
        Ok(())
    }

    /// Offset in minutes to schedule with: configured, else the host's.
    pub fn utc_offset_minutes(&self) -> i32 {
        self.schedule
            .utc_offset_minutes
            .unwrap_or_else(|| time::local_offset().local_minus_utc() / 60)
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }
}
