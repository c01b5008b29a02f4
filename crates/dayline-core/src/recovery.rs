//! Wall-clock recovery of active timed spans.
//!
//! Both the task timer and an open interruption persist enough to answer one
//! question on the next start-up: how much time has passed since the last
//! write? The answer is `elapsed at last write + (now - last write)`, with the
//! sanity checks below. The same rules apply to both records; they differ
//! only in how they describe themselves as a [`RecoverySnapshot`].
//!
//! Validation, in order:
//! 1. record not active: nothing to recover (not an error)
//! 2. last write is in the future: invalid, caller resets
//! 3. negative result: clamped to 0
//! 4. result above the bound (24h by default): clamped, still a success

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time;

pub const DEFAULT_MAX_RECOVERY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Active,
    Inactive,
}

/// The fields recovery needs from a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySnapshot {
    pub status: SpanStatus,
    /// Signed so that a corrupted negative value survives decoding and gets
    /// clamped here instead of failing somewhere else.
    pub elapsed_ms: i64,
    pub last_sync_wall_clock: DateTime<Utc>,
}

/// Anything persisted that can be resumed after a restart.
pub trait ActiveSpan {
    fn recovery_snapshot(&self) -> RecoverySnapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryLimits {
    pub max_elapsed_ms: u64,
}

impl Default for RecoveryLimits {
    fn default() -> Self {
        Self {
            max_elapsed_ms: DEFAULT_MAX_RECOVERY_MS,
        }
    }
}

impl RecoveryLimits {
    pub fn from_hours(hours: u64) -> Self {
        Self {
            max_elapsed_ms: hours.saturating_mul(60 * 60 * 1000),
        }
    }
}

/// Outcome of a recovery attempt. Computed, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecoveryResult {
    /// A value was recovered and should be resumed from.
    pub success: bool,
    pub recovered_elapsed_ms: u64,
    /// Wall-clock gap since the last write. Diagnostic only.
    pub away_ms: i64,
    /// False when the record was rejected and must be discarded.
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The recovered value hit the upper bound.
    #[serde(default)]
    pub clamped: bool,
}

impl TimerRecoveryResult {
    /// No active record; start fresh.
    pub fn nothing_to_recover() -> Self {
        Self {
            success: false,
            recovered_elapsed_ms: 0,
            away_ms: 0,
            is_valid: true,
            error: None,
            clamped: false,
        }
    }

    /// The record cannot be trusted; reset.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            recovered_elapsed_ms: 0,
            away_ms: 0,
            is_valid: false,
            error: Some(error.into()),
            clamped: false,
        }
    }
}

/// Recover elapsed time for one span.
pub fn recover(
    snapshot: &RecoverySnapshot,
    now: DateTime<Utc>,
    limits: RecoveryLimits,
) -> TimerRecoveryResult {
    if snapshot.status != SpanStatus::Active {
        return TimerRecoveryResult::nothing_to_recover();
    }

    let away_ms = time::millis_between(snapshot.last_sync_wall_clock, now);
    if away_ms < 0 {
        tracing::warn!(
            last_sync = %snapshot.last_sync_wall_clock,
            %now,
            "persisted timestamp is in the future; discarding record"
        );
        return TimerRecoveryResult {
            away_ms,
            ..TimerRecoveryResult::rejected(format!(
                "last sync {} is {}ms ahead of now {}",
                snapshot.last_sync_wall_clock, -away_ms, now
            ))
        };
    }

    let raw = snapshot.elapsed_ms.saturating_add(away_ms).max(0) as u64;
    let clamped = raw > limits.max_elapsed_ms;
    let recovered_elapsed_ms = raw.min(limits.max_elapsed_ms);
    if clamped {
        tracing::debug!(
            raw_ms = raw,
            max_ms = limits.max_elapsed_ms,
            "recovered elapsed time clamped to bound"
        );
    }

    TimerRecoveryResult {
        success: true,
        recovered_elapsed_ms,
        away_ms,
        is_valid: true,
        error: None,
        clamped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn active(elapsed_ms: i64, ago_ms: i64) -> RecoverySnapshot {
        RecoverySnapshot {
            status: SpanStatus::Active,
            elapsed_ms,
            last_sync_wall_clock: now() - TimeDelta::milliseconds(ago_ms),
        }
    }

    #[test]
    fn adds_the_gap() {
        let result = recover(&active(1_200_000, 600_000), now(), RecoveryLimits::default());
        assert!(result.success);
        assert!(result.is_valid);
        assert_eq!(result.recovered_elapsed_ms, 1_800_000);
        assert_eq!(result.away_ms, 600_000);
    }

    #[test]
    fn inactive_record_is_not_an_error() {
        let snapshot = RecoverySnapshot {
            status: SpanStatus::Inactive,
            ..active(5_000, 1_000)
        };
        let result = recover(&snapshot, now(), RecoveryLimits::default());
        assert!(!result.success);
        assert!(result.is_valid);
        assert!(result.error.is_none());
    }

    #[test]
    fn future_timestamp_is_rejected() {
        let result = recover(&active(5_000, -60_000), now(), RecoveryLimits::default());
        assert!(!result.success);
        assert!(!result.is_valid);
        assert!(result.error.is_some());
        assert_eq!(result.recovered_elapsed_ms, 0);
    }

    #[test]
    fn negative_elapsed_is_clamped_to_zero() {
        let result = recover(&active(-10_000_000, 1_000), now(), RecoveryLimits::default());
        assert!(result.success);
        assert_eq!(result.recovered_elapsed_ms, 0);
    }

    #[test]
    fn long_absence_is_capped() {
        let three_days = 3 * DEFAULT_MAX_RECOVERY_MS as i64;
        let result = recover(&active(0, three_days), now(), RecoveryLimits::default());
        assert!(result.success);
        assert!(result.clamped);
        assert_eq!(result.recovered_elapsed_ms, DEFAULT_MAX_RECOVERY_MS);
    }

    #[test]
    fn exactly_at_bound_is_not_clamped() {
        let result = recover(
            &active(0, DEFAULT_MAX_RECOVERY_MS as i64),
            now(),
            RecoveryLimits::default(),
        );
        assert!(!result.clamped);
        assert_eq!(result.recovered_elapsed_ms, DEFAULT_MAX_RECOVERY_MS);
    }

    #[test]
    fn custom_bound() {
        let result = recover(&active(0, 7_200_000), now(), RecoveryLimits::from_hours(1));
        assert_eq!(result.recovered_elapsed_ms, 3_600_000);
    }
}
