//! Task model.
//!
//! [`Task`] is the validated input to the schedule calculator. A fixed task
//! carries its planned start inside [`TaskKind::Fixed`], so "fixed without a
//! start" cannot be constructed.
//!
//! [`TaskRecord`] is the loose form tasks arrive in from files or other
//! collaborators; [`tasks_from_records`] is the boundary check that turns a
//! list of records into tasks or rejects it.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time;

/// Whether a task is pinned to a clock time or flows with the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Starts at `planned_start` regardless of what precedes it (unless the
    /// day is already running late).
    Fixed { planned_start: DateTime<Utc> },
    /// Starts when the previous task ends.
    Flexible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: TaskKind,
    pub duration_seconds: u64,
    /// Position in the day's list. Flexible tasks run in this order.
    pub sequence_index: u32,
}

impl Task {
    pub fn flexible(
        id: impl Into<String>,
        name: impl Into<String>,
        duration_seconds: u64,
        sequence_index: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: TaskKind::Flexible,
            duration_seconds,
            sequence_index,
        }
    }

    pub fn fixed(
        id: impl Into<String>,
        name: impl Into<String>,
        planned_start: DateTime<Utc>,
        duration_seconds: u64,
        sequence_index: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: TaskKind::Fixed { planned_start },
            duration_seconds,
            sequence_index,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.kind, TaskKind::Fixed { .. })
    }

    pub fn planned_start(&self) -> Option<DateTime<Utc>> {
        match self.kind {
            TaskKind::Fixed { planned_start } => Some(planned_start),
            TaskKind::Flexible => None,
        }
    }

    /// `planned_start + duration` for fixed tasks.
    pub fn planned_end(&self) -> Option<DateTime<Utc>> {
        self.planned_start()
            .map(|start| time::add_secs(start, self.duration_seconds))
    }
}

// ── Boundary form ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Fixed,
    #[default]
    Flexible,
}

/// A duration as written by a human: plain seconds or a duration string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub fn to_seconds(&self) -> Result<u64, ValidationError> {
        match self {
            DurationValue::Seconds(s) => Ok(*s),
            DurationValue::Text(text) => time::parse_duration(text),
        }
    }
}

/// Task as it arrives from an import or an editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub kind: RecordKind,
    /// RFC 3339 instant, or `HH:MM` on the plan date.
    #[serde(default)]
    pub planned_start: Option<String>,
    pub duration: DurationValue,
    /// Defaults to the record's position in the list.
    #[serde(default)]
    pub sequence_index: Option<u32>,
}

/// A task list file: optional plan date plus the records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskListFile {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

impl TaskRecord {
    /// Validate one record. `position` is the fallback sequence index;
    /// `date` and `offset` anchor `HH:MM` start times.
    pub fn into_task(
        self,
        position: u32,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> Result<Task, ValidationError> {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let duration_seconds = self.duration.to_seconds()?;
        let sequence_index = self.sequence_index.unwrap_or(position);

        let kind = match self.kind {
            RecordKind::Flexible => TaskKind::Flexible,
            RecordKind::Fixed => {
                let raw = self
                    .planned_start
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ValidationError::FixedWithoutStart {
                        task_id: id.clone(),
                    })?;
                TaskKind::Fixed {
                    planned_start: parse_start(raw, date, offset)?,
                }
            }
        };

        Ok(Task {
            id,
            name: self.name,
            kind,
            duration_seconds,
            sequence_index,
        })
    }
}

/// Parse a start time: an RFC 3339 instant, or `HH:MM` on `date` at `offset`.
pub fn parse_start(
    raw: &str,
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    let clock = time::parse_clock_time(raw)?;
    Ok(time::at_local_time(date, clock, offset))
}

/// Validate a whole list. Rejects the list on the first bad record or on a
/// duplicated id.
pub fn tasks_from_records(
    records: Vec<TaskRecord>,
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<Vec<Task>, ValidationError> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut tasks = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        let position = u32::try_from(position).map_err(|_| ValidationError::InvalidValue {
            field: "tasks".into(),
            message: "too many tasks".into(),
        })?;
        let task = record.into_task(position, date, offset)?;
        if !seen.insert(task.id.clone()) {
            return Err(ValidationError::DuplicateId(task.id));
        }
        tasks.push(task);
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        time::offset_from_minutes(0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn record(name: &str, kind: RecordKind, start: Option<&str>, duration: &str) -> TaskRecord {
        TaskRecord {
            id: Some(name.to_lowercase()),
            name: name.into(),
            kind,
            planned_start: start.map(String::from),
            duration: DurationValue::Text(duration.into()),
            sequence_index: None,
        }
    }

    #[test]
    fn fixed_record_without_start_is_rejected() {
        let err = record("Standup", RecordKind::Fixed, None, "15m")
            .into_task(0, day(), utc())
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::FixedWithoutStart {
                task_id: "standup".into()
            }
        );
    }

    #[test]
    fn fixed_record_with_clock_time_uses_plan_date() {
        let task = record("Standup", RecordKind::Fixed, Some("09:00"), "15m")
            .into_task(3, day(), utc())
            .unwrap();
        assert_eq!(
            task.planned_start(),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap())
        );
        assert_eq!(task.duration_seconds, 900);
        assert_eq!(task.sequence_index, 3);
    }

    #[test]
    fn fixed_record_with_rfc3339_start() {
        let task = record(
            "Call",
            RecordKind::Fixed,
            Some("2024-03-10T14:00:00+02:00"),
            "1h",
        )
        .into_task(0, day(), utc())
        .unwrap();
        assert_eq!(
            task.planned_start(),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn flexible_record_ignores_start() {
        let task = record("Write", RecordKind::Flexible, Some("09:00"), "2h")
            .into_task(0, day(), utc())
            .unwrap();
        assert!(!task.is_fixed());
        assert_eq!(task.planned_start(), None);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let records = vec![
            record("A", RecordKind::Flexible, None, "10m"),
            record("A", RecordKind::Flexible, None, "20m"),
        ];
        assert_eq!(
            tasks_from_records(records, day(), utc()).unwrap_err(),
            ValidationError::DuplicateId("a".into())
        );
    }

    #[test]
    fn missing_id_gets_generated() {
        let mut rec = record("A", RecordKind::Flexible, None, "10m");
        rec.id = None;
        let task = rec.into_task(0, day(), utc()).unwrap();
        assert!(!task.id.is_empty());
    }

    #[test]
    fn task_json_shape() {
        let task = Task::fixed(
            "b",
            "Meeting",
            Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap(),
            3600,
            1,
        );
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["kind"], "fixed");
        assert_eq!(json["planned_start"], "2024-03-10T09:00:00Z");

        let list: TaskListFile = serde_json::from_str(
            r#"{"tasks":[{"name":"A","duration":1800},{"name":"B","kind":"fixed","planned_start":"09:00","duration":"1h"}]}"#,
        )
        .unwrap();
        assert_eq!(list.tasks.len(), 2);
        assert_eq!(list.tasks[0].duration, DurationValue::Seconds(1800));
    }
}
