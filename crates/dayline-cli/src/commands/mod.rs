pub mod config;
pub mod interrupt;
pub mod schedule;
pub mod timer;

use chrono::{DateTime, Days, FixedOffset, NaiveTime, Utc};
use dayline_core::time;
use serde::Serialize;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Start of the local day `days - 1` days before today. `days = 1` is today.
pub fn since_days(days: u32, now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let today = time::local_date(now, offset);
    let first = today
        .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
        .unwrap_or(today);
    time::at_local_time(first, NaiveTime::MIN, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn since_days_counts_calendar_days() {
        let offset = time::offset_from_minutes(0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        assert_eq!(since_days(1, now, offset), Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(since_days(0, now, offset), Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(since_days(7, now, offset), Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());
    }
}
