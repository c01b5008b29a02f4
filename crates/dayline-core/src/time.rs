//! Time utilities.
//!
//! Two clocks are in play and must never be mixed up:
//!
//! - the **monotonic** clock (`std::time::Instant`) drives in-session elapsed
//!   time. It never jumps when the user changes the system time, but it also
//!   does not advance while the process is suspended or dead.
//! - the **wall** clock (`DateTime<Utc>`) is what gets persisted. It keeps
//!   advancing across sleep and restarts, which is what recovery relies on.
//!
//! Everything calendar-related (midnight overflow, `HH:MM` parsing) is done
//! against an explicit [`FixedOffset`] rather than the ambient local zone, so
//! results are deterministic in tests.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Offset, TimeDelta, Utc};

use crate::error::ValidationError;

/// Source of "now" for both clocks.
pub trait Clock {
    /// Calendar time. Survives suspension and restarts.
    fn wall_now(&self) -> DateTime<Utc>;
    /// Monotonic time for in-session measurement.
    fn monotonic_now(&self) -> Instant;
}

/// The real system clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for tests and simulations.
///
/// [`advance`](Self::advance) moves both clocks together (normal passage of
/// time). [`advance_wall`](Self::advance_wall) and [`set_wall`](Self::set_wall)
/// move only the wall clock, which models a suspended process or a user
/// adjusting the system time.
#[derive(Debug)]
pub struct ManualClock {
    wall: Cell<DateTime<Utc>>,
    origin: Instant,
    monotonic_offset: Cell<Duration>,
}

impl ManualClock {
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            wall: Cell::new(wall),
            origin: Instant::now(),
            monotonic_offset: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.monotonic_offset.set(self.monotonic_offset.get() + by);
        self.advance_wall(by);
    }

    pub fn advance_wall(&self, by: Duration) {
        let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        self.wall.set(self.wall.get() + delta);
    }

    pub fn set_wall(&self, wall: DateTime<Utc>) {
        self.wall.set(wall);
    }
}

impl Clock for ManualClock {
    fn wall_now(&self) -> DateTime<Utc> {
        self.wall.get()
    }

    fn monotonic_now(&self) -> Instant {
        self.origin + self.monotonic_offset.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn wall_now(&self) -> DateTime<Utc> {
        (**self).wall_now()
    }

    fn monotonic_now(&self) -> Instant {
        (**self).monotonic_now()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn wall_now(&self) -> DateTime<Utc> {
        (**self).wall_now()
    }

    fn monotonic_now(&self) -> Instant {
        (**self).monotonic_now()
    }
}

// ── Durations ────────────────────────────────────────────────────────

/// Parse a human duration into seconds.
///
/// Accepted forms: `90` (bare number = minutes), `45s`, `25m`, `2h`,
/// `1h30m`, `1h 30m 15s`, `1:30` (H:MM) and `1:30:00` (H:MM:SS).
pub fn parse_duration(input: &str) -> Result<u64, ValidationError> {
    let s = input.trim();
    let invalid = || ValidationError::InvalidDuration(input.to_string());
    if s.is_empty() {
        return Err(invalid());
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        let minutes: u64 = s.parse().map_err(|_| invalid())?;
        return minutes.checked_mul(60).ok_or_else(invalid);
    }

    if s.contains(':') {
        let parts: Vec<&str> = s.split(':').collect();
        let nums: Vec<u64> = parts
            .iter()
            .map(|p| p.parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        return match nums.as_slice() {
            [h, m] if *m < 60 => h
                .checked_mul(3600)
                .and_then(|total| total.checked_add(m * 60))
                .ok_or_else(invalid),
            [h, m, sec] if *m < 60 && *sec < 60 => h
                .checked_mul(3600)
                .and_then(|total| total.checked_add(m * 60 + sec))
                .ok_or_else(invalid),
            _ => Err(invalid()),
        };
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut saw_unit = false;
    for c in s.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' => continue,
            'h' | 'H' | 'm' | 'M' | 's' | 'S' => {
                if digits.is_empty() {
                    return Err(invalid());
                }
                let n: u64 = digits.parse().map_err(|_| invalid())?;
                let unit = match c.to_ascii_lowercase() {
                    'h' => 3600,
                    'm' => 60,
                    _ => 1,
                };
                total = n
                    .checked_mul(unit)
                    .and_then(|v| total.checked_add(v))
                    .ok_or_else(invalid)?;
                digits.clear();
                saw_unit = true;
            }
            _ => return Err(invalid()),
        }
    }
    if !digits.is_empty() || !saw_unit {
        return Err(invalid());
    }
    Ok(total)
}

/// Format seconds as `1h 30m`, `45m`, `1h 5m 10s`, `0m`.
pub fn format_duration(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;

    let mut parts = Vec::with_capacity(3);
    if h > 0 {
        parts.push(format!("{h}h"));
    }
    if m > 0 {
        parts.push(format!("{m}m"));
    }
    if s > 0 {
        parts.push(format!("{s}s"));
    }
    if parts.is_empty() {
        return "0m".to_string();
    }
    parts.join(" ")
}

/// Format a signed millisecond countdown as `MM:SS` or `H:MM:SS`.
///
/// Negative values (overtime) get a leading `-`.
pub fn format_countdown(ms: i64) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let total_secs = ms.unsigned_abs() / 1000;
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    if h > 0 {
        format!("{sign}{h}:{m:02}:{s:02}")
    } else {
        format!("{sign}{m:02}:{s:02}")
    }
}

/// Milliseconds from `from` to `to`; negative when `to` is earlier.
pub fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds()
}

/// `instant + seconds`, saturating at the last representable instant.
pub fn add_secs(instant: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ── Clock times and calendar days ────────────────────────────────────

/// Parse `HH:MM` (24-hour).
pub fn parse_clock_time(input: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|_| ValidationError::InvalidClockTime(input.to_string()))
}

/// The instant at which the wall clock at `offset` reads `date time`.
pub fn at_local_time(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(time);
    (local - TimeDelta::seconds(offset.local_minus_utc() as i64)).and_utc()
}

/// Calendar date of `instant` as seen at `offset`.
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// The first local midnight strictly after `instant`.
pub fn next_local_midnight(instant: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let next_day = local_date(instant, offset)
        .checked_add_days(Days::new(1))
        .unwrap_or(NaiveDate::MAX);
    at_local_time(next_day, NaiveTime::MIN, offset)
}

/// `HH:MM` rendering of `instant` at `offset`.
pub fn format_clock(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant.with_timezone(&offset).format("%H:%M").to_string()
}

/// Build an offset from whole minutes east of UTC.
pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
}

/// The host's current UTC offset.
pub fn local_offset() -> FixedOffset {
    chrono::Local::now().offset().fix()
}
