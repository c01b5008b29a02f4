use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveDate, Utc};
use clap::Args;
use dayline_core::task::{parse_start, tasks_from_records, TaskListFile, TaskRecord};
use dayline_core::time;
use dayline_core::{calculate_schedule, Config, ScheduleConfig, ScheduleResult};
use serde::Deserialize;

use super::{print_json, CmdResult};

#[derive(Args)]
pub struct ScheduleArgs {
    /// Task list file (.json or .toml)
    #[arg(long)]
    tasks: PathBuf,
    /// Start time: HH:MM on the plan date, or RFC 3339. Defaults to now
    #[arg(long)]
    start: Option<String>,
    /// Plan date (YYYY-MM-DD). Defaults to the file's date, then today
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

/// JSON task files may be a bare array of records.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonTaskFile {
    File(TaskListFile),
    List(Vec<TaskRecord>),
}

fn read_task_file(path: &Path) -> Result<TaskListFile, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        return Ok(toml::from_str(&content)?);
    }
    Ok(match serde_json::from_str(&content)? {
        JsonTaskFile::File(file) => file,
        JsonTaskFile::List(tasks) => TaskListFile { date: None, tasks },
    })
}

pub fn run(args: ScheduleArgs) -> CmdResult {
    let config = Config::load_or_default();
    let offset_minutes = config.utc_offset_minutes();
    let offset = time::offset_from_minutes(offset_minutes)
        .ok_or_else(|| format!("invalid UTC offset: {offset_minutes} minutes"))?;

    let file = read_task_file(&args.tasks)?;
    let now = Utc::now();
    let date = args
        .date
        .or(file.date)
        .unwrap_or_else(|| time::local_date(now, offset));
    let tasks = tasks_from_records(file.tasks, date, offset)?;

    let schedule_config = match args.start.as_deref() {
        Some(raw) => ScheduleConfig::custom(parse_start(raw, date, offset)?),
        None => ScheduleConfig::start_now(),
    }
    .with_offset_minutes(offset_minutes);
    schedule_config.validate()?;

    let result = calculate_schedule(&tasks, &schedule_config, now);
    if args.json {
        print_json(&result)
    } else {
        print!("{}", render(&result, offset));
        Ok(())
    }
}

fn render(result: &ScheduleResult, offset: FixedOffset) -> String {
    let clock = |instant| time::format_clock(instant, offset);
    let mut out = String::new();

    for scheduled in &result.tasks {
        let task = &scheduled.task;
        let marker = if task.is_fixed() { " [fixed]" } else { "" };
        out.push_str(&format!(
            "{}-{}  {}{}  ({})\n",
            clock(scheduled.calculated_start),
            clock(scheduled.calculated_end),
            task.name,
            marker,
            time::format_duration(task.duration_seconds),
        ));
        if let (Some(pause), Some(resume)) = (scheduled.pause_instant, scheduled.resume_instant) {
            out.push_str(&format!(
                "             paused {} for fixed task, resumes {} ({} before, {} after)\n",
                clock(pause),
                clock(resume),
                time::format_duration(scheduled.seconds_before_pause),
                time::format_duration(scheduled.seconds_remaining_after_pause),
            ));
        }
    }

    out.push_str(&format!(
        "\n{} tasks, {} planned, {}-{}\n",
        result.tasks.len(),
        time::format_duration(result.total_planned_seconds()),
        clock(result.schedule_start),
        clock(result.schedule_end),
    ));
    if result.has_overflow {
        out.push_str("warning: schedule runs past midnight\n");
    }
    for late in result.late_fixed_tasks() {
        out.push_str(&format!(
            "warning: \"{}\" starts {} late\n",
            late.task.name,
            time::format_duration(late.delay_seconds()),
        ));
    }
    for conflict in &result.conflicts {
        out.push_str(&format!("conflict: {}\n", conflict.message));
    }
    out
}
