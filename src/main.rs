mod app;
mod calendar;
mod config;
mod domain;
mod insight;
mod logging;
mod stats;
mod storage;
mod ui;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::app::App;
use crate::calendar::{calendar_grid, format_duration, format_duration_human};
use crate::config::{load_config, resolve_store_path, state_dir};
use crate::domain::{TASK_COLORS, TimerChange, Tracker};
use crate::insight::{GeminiInsight, InsightService, digests};
use crate::stats::{Period, aggregate, period_label, session_count};
use crate::storage::{JsonFileStore, load_tracker, save_tracker};
use crate::ui::run_dashboard;

#[derive(Debug, Parser)]
#[command(name = "focus-ledger", version, about = "Terminal focus timer with period statistics")]
struct Cli {
	/// Store file (defaults to FOCUS_LEDGER_STORE, then config, then the state directory)
	#[arg(long, global = true)]
	store: Option<PathBuf>,
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	Dashboard,
	AddTask {
		#[arg(long)]
		title: String,
		#[arg(long, value_parser = clap::builder::PossibleValuesParser::new(TASK_COLORS))]
		color: Option<String>,
	},
	Start {
		/// Task id or exact title
		#[arg(long)]
		task: String,
	},
	Stop,
	Toggle {
		#[arg(long)]
		task: String,
	},
	Delete {
		#[arg(long)]
		task: String,
	},
	ListTasks,
	Status,
	Stats {
		#[arg(long, value_enum, default_value_t = Period::Today)]
		period: Period,
		/// Reference date, YYYY-MM-DD (defaults to today)
		#[arg(long)]
		date: Option<String>,
	},
	Calendar {
		#[arg(long)]
		year: Option<i32>,
		#[arg(long)]
		month: Option<u32>,
	},
	Insight {
		#[arg(long, value_enum, default_value_t = Period::Today)]
		period: Period,
		#[arg(long)]
		date: Option<String>,
	},
}

fn main() {
	if let Err(err) = run() {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

fn run() -> Result<()> {
	let cli = Cli::parse();

	let state_dir = state_dir();
	if let Err(err) = logging::init(&state_dir) {
		eprintln!("warning: logging disabled: {err:#}");
	}
	let config = load_config(&state_dir)?;
	let store_path = resolve_store_path(cli.store, &config, &state_dir);
	let mut store = JsonFileStore::open(&store_path)
		.with_context(|| format!("failed to open store {}", store_path.display()))?;
	let mut tracker = load_tracker(&store);

	match cli.command.unwrap_or(Command::Dashboard) {
		Command::Dashboard => {
			let insight = GeminiInsight::from_config(&config.insight);
			let mut app = App::new(tracker, store, Local, Utc::now());
			run_dashboard(&mut app, &insight).map_err(|err| anyhow!("dashboard failed: {err}"))?;
		}
		Command::AddTask { title, color } => match tracker.add_task(&title, color, Utc::now()) {
			Some(task_id) => {
				save_tracker(&mut store, &tracker)?;
				println!("created task {task_id}");
			}
			None => println!("title is empty, nothing created"),
		},
		Command::Start { task } => {
			let task_id = task_id_for(&tracker, &task)?;
			if let Some(closed) = tracker.start(&task_id, Utc::now())? {
				println!("stopped previous task after {}", format_duration(closed.duration));
			}
			save_tracker(&mut store, &tracker)?;
			println!("started {task}");
		}
		Command::Stop => match tracker.stop(Utc::now()) {
			Some(session) => {
				save_tracker(&mut store, &tracker)?;
				println!("stopped after {}", format_duration(session.duration));
			}
			None => println!("no timer running"),
		},
		Command::Toggle { task } => {
			let task_id = task_id_for(&tracker, &task)?;
			match tracker.toggle_timer(&task_id, Utc::now())? {
				TimerChange::Started => println!("started {task}"),
				TimerChange::Stopped(session) => println!(
					"stopped {task} after {}",
					format_duration(session.map(|session| session.duration).unwrap_or(0))
				),
			}
			save_tracker(&mut store, &tracker)?;
		}
		Command::Delete { task } => {
			let task_id = task_id_for(&tracker, &task)?;
			if let Some(removed) = tracker.delete_task(&task_id, Utc::now()) {
				save_tracker(&mut store, &tracker)?;
				println!("deleted {} ({} sessions)", removed.title, removed.sessions.len());
			}
		}
		Command::ListTasks => print_tasks(&tracker),
		Command::Status => print_status(&tracker),
		Command::Stats { period, date } => print_stats(&tracker, period, parse_day(date.as_deref())?),
		Command::Calendar { year, month } => print_calendar(year, month)?,
		Command::Insight { period, date } => {
			let cursor = parse_day(date.as_deref())?;
			let summary = aggregate(&tracker.tasks, period, cursor, &Local);
			let insight = GeminiInsight::from_config(&config.insight);
			println!("{}", insight.summarize(&digests(&summary), &period_label(period, cursor)));
		}
	}

	Ok(())
}

fn task_id_for(tracker: &Tracker, key: &str) -> Result<String> {
	tracker
		.find_task(key)
		.map(|task| task.id.clone())
		.ok_or_else(|| anyhow!("task not found: {key}"))
}

fn parse_day(input: Option<&str>) -> Result<NaiveDate> {
	if let Some(raw) = input {
		NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
	} else {
		Ok(Local::now().date_naive())
	}
}

fn print_tasks(tracker: &Tracker) {
	if tracker.tasks.is_empty() {
		println!("no tasks yet");
		return;
	}

	let active = tracker.active_task_id();
	for task in &tracker.tasks {
		println!(
			"{} | {} | {} | {} sessions | {}{}",
			task.id,
			task.title,
			task.color,
			session_count(task, active),
			format_duration(task.total_duration()),
			if active == Some(task.id.as_str()) { " | running" } else { "" }
		);
	}
}

fn print_status(tracker: &Tracker) {
	let now = Utc::now();
	match tracker.active_task_id().and_then(|id| tracker.task(id)) {
		Some(task) => println!("running {} for {}", task.title, format_duration(tracker.elapsed(now))),
		None => println!("idle"),
	}
}

fn print_stats(tracker: &Tracker, period: Period, cursor: NaiveDate) {
	let summary = aggregate(&tracker.tasks, period, cursor, &Local);
	println!("{}", period_label(period, cursor));
	if summary.rows.is_empty() {
		println!("no tracked sessions in this period");
		return;
	}

	let max = summary.rows.iter().map(|row| row.duration).max().unwrap_or(0).max(1);
	for row in &summary.rows {
		let width = ((row.duration as f64 / max as f64) * 24.0).round() as usize;
		println!(
			"{:>9} | {:<24} | {}",
			format_duration(row.duration),
			"=".repeat(width.max(1)),
			row.task.title
		);
	}
	println!("total {}", format_duration_human(summary.total));
}

fn print_calendar(year: Option<i32>, month: Option<u32>) -> Result<()> {
	let today = Local::now().date_naive();
	let year = year.unwrap_or(today.year());
	let month = month.unwrap_or(today.month());
	let grid = calendar_grid(year, month).ok_or_else(|| anyhow!("invalid month: {month}"))?;

	println!("{year}-{month:02}");
	println!("Su Mo Tu We Th Fr Sa");
	for week in grid.chunks(7) {
		let cells = week
			.iter()
			.map(|day| {
				if day.month() == month {
					format!("{:>2}", day.day())
				} else {
					" .".to_string()
				}
			})
			.collect::<Vec<_>>();
		println!("{}", cells.join(" "));
	}

	Ok(())
}
