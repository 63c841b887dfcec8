use std::collections::HashSet;
use std::error::Error;
use std::io;
use std::time::Instant;

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};
use crossterm::event::{self, Event as CEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, ExecutableCommand};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::app::{App, DatePicker, InsightPanel, Mode};
use crate::calendar::{calendar_grid, format_duration, format_duration_human, is_same_day};
use crate::insight::InsightService;
use crate::stats::{aggregate, live_today_duration, live_today_total, period_label, session_count, Period, PeriodSummary};
use crate::storage::KeyValueStore;

const FOCUSED_PANEL_BORDER_COLOR: Color = Color::Yellow;
const INACTIVE_PANEL_BORDER_COLOR: Color = Color::DarkGray;
const HIGHLIGHT_BACKGROUND_COLOR: Color = Color::Rgb(42, 45, 52);

pub fn run_dashboard<S: KeyValueStore>(app: &mut App<S, Local>, insight: &impl InsightService) -> Result<(), Box<dyn Error>> {
	enable_raw_mode()?;
	let mut stdout = io::stdout();
	stdout.execute(EnterAlternateScreen)?;
	let backend = CrosstermBackend::new(stdout);
	let mut terminal = Terminal::new(backend)?;

	let result = run_event_loop(&mut terminal, app, insight);
	app.shutdown();

	disable_raw_mode()?;
	execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
	terminal.show_cursor()?;

	result
}

fn run_event_loop<S: KeyValueStore>(
	terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
	app: &mut App<S, Local>,
	insight: &impl InsightService,
) -> Result<(), Box<dyn Error>> {
	while app.running {
		app.sync_refresh(Instant::now());
		let now = Utc::now();
		terminal.draw(|frame| draw_dashboard(frame, app, now))?;

		if app.has_pending_insight() {
			// Drawn once as pending so the popup is visible during the request.
			app.resolve_pending_insight(insight);
			continue;
		}

		if event::poll(app.refresh.poll_timeout(Instant::now()))? {
			if let CEvent::Key(key) = event::read()? {
				if key.kind != KeyEventKind::Press {
					continue;
				}
				app.handle_key(key.code, Utc::now());
			}
		} else {
			app.refresh.fire(Instant::now());
		}
	}

	Ok(())
}

fn draw_dashboard<S: KeyValueStore, Tz: TimeZone>(frame: &mut Frame, app: &App<S, Tz>, now: DateTime<Utc>) {
	let layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(4)])
		.split(frame.area());

	let body = Layout::default()
		.direction(Direction::Horizontal)
		.constraints([Constraint::Percentage(42), Constraint::Percentage(58)])
		.split(layout[1]);

	let summary = aggregate(&app.tracker.tasks, app.period, app.cursor, app.tz());

	render_header(frame, layout[0], app, now);
	render_task_panel(frame, body[0], app, now);
	render_stats_panel(frame, body[1], app, &summary);
	render_footer(frame, layout[2], app);

	match &app.mode {
		Mode::AddTask { input } => render_add_task_popup(frame, input),
		Mode::ConfirmDelete { title, .. } => render_confirm_popup(frame, title),
		Mode::Calendar(picker) => render_calendar_popup(frame, picker, &active_days(app), app.today(now)),
		Mode::Insight(panel) => render_insight_popup(frame, panel),
		Mode::Normal => {}
	}
}

fn render_header<S: KeyValueStore, Tz: TimeZone>(frame: &mut Frame, area: Rect, app: &App<S, Tz>, now: DateTime<Utc>) {
	let mut spans = Vec::new();
	for (index, period) in Period::ALL.iter().enumerate() {
		let style = if *period == app.period {
			Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD)
		} else {
			Style::default().fg(Color::Gray)
		};
		spans.push(Span::styled(format!(" {} {} ", index + 1, period.title()), style));
		spans.push(Span::raw(" "));
	}
	spans.push(Span::raw(format!("| {} ", period_label(app.period, app.cursor))));

	let today_total = live_today_total(&app.tracker, now, app.tz());
	spans.push(Span::styled(
		format!("| today {}", format_duration(today_total)),
		Style::default().fg(Color::LightYellow).add_modifier(Modifier::BOLD),
	));

	let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title("Focus Ledger"));
	frame.render_widget(header, area);
}

fn render_task_panel<S: KeyValueStore, Tz: TimeZone>(frame: &mut Frame, area: Rect, app: &App<S, Tz>, now: DateTime<Utc>) {
	let active = app.tracker.active_task_id();
	let items = app
		.tracker
		.tasks
		.iter()
		.map(|task| {
			let running = active == Some(task.id.as_str());
			let marker = if running { ">" } else { " " };
			let today = live_today_duration(&app.tracker, &task.id, now, app.tz());
			let mut spans = vec![
				Span::raw(format!("{marker} ")),
				Span::styled("● ", color_style(&task.color)),
				Span::styled(task.title.clone(), if running {
					Style::default().add_modifier(Modifier::BOLD)
				} else {
					Style::default()
				}),
				Span::raw(format!(
					"  {}  x{}",
					format_duration(today),
					session_count(task, active)
				)),
			];
			if running {
				spans.push(Span::styled(
					format!("  running {}", format_duration(app.tracker.elapsed(now))),
					Style::default().fg(Color::LightGreen),
				));
			}
			ListItem::new(Line::from(spans))
		})
		.collect::<Vec<_>>();

	let mut state = ListState::default();
	if !items.is_empty() {
		state.select(Some(app.selected.min(items.len() - 1)));
	}

	let block = Block::default()
		.borders(Borders::ALL)
		.title("Tasks (today)")
		.border_style(border_style(app.mode == Mode::Normal));
	let list = List::new(if items.is_empty() {
		vec![ListItem::new("(no tasks yet, press a to add one)")]
	} else {
		items
	})
	.block(block)
	.highlight_style(Style::default().bg(HIGHLIGHT_BACKGROUND_COLOR).add_modifier(Modifier::BOLD));

	frame.render_stateful_widget(list, area, &mut state);
}

fn render_stats_panel<S: KeyValueStore, Tz: TimeZone>(frame: &mut Frame, area: Rect, app: &App<S, Tz>, summary: &PeriodSummary<'_>) {
	let title = format!(
		"{} | total {}",
		period_label(app.period, app.cursor),
		format_duration_human(summary.total)
	);
	let block = Block::default().borders(Borders::ALL).title(title);

	if summary.rows.is_empty() {
		let empty = Paragraph::new("No focus time recorded in this period").block(block);
		frame.render_widget(empty, area);
		return;
	}

	let bars = summary
		.rows
		.iter()
		.map(|row| {
			Bar::default()
				.value(u64::try_from(row.duration / 1000).unwrap_or(0))
				.label(Line::from(row.task.title.clone()))
				.text_value(format_duration_human(row.duration))
				.style(color_style(&row.task.color))
		})
		.collect::<Vec<_>>();

	let chart = BarChart::default()
		.block(block)
		.direction(Direction::Horizontal)
		.bar_width(1)
		.bar_gap(1)
		.data(BarGroup::default().bars(&bars));
	frame.render_widget(chart, area);
}

fn render_footer<S: KeyValueStore, Tz: TimeZone>(frame: &mut Frame, area: Rect, app: &App<S, Tz>) {
	let hint = match &app.mode {
		Mode::Normal => "j/k move | space start/stop | a add | d delete | Tab/1/2/3 period | c calendar | t today | i insight | q quit",
		Mode::AddTask { .. } => "type a title | Enter add | Esc cancel",
		Mode::ConfirmDelete { .. } => "y delete | n cancel",
		Mode::Calendar(_) => "arrows/hjkl move | n/N month | t today | Enter choose | Esc cancel",
		Mode::Insight(_) => "Esc close",
	};
	let footer = Paragraph::new(vec![Line::from(hint), Line::from(app.status.clone())])
		.block(Block::default().borders(Borders::ALL).title("Shortcuts"));
	frame.render_widget(footer, area);
}

fn render_add_task_popup(frame: &mut Frame, input: &str) {
	let area = centered_rect(50, 20, frame.area());
	frame.render_widget(Clear, area);
	let prompt = Paragraph::new(vec![Line::from("Task title"), Line::from(format!("> {input}"))])
		.block(Block::default().borders(Borders::ALL).title("New task").border_style(border_style(true)));
	frame.render_widget(prompt, area);
}

fn render_confirm_popup(frame: &mut Frame, title: &str) {
	let area = centered_rect(50, 20, frame.area());
	frame.render_widget(Clear, area);
	let prompt = Paragraph::new(vec![
		Line::from(format!("Delete \"{title}\" and all of its sessions?")),
		Line::from("This cannot be undone. (y/n)"),
	])
	.block(Block::default().borders(Borders::ALL).title("Delete task").border_style(border_style(true)));
	frame.render_widget(prompt, area);
}

fn render_calendar_popup(frame: &mut Frame, picker: &DatePicker, active_days: &HashSet<NaiveDate>, today: NaiveDate) {
	let area = centered_rect(36, 50, frame.area());
	frame.render_widget(Clear, area);

	let month = picker.month;
	let mut lines = Vec::new();
	lines.push(Line::from(format!("{} {}", month.format("%B"), month.year())));
	lines.push(Line::from("Su Mo Tu We Th Fr Sa"));

	let grid = calendar_grid(month.year(), month.month()).unwrap_or_default();
	for week in grid.chunks(7) {
		let spans = week
			.iter()
			.map(|day| {
				let mut style = Style::default();
				if day.month() != month.month() {
					style = style.fg(Color::DarkGray);
				} else if active_days.contains(day) {
					style = style.fg(Color::LightYellow).add_modifier(Modifier::BOLD);
				}
				if is_same_day(day, &today) {
					style = style.add_modifier(Modifier::UNDERLINED);
				}
				if *day == picker.selected {
					style = style.fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD);
				}
				Span::styled(format!("{:>2} ", day.day()), style)
			})
			.collect::<Vec<_>>();
		lines.push(Line::from(spans));
	}

	let calendar = Paragraph::new(lines)
		.block(Block::default().borders(Borders::ALL).title("Pick a date").border_style(border_style(true)));
	frame.render_widget(calendar, area);
}

fn render_insight_popup(frame: &mut Frame, panel: &InsightPanel) {
	let area = centered_rect(60, 40, frame.area());
	frame.render_widget(Clear, area);
	let (label, text) = match panel {
		InsightPanel::Pending { label } => (label, "Asking for an insight..."),
		InsightPanel::Ready { label, text } => (label, text.as_str()),
	};
	let body = Paragraph::new(text)
		.wrap(Wrap { trim: true })
		.block(Block::default().borders(Borders::ALL).title(format!("Insight: {label}")).border_style(border_style(true)));
	frame.render_widget(body, area);
}

/// Local days holding at least one session start, for calendar highlighting.
fn active_days<S: KeyValueStore, Tz: TimeZone>(app: &App<S, Tz>) -> HashSet<NaiveDate> {
	app.tracker
		.tasks
		.iter()
		.flat_map(|task| task.sessions.iter())
		.map(|session| session.start_time.with_timezone(app.tz()).date_naive())
		.collect()
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
	let popup_layout = Layout::default()
		.direction(Direction::Vertical)
		.constraints([
			Constraint::Percentage((100 - percent_y) / 2),
			Constraint::Percentage(percent_y),
			Constraint::Percentage((100 - percent_y) / 2),
		])
		.split(area);
	Layout::default()
		.direction(Direction::Horizontal)
		.constraints([
			Constraint::Percentage((100 - percent_x) / 2),
			Constraint::Percentage(percent_x),
			Constraint::Percentage((100 - percent_x) / 2),
		])
		.split(popup_layout[1])[1]
}

fn color_style(color_name: &str) -> Style {
	color_from_name(color_name)
		.map(|color| Style::default().fg(color))
		.unwrap_or_default()
}

fn color_from_name(color_name: &str) -> Option<Color> {
	match color_name {
		"red" => Some(Color::Red),
		"green" => Some(Color::Green),
		"yellow" => Some(Color::Yellow),
		"blue" => Some(Color::Blue),
		"magenta" => Some(Color::Magenta),
		"cyan" => Some(Color::Cyan),
		"light_blue" => Some(Color::LightBlue),
		"light_magenta" => Some(Color::LightMagenta),
		_ => None,
	}
}

fn border_style(focused: bool) -> Style {
	if focused {
		Style::default()
			.fg(FOCUSED_PANEL_BORDER_COLOR)
			.add_modifier(Modifier::BOLD)
	} else {
		Style::default().fg(INACTIVE_PANEL_BORDER_COLOR)
	}
}

#[cfg(test)]
mod tests {
	use chrono::{TimeZone, Utc};
	use ratatui::Terminal;
	use ratatui::backend::TestBackend;

	use crate::app::App;
	use crate::domain::{TASK_COLORS, Tracker};
	use crate::storage::MemoryStore;

	use super::{color_from_name, draw_dashboard};

	#[test]
	fn every_palette_colour_maps_to_a_terminal_colour() {
		for name in TASK_COLORS {
			assert!(color_from_name(name).is_some(), "{name} has no colour");
		}
	}

	#[test]
	fn dashboard_shows_running_task_and_chart() {
		let now = Utc.with_ymd_and_hms(2026, 10, 21, 9, 0, 0).unwrap();
		let mut tracker = Tracker::default();
		let reading = tracker
			.add_task("Reading", Some("green".to_string()), now)
			.expect("task should be created");
		tracker.start(&reading, now).expect("start should work");
		tracker.stop(now + chrono::Duration::minutes(30));
		tracker
			.start(&reading, now + chrono::Duration::minutes(40))
			.expect("start should work");
		let app = App::new(tracker, MemoryStore::default(), Utc, now);

		let mut terminal = Terminal::new(TestBackend::new(120, 24)).expect("terminal");
		terminal
			.draw(|frame| draw_dashboard(frame, &app, now + chrono::Duration::minutes(45)))
			.expect("draw");

		let screen = terminal
			.backend()
			.buffer()
			.content()
			.iter()
			.map(|cell| cell.symbol())
			.collect::<String>();
		assert!(screen.contains("Reading"));
		assert!(screen.contains("running 05:00"));
		assert!(screen.contains("today 35:00"));
		assert!(screen.contains("total 30m"));
	}
}
