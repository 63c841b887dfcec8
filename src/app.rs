use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use crossterm::event::KeyCode;
use tracing::{info, warn};

use crate::calendar::{first_of_month, format_duration, shift_month};
use crate::domain::{Task, TimerChange, Tracker};
use crate::insight::{InsightService, digests};
use crate::stats::{Period, aggregate, period_label};
use crate::storage::{KeyValueStore, save_tracker};

pub const REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(1);
const IDLE_POLL: StdDuration = StdDuration::from_secs(30);

/// Display refresh for the running timer. Armed only while a task is running;
/// stored durations never depend on it.
#[derive(Debug, Clone)]
pub struct RefreshTimer {
	interval: StdDuration,
	next_tick: Option<Instant>,
}

impl RefreshTimer {
	pub fn new(interval: StdDuration) -> Self {
		Self {
			interval,
			next_tick: None,
		}
	}

	pub fn is_armed(&self) -> bool {
		self.next_tick.is_some()
	}

	/// Arms on the idle to running edge and disarms on the way back.
	pub fn sync(&mut self, running: bool, now: Instant) {
		match (running, self.next_tick) {
			(true, None) => self.next_tick = Some(now + self.interval),
			(false, Some(_)) => self.next_tick = None,
			_ => {}
		}
	}

	/// How long the event loop may block waiting for input.
	pub fn poll_timeout(&self, now: Instant) -> StdDuration {
		match self.next_tick {
			Some(next_tick) => next_tick.saturating_duration_since(now),
			None => IDLE_POLL,
		}
	}

	/// Returns true when a tick was due, scheduling the next one.
	pub fn fire(&mut self, now: Instant) -> bool {
		match self.next_tick {
			Some(next_tick) if next_tick <= now => {
				self.next_tick = Some(now + self.interval);
				true
			}
			_ => false,
		}
	}

	pub fn cancel(&mut self) {
		self.next_tick = None;
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePicker {
	pub month: NaiveDate,
	pub selected: NaiveDate,
}

impl DatePicker {
	pub fn new(selected: NaiveDate) -> Self {
		Self {
			month: first_of_month(selected),
			selected,
		}
	}

	fn move_days(&mut self, delta: i64) {
		self.selected += Duration::days(delta);
		self.month = first_of_month(self.selected);
	}

	fn shift_month(&mut self, delta: i32) {
		self.selected = shift_month(self.selected, delta);
		self.month = first_of_month(self.selected);
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightPanel {
	Pending { label: String },
	Ready { label: String, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
	Normal,
	AddTask { input: String },
	ConfirmDelete { task_id: String, title: String },
	Calendar(DatePicker),
	Insight(InsightPanel),
}

pub struct App<S: KeyValueStore, Tz: TimeZone = Local> {
	pub tracker: Tracker,
	store: S,
	tz: Tz,
	pub period: Period,
	pub cursor: NaiveDate,
	pub selected: usize,
	pub mode: Mode,
	pub status: String,
	pub refresh: RefreshTimer,
	pub running: bool,
}

impl<S: KeyValueStore, Tz: TimeZone> App<S, Tz> {
	pub fn new(tracker: Tracker, store: S, tz: Tz, now: DateTime<Utc>) -> Self {
		let cursor = now.with_timezone(&tz).date_naive();
		let status = match tracker.active_task_id().and_then(|id| tracker.task(id)) {
			Some(task) => format!("running: {}", task.title),
			None => "Ready".to_string(),
		};
		Self {
			tracker,
			store,
			tz,
			period: Period::Today,
			cursor,
			selected: 0,
			mode: Mode::Normal,
			status,
			refresh: RefreshTimer::new(REFRESH_INTERVAL),
			running: true,
		}
	}

	pub fn tz(&self) -> &Tz {
		&self.tz
	}

	pub fn selected_task(&self) -> Option<&Task> {
		self.tracker.tasks.get(self.selected)
	}

	pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
		now.with_timezone(&self.tz).date_naive()
	}

	pub fn sync_refresh(&mut self, now: Instant) {
		let running = self.tracker.active_task_id().is_some();
		self.refresh.sync(running, now);
	}

	pub fn shutdown(&mut self) {
		self.refresh.cancel();
		self.running = false;
	}

	pub fn handle_key(&mut self, code: KeyCode, now: DateTime<Utc>) {
		match self.mode {
			Mode::Normal => self.handle_normal_key(code, now),
			Mode::AddTask { .. } => self.handle_add_task_key(code, now),
			Mode::ConfirmDelete { .. } => self.handle_confirm_key(code, now),
			Mode::Calendar(_) => self.handle_calendar_key(code, now),
			Mode::Insight(_) => {
				if matches!(code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') | KeyCode::Char('i')) {
					self.mode = Mode::Normal;
				}
			}
		}
	}

	fn handle_normal_key(&mut self, code: KeyCode, now: DateTime<Utc>) {
		match code {
			KeyCode::Char('q') | KeyCode::Esc => self.shutdown(),
			KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
			KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
			KeyCode::Char(' ') | KeyCode::Enter => self.toggle_selected(now),
			KeyCode::Char('a') => {
				self.mode = Mode::AddTask {
					input: String::new(),
				};
			}
			KeyCode::Char('d') => match self.selected_task() {
				Some(task) => {
					self.mode = Mode::ConfirmDelete {
						task_id: task.id.clone(),
						title: task.title.clone(),
					};
				}
				None => self.status = "No task selected".to_string(),
			},
			KeyCode::Tab => self.select_period(self.period.next()),
			KeyCode::Char('1') => self.select_period(Period::Today),
			KeyCode::Char('2') => self.select_period(Period::Week),
			KeyCode::Char('3') => self.select_period(Period::Month),
			KeyCode::Char('c') => self.mode = Mode::Calendar(DatePicker::new(self.cursor)),
			KeyCode::Char('t') => {
				let today = self.today(now);
				self.set_cursor(today);
			}
			KeyCode::Char('i') => {
				self.mode = Mode::Insight(InsightPanel::Pending {
					label: period_label(self.period, self.cursor),
				});
			}
			_ => {}
		}
	}

	fn handle_add_task_key(&mut self, code: KeyCode, now: DateTime<Utc>) {
		let Mode::AddTask { input } = &mut self.mode else {
			return;
		};
		match code {
			KeyCode::Esc => self.mode = Mode::Normal,
			KeyCode::Backspace => {
				input.pop();
			}
			KeyCode::Char(value) => input.push(value),
			KeyCode::Enter => {
				let title = std::mem::take(input);
				self.mode = Mode::Normal;
				self.add_task(&title, now);
			}
			_ => {}
		}
	}

	fn handle_confirm_key(&mut self, code: KeyCode, now: DateTime<Utc>) {
		let Mode::ConfirmDelete { task_id, .. } = &self.mode else {
			return;
		};
		match code {
			KeyCode::Char('y') | KeyCode::Enter => {
				let task_id = task_id.clone();
				self.mode = Mode::Normal;
				self.delete_task(&task_id, now);
			}
			KeyCode::Char('n') | KeyCode::Esc => {
				self.mode = Mode::Normal;
				self.status = "Delete cancelled".to_string();
			}
			_ => {}
		}
	}

	fn handle_calendar_key(&mut self, code: KeyCode, now: DateTime<Utc>) {
		let today = self.today(now);
		let Mode::Calendar(picker) = &mut self.mode else {
			return;
		};
		match code {
			KeyCode::Esc => self.mode = Mode::Normal,
			KeyCode::Left | KeyCode::Char('h') => picker.move_days(-1),
			KeyCode::Right | KeyCode::Char('l') => picker.move_days(1),
			KeyCode::Up | KeyCode::Char('k') => picker.move_days(-7),
			KeyCode::Down | KeyCode::Char('j') => picker.move_days(7),
			KeyCode::Char('n') => picker.shift_month(1),
			KeyCode::Char('N') => picker.shift_month(-1),
			KeyCode::Char('t') => *picker = DatePicker::new(today),
			KeyCode::Enter => {
				let selected = picker.selected;
				self.mode = Mode::Normal;
				self.set_cursor(selected);
			}
			_ => {}
		}
	}

	fn move_selection(&mut self, delta: isize) {
		let len = self.tracker.tasks.len();
		if len == 0 {
			self.selected = 0;
			return;
		}
		self.selected = self.selected.saturating_add_signed(delta).min(len - 1);
	}

	pub fn select_period(&mut self, period: Period) {
		self.period = period;
		self.status = format!("Showing {}", period_label(period, self.cursor));
	}

	pub fn set_cursor(&mut self, cursor: NaiveDate) {
		self.cursor = cursor;
		self.status = format!("Showing {}", period_label(self.period, cursor));
	}

	/// Blank titles are ignored without a message.
	pub fn add_task(&mut self, title: &str, now: DateTime<Utc>) {
		let Some(task_id) = self.tracker.add_task(title, None, now) else {
			return;
		};
		self.selected = self
			.tracker
			.tasks
			.iter()
			.position(|task| task.id == task_id)
			.unwrap_or(self.selected);
		self.status = format!("added: {}", title.trim());
		self.persist();
	}

	pub fn toggle_selected(&mut self, now: DateTime<Utc>) {
		let Some(task) = self.selected_task() else {
			self.status = "Add a task first (a)".to_string();
			return;
		};
		let (task_id, title) = (task.id.clone(), task.title.clone());

		self.status = match self.tracker.toggle_timer(&task_id, now) {
			Ok(TimerChange::Started) => format!("started: {title}"),
			Ok(TimerChange::Stopped(Some(session))) => {
				format!("stopped: {title} ({})", format_duration(session.duration))
			}
			Ok(TimerChange::Stopped(None)) => format!("stopped: {title}"),
			Err(err) => format!("error: {err}"),
		};
		self.persist();
	}

	pub fn delete_task(&mut self, task_id: &str, now: DateTime<Utc>) {
		let Some(removed) = self.tracker.delete_task(task_id, now) else {
			self.status = "Task no longer exists".to_string();
			return;
		};
		self.selected = self.selected.min(self.tracker.tasks.len().saturating_sub(1));
		self.status = format!("deleted: {}", removed.title);
		self.persist();
	}

	pub fn has_pending_insight(&self) -> bool {
		matches!(self.mode, Mode::Insight(InsightPanel::Pending { .. }))
	}

	/// Runs the insight request for the current period and cursor.
	pub fn resolve_pending_insight(&mut self, service: &impl InsightService) {
		let Mode::Insight(InsightPanel::Pending { label }) = &self.mode else {
			return;
		};
		let label = label.clone();
		let summary = aggregate(&self.tracker.tasks, self.period, self.cursor, &self.tz);
		let text = service.summarize(&digests(&summary), &label);
		self.mode = Mode::Insight(InsightPanel::Ready { label, text });
	}

	fn persist(&mut self) {
		match save_tracker(&mut self.store, &self.tracker) {
			Ok(()) => info!(tasks = self.tracker.tasks.len(), "store updated"),
			Err(err) => {
				warn!(%err, "failed to write store");
				self.status = format!("error: failed to save: {err}");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::time::{Duration as StdDuration, Instant};

	use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
	use crossterm::event::KeyCode;

	use crate::domain::{TimeSession, Tracker};
	use crate::insight::{InsightService, TaskDigest};
	use crate::stats::Period;
	use crate::storage::{ACTIVE_TASK_KEY, KeyValueStore, MemoryStore, load_tracker};

	use super::{App, InsightPanel, Mode, RefreshTimer};

	struct RecordingInsight {
		calls: RefCell<Vec<(Vec<TaskDigest>, String)>>,
	}

	impl InsightService for RecordingInsight {
		fn summarize(&self, digests: &[TaskDigest], period_label: &str) -> String {
			self.calls
				.borrow_mut()
				.push((digests.to_vec(), period_label.to_string()));
			"Nice focus.".to_string()
		}
	}

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 10, 21, 9, 0, 0).unwrap()
	}

	fn app() -> App<MemoryStore, Utc> {
		App::new(Tracker::default(), MemoryStore::default(), Utc, now())
	}

	fn type_text(app: &mut App<MemoryStore, Utc>, text: &str) {
		for value in text.chars() {
			app.handle_key(KeyCode::Char(value), now());
		}
	}

	#[test]
	fn refresh_timer_follows_the_running_state() {
		let start = Instant::now();
		let mut timer = RefreshTimer::new(StdDuration::from_secs(1));
		assert!(!timer.is_armed());
		assert_eq!(timer.poll_timeout(start), StdDuration::from_secs(30));

		timer.sync(true, start);
		assert!(timer.is_armed());
		assert!(!timer.fire(start));
		assert!(timer.fire(start + StdDuration::from_secs(1)));
		assert_eq!(
			timer.poll_timeout(start + StdDuration::from_millis(1500)),
			StdDuration::from_millis(500)
		);

		timer.sync(false, start);
		assert!(!timer.is_armed());
	}

	#[test]
	fn add_task_modal_creates_and_persists() {
		let mut app = app();
		app.handle_key(KeyCode::Char('a'), now());
		type_text(&mut app, "Readx");
		app.handle_key(KeyCode::Backspace, now());
		type_text(&mut app, "ing");
		app.handle_key(KeyCode::Enter, now());

		assert_eq!(app.mode, Mode::Normal);
		assert_eq!(app.tracker.tasks.len(), 1);
		assert_eq!(app.tracker.tasks[0].title, "Reading");
		assert_eq!(load_tracker(&app.store).tasks.len(), 1);
	}

	#[test]
	fn blank_title_is_a_silent_no_op() {
		let mut app = app();
		app.handle_key(KeyCode::Char('a'), now());
		type_text(&mut app, "   ");
		app.handle_key(KeyCode::Enter, now());
		assert!(app.tracker.tasks.is_empty());
		assert!(app.store.get("tasks").is_none());
	}

	#[test]
	fn space_toggles_the_selected_timer_and_arms_refresh() {
		let mut app = app();
		app.add_task("Reading", now());
		app.handle_key(KeyCode::Char(' '), now());

		let clock = Instant::now();
		app.sync_refresh(clock);
		assert!(app.refresh.is_armed());
		assert!(app.store.get(ACTIVE_TASK_KEY).is_some());

		app.handle_key(KeyCode::Char(' '), now() + Duration::milliseconds(125_000));
		app.sync_refresh(clock);
		assert!(!app.refresh.is_armed());
		assert_eq!(app.status, "stopped: Reading (02:05)");
		assert_eq!(app.tracker.tasks[0].sessions[0].duration, 125_000);
	}

	#[test]
	fn delete_requires_confirmation() {
		let mut app = app();
		app.add_task("A", now());
		app.add_task("B", now());
		app.handle_key(KeyCode::Char(' '), now());

		app.handle_key(KeyCode::Char('d'), now());
		app.handle_key(KeyCode::Char('n'), now());
		assert_eq!(app.tracker.tasks.len(), 2);

		app.handle_key(KeyCode::Char('d'), now());
		app.handle_key(KeyCode::Char('y'), now());
		assert_eq!(app.tracker.tasks.len(), 1);
		assert_eq!(app.tracker.tasks[0].title, "A");
		assert_eq!(app.selected, 0);
		assert!(app.tracker.active_task_id().is_none());
	}

	#[test]
	fn calendar_picker_moves_the_cursor() {
		let mut app = app();
		app.handle_key(KeyCode::Char('c'), now());
		app.handle_key(KeyCode::Down, now());
		app.handle_key(KeyCode::Char('N'), now());
		app.handle_key(KeyCode::Right, now());
		app.handle_key(KeyCode::Enter, now());

		assert_eq!(app.mode, Mode::Normal);
		assert_eq!(app.cursor, NaiveDate::from_ymd_opt(2026, 9, 29).expect("date"));

		app.handle_key(KeyCode::Char('t'), now());
		assert_eq!(app.cursor, NaiveDate::from_ymd_opt(2026, 10, 21).expect("date"));
	}

	#[test]
	fn insight_uses_the_selected_window() {
		let mut app = app();
		app.add_task("Reading", now());
		let start = now() - Duration::days(1);
		app.tracker.tasks[0]
			.sessions
			.push(TimeSession::closed(start, start + Duration::minutes(65)));
		app.handle_key(KeyCode::Char('2'), now());
		app.handle_key(KeyCode::Char('i'), now());
		assert!(app.has_pending_insight());

		let service = RecordingInsight {
			calls: RefCell::new(Vec::new()),
		};
		app.resolve_pending_insight(&service);

		let calls = service.calls.borrow();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].0[0].total_duration_human, "1h 5m");
		assert_eq!(calls[0].1, "Week 2026-10-19 - 2026-10-25");
		assert_eq!(
			app.mode,
			Mode::Insight(InsightPanel::Ready {
				label: "Week 2026-10-19 - 2026-10-25".to_string(),
				text: "Nice focus.".to_string(),
			})
		);
		assert_eq!(app.period, Period::Week);
	}

	#[test]
	fn quitting_cancels_the_refresh_timer() {
		let mut app = app();
		app.add_task("A", now());
		app.handle_key(KeyCode::Char(' '), now());
		app.sync_refresh(Instant::now());
		app.handle_key(KeyCode::Char('q'), now());
		assert!(!app.running);
		assert!(!app.refresh.is_armed());
	}
}
