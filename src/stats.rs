use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use clap::ValueEnum;
use tracing::debug;

use crate::calendar::{
    end_of_day, end_of_month, end_of_week, start_of_day, start_of_month, start_of_week,
};
use crate::domain::{Task, Tracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Period {
    #[default]
    Today,
    Week,
    Month,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Today, Period::Week, Period::Month];

    pub fn title(self) -> &'static str {
        match self {
            Period::Today => "Today",
            Period::Week => "Week",
            Period::Month => "Month",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Period::Today => Period::Week,
            Period::Week => Period::Month,
            Period::Month => Period::Today,
        }
    }

    /// Inclusive local wall-clock bounds of the window containing `cursor`.
    pub fn window(self, cursor: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        match self {
            Period::Today => (start_of_day(cursor), end_of_day(cursor)),
            Period::Week => (start_of_week(cursor), end_of_week(cursor)),
            Period::Month => (start_of_month(cursor), end_of_month(cursor)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTotal<'a> {
    pub task: &'a Task,
    pub duration: i64,
}

#[derive(Debug, Clone)]
pub struct PeriodSummary<'a> {
    pub period: Period,
    pub window: (NaiveDateTime, NaiveDateTime),
    /// Tasks with time in the window, longest first.
    pub rows: Vec<TaskTotal<'a>>,
    pub total: i64,
}

/// Per-task focus time for the window around `cursor`.
///
/// Only closed sessions count, and a session belongs to the window its start
/// falls into (as seen in `tz`). Running time is never included here.
pub fn aggregate<'a, Tz: TimeZone>(
    tasks: &'a [Task],
    period: Period,
    cursor: NaiveDate,
    tz: &Tz,
) -> PeriodSummary<'a> {
    let window = period.window(cursor.and_time(NaiveTime::MIN));
    let mut rows = tasks
        .iter()
        .map(|task| TaskTotal {
            task,
            duration: windowed_duration(task, window, tz),
        })
        .filter(|row| row.duration > 0)
        .collect::<Vec<_>>();

    // Stable: equal totals keep collection order.
    rows.sort_by(|left, right| right.duration.cmp(&left.duration));
    let total = rows.iter().map(|row| row.duration).sum();
    debug!(?period, %cursor, tasks = rows.len(), total_ms = total, "aggregated sessions");

    PeriodSummary {
        period,
        window,
        rows,
        total,
    }
}

fn windowed_duration<Tz: TimeZone>(
    task: &Task,
    (start, end): (NaiveDateTime, NaiveDateTime),
    tz: &Tz,
) -> i64 {
    task.sessions
        .iter()
        .filter(|session| session.is_closed())
        .filter(|session| {
            let local = session.start_time.with_timezone(tz).naive_local();
            start <= local && local <= end
        })
        .map(|session| session.duration)
        .sum()
}

/// All-time number of sessions, plus one for a task that is running now.
///
/// This is not windowed: week and month views that need a historical count
/// have to compute one themselves.
pub fn session_count(task: &Task, active_task_id: Option<&str>) -> usize {
    let running = usize::from(active_task_id == Some(task.id.as_str()));
    task.sessions.len() + running
}

/// Today's recorded time for one task, plus the live elapsed time when it is
/// the running task.
pub fn live_today_duration<Tz: TimeZone>(
    tracker: &Tracker,
    task_id: &str,
    now: DateTime<Utc>,
    tz: &Tz,
) -> i64 {
    let today = now.with_timezone(tz).date_naive();
    let recorded = tracker
        .task(task_id)
        .map(|task| windowed_duration(task, Period::Today.window(today.and_time(NaiveTime::MIN)), tz))
        .unwrap_or(0);

    if tracker.is_active(task_id) {
        recorded + tracker.elapsed(now)
    } else {
        recorded
    }
}

/// Today's recorded total across all tasks plus the running timer.
pub fn live_today_total<Tz: TimeZone>(tracker: &Tracker, now: DateTime<Utc>, tz: &Tz) -> i64 {
    let today = now.with_timezone(tz).date_naive();
    aggregate(&tracker.tasks, Period::Today, today, tz).total + tracker.elapsed(now)
}

pub fn period_label(period: Period, cursor: NaiveDate) -> String {
    let (start, end) = period.window(cursor.and_time(NaiveTime::MIN));
    match period {
        Period::Today => format!("Today {}", start.format("%Y-%m-%d")),
        Period::Week => format!(
            "Week {} - {}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ),
        Period::Month => start.format("%B %Y").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use crate::domain::{Task, TimeSession, Tracker};

    use super::{Period, aggregate, live_today_duration, live_today_total, period_label, session_count};

    fn instant(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap()
    }

    fn task(id: &str, sessions: &[(DateTime<Utc>, i64)]) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_uppercase(),
            color: "blue".to_string(),
            sessions: sessions
                .iter()
                .map(|(start, minutes)| TimeSession::closed(*start, *start + Duration::minutes(*minutes)))
                .collect(),
            created_at: instant(1, 0),
        }
    }

    fn cursor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 21).expect("date")
    }

    #[test]
    fn today_counts_only_sessions_started_that_day() {
        let tasks = vec![task("a", &[(instant(21, 9), 30), (instant(20, 9), 45)])];
        let summary = aggregate(&tasks, Period::Today, cursor(), &Utc);

        assert_eq!(summary.rows.len(), 1);
        assert_eq!(summary.rows[0].duration, 30 * 60_000);
        assert_eq!(summary.total, 30 * 60_000);
    }

    #[test]
    fn tasks_without_time_in_window_are_dropped() {
        let tasks = vec![task("a", &[(instant(1, 9), 30)]), task("b", &[]), task("c", &[(instant(21, 23), 5)])];
        let summary = aggregate(&tasks, Period::Today, cursor(), &Utc);
        let ids = summary.rows.iter().map(|row| row.task.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn rows_sort_longest_first_and_keep_order_on_ties() {
        let tasks = vec![
            task("a", &[(instant(19, 9), 10)]),
            task("b", &[(instant(20, 9), 50)]),
            task("c", &[(instant(25, 9), 10)]),
            task("d", &[(instant(26, 9), 90)]),
        ];
        let summary = aggregate(&tasks, Period::Week, cursor(), &Utc);
        let ids = summary.rows.iter().map(|row| row.task.id.as_str()).collect::<Vec<_>>();

        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(summary.total, 70 * 60_000);
    }

    #[test]
    fn month_window_spans_the_calendar_month() {
        let tasks = vec![task(
            "a",
            &[(instant(1, 0), 10), (instant(31, 23), 20), (Utc.with_ymd_and_hms(2026, 9, 30, 23, 59, 59).unwrap(), 40)],
        )];
        let summary = aggregate(&tasks, Period::Month, cursor(), &Utc);
        assert_eq!(summary.total, 30 * 60_000);
    }

    #[test]
    fn running_sessions_are_excluded() {
        let mut tasks = vec![task("a", &[(instant(21, 9), 30)])];
        tasks[0].sessions.push(TimeSession {
            id: "open".to_string(),
            start_time: instant(21, 10),
            end_time: None,
            duration: 999_999,
        });
        let summary = aggregate(&tasks, Period::Today, cursor(), &Utc);
        assert_eq!(summary.total, 30 * 60_000);
    }

    #[test]
    fn count_is_all_time_plus_running() {
        let item = task("a", &[(instant(1, 9), 1), (instant(21, 9), 1)]);
        assert_eq!(session_count(&item, None), 2);
        assert_eq!(session_count(&item, Some("a")), 3);
        assert_eq!(session_count(&item, Some("b")), 2);
    }

    #[test]
    fn live_today_adds_elapsed_only_for_the_active_task() {
        let mut tracker = Tracker::from_parts(
            vec![task("a", &[(instant(21, 8), 30)]), task("b", &[(instant(21, 7), 15)])],
            Default::default(),
        );
        tracker.start("a", instant(21, 9)).expect("start should work");
        let now = instant(21, 9) + Duration::minutes(5);

        assert_eq!(live_today_duration(&tracker, "a", now, &Utc), 35 * 60_000);
        assert_eq!(live_today_duration(&tracker, "b", now, &Utc), 15 * 60_000);
        assert_eq!(live_today_total(&tracker, now, &Utc), 50 * 60_000);
    }

    #[test]
    fn labels_describe_the_window() {
        assert_eq!(period_label(Period::Today, cursor()), "Today 2026-10-21");
        assert_eq!(period_label(Period::Week, cursor()), "Week 2026-10-19 - 2026-10-25");
        assert_eq!(period_label(Period::Month, cursor()), "October 2026");
        assert_eq!(Period::Month.next(), Period::Today);
    }
}
