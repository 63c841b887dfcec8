use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};

const GRID_CELLS: usize = 42;

/// Renders `MM:SS`, switching to `HH:MM:SS` once the hour component is non-zero.
pub fn format_duration(ms: i64) -> String {
    let total_seconds = ms.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Renders a coarse `"2h 5m"` phrase; the hour segment is dropped when zero.
pub fn format_duration_human(ms: i64) -> String {
    let total_minutes = ms.max(0) / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

pub fn start_of_day(moment: NaiveDateTime) -> NaiveDateTime {
    moment.date().and_time(NaiveTime::MIN)
}

pub fn end_of_day(moment: NaiveDateTime) -> NaiveDateTime {
    last_instant_before(moment.date() + Duration::days(1))
}

/// Weeks start on Monday. Sunday counts as day 7 of the week it closes.
pub fn start_of_week(moment: NaiveDateTime) -> NaiveDateTime {
    let weekday = i64::from(moment.weekday().num_days_from_sunday());
    let day_index = if weekday == 0 { 7 } else { weekday };
    let monday = moment.date() + Duration::days(1 - day_index);
    monday.and_time(NaiveTime::MIN)
}

pub fn end_of_week(moment: NaiveDateTime) -> NaiveDateTime {
    let sunday = start_of_week(moment).date() + Duration::days(6);
    end_of_day(sunday.and_time(NaiveTime::MIN))
}

pub fn start_of_month(moment: NaiveDateTime) -> NaiveDateTime {
    first_of_month(moment.date()).and_time(NaiveTime::MIN)
}

pub fn end_of_month(moment: NaiveDateTime) -> NaiveDateTime {
    // Any date 31 days past the 1st lands in the following month.
    let next_month = first_of_month(moment.date()) + Duration::days(31);
    last_instant_before(first_of_month(next_month))
}

/// Six rows of seven days starting at the Sunday on or before the 1st.
///
/// Leading and trailing cells belong to the neighbouring months; callers tell
/// them apart by comparing `month()` against the requested month. Returns
/// `None` for a month outside `1..=12`.
pub fn calendar_grid(year: i32, month: u32) -> Option<Vec<NaiveDate>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = i64::from(first.weekday().num_days_from_sunday());
    let origin = first - Duration::days(offset);
    Some(origin.iter_days().take(GRID_CELLS).collect())
}

pub fn is_same_day<A: Datelike, B: Datelike>(left: &A, right: &B) -> bool {
    left.year() == right.year() && left.month() == right.month() && left.day() == right.day()
}

/// Moves by whole months, clamping the day to the length of the target month.
pub fn shift_month(day: NaiveDate, delta: i32) -> NaiveDate {
    let months = Months::new(delta.unsigned_abs());
    let shifted = if delta >= 0 {
        day.checked_add_months(months)
    } else {
        day.checked_sub_months(months)
    };
    shifted.unwrap_or(day)
}

pub fn first_of_month(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.day0()))
}

fn last_instant_before(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN) - Duration::milliseconds(1)
}
