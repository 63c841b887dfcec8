use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const ID_LEN: usize = 8;

pub const TASK_COLORS: [&str; 8] = [
    "blue",
    "green",
    "magenta",
    "cyan",
    "red",
    "yellow",
    "light_blue",
    "light_magenta",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
}

/// A closed stretch of focus time. `end_time` is absent only for a session
/// that is still running, and those are never stored on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSession {
    pub id: String,
    #[serde(with = "ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(
        default,
        with = "ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<DateTime<Utc>>,
    pub duration: i64,
}

impl TimeSession {
    pub fn closed(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            start_time,
            end_time: Some(end_time),
            duration: (end_time - start_time).num_milliseconds().max(0),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub color: String,
    #[serde(default)]
    pub sessions: Vec<TimeSession>,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn total_duration(&self) -> i64 {
        self.sessions
            .iter()
            .filter(|session| session.is_closed())
            .map(|session| session.duration)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Idle,
    Running {
        task_id: String,
        started_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerChange {
    Started,
    Stopped(Option<TimeSession>),
}

/// The task collection plus the single global timer.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    pub tasks: Vec<Task>,
    timer: TimerState,
}

impl Tracker {
    pub fn from_parts(tasks: Vec<Task>, timer: TimerState) -> Self {
        Self { tasks, timer }
    }

    pub fn timer(&self) -> &TimerState {
        &self.timer
    }

    pub fn active_task_id(&self) -> Option<&str> {
        match &self.timer {
            TimerState::Idle => None,
            TimerState::Running { task_id, .. } => Some(task_id),
        }
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.active_task_id() == Some(task_id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Looks a task up by id first, then by exact title.
    pub fn find_task(&self, key: &str) -> Option<&Task> {
        self.task(key)
            .or_else(|| self.tasks.iter().find(|task| task.title == key))
    }

    /// Milliseconds since the running timer started, zero when idle.
    pub fn elapsed(&self, now: DateTime<Utc>) -> i64 {
        match &self.timer {
            TimerState::Idle => 0,
            TimerState::Running { started_at, .. } => {
                (now - *started_at).num_milliseconds().max(0)
            }
        }
    }

    /// Returns the new task id, or `None` when the title is blank.
    pub fn add_task(
        &mut self,
        title: &str,
        color: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }

        let id = generate_id();
        let color = color.unwrap_or_else(random_color);
        info!(task_id = %id, %title, %color, "task added");
        self.tasks.push(Task {
            id: id.clone(),
            title: title.to_string(),
            color,
            sessions: Vec::new(),
            created_at: now,
        });
        Some(id)
    }

    /// Starts `task_id`, closing whichever session was running before.
    /// Returns the session closed as a side effect, if any.
    pub fn start(
        &mut self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<TimeSession>, TrackerError> {
        if self.task(task_id).is_none() {
            return Err(TrackerError::TaskNotFound(task_id.to_string()));
        }
        if self.is_active(task_id) {
            return Ok(None);
        }

        let closed = self.stop(now);
        self.timer = TimerState::Running {
            task_id: task_id.to_string(),
            started_at: now,
        };
        info!(%task_id, started_at = %now, "timer started");
        Ok(closed)
    }

    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<TimeSession> {
        let TimerState::Running {
            task_id,
            started_at,
        } = std::mem::take(&mut self.timer)
        else {
            return None;
        };

        let task = self.tasks.iter_mut().find(|task| task.id == task_id)?;
        let session = TimeSession::closed(started_at, now);
        info!(%task_id, duration_ms = session.duration, "timer stopped");
        task.sessions.push(session.clone());
        Some(session)
    }

    pub fn toggle_timer(
        &mut self,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TimerChange, TrackerError> {
        if self.is_active(task_id) {
            return Ok(TimerChange::Stopped(self.stop(now)));
        }

        self.start(task_id, now)?;
        Ok(TimerChange::Started)
    }

    /// Removes the task and its history, stopping it first when it is running.
    pub fn delete_task(&mut self, task_id: &str, now: DateTime<Utc>) -> Option<Task> {
        if self.is_active(task_id) {
            self.stop(now);
        }

        let index = self.tasks.iter().position(|task| task.id == task_id)?;
        let removed = self.tasks.remove(index);
        info!(%task_id, sessions = removed.sessions.len(), "task deleted");
        Some(removed)
    }
}

pub fn generate_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

pub fn random_color() -> String {
    TASK_COLORS
        .choose(&mut thread_rng())
        .copied()
        .unwrap_or(TASK_COLORS[0])
        .to_string()
}
