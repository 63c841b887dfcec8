use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Task, TimerState, Tracker};

pub const TASKS_KEY: &str = "tasks";
pub const ACTIVE_TASK_KEY: &str = "activeTaskId";
pub const START_TIME_KEY: &str = "startTime";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse store file: {0}")]
    JsonDecode(serde_json::Error),
    #[error("failed to encode store value: {0}")]
    JsonEncode(serde_json::Error),
}

/// String-keyed, string-valued storage in the shape of browser local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// A JSON object on disk, rewritten in full on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Opens `path`, treating a missing or blank file as empty. An unreadable
    /// document is moved aside to `<path>.corrupt` and the store starts empty.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let raw = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let entries = if raw.trim().is_empty() {
            BTreeMap::new()
        } else {
            match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    let backup = corrupt_backup_path(path);
                    warn!(path = %path.display(), backup = %backup.display(), %err, "store file unreadable, starting empty");
                    fs::rename(path, &backup)?;
                    BTreeMap::new()
                }
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let body = serde_json::to_string_pretty(&self.entries).map_err(StorageError::JsonEncode)?;
        fs::write(&self.path, body)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub entries: BTreeMap<String, String>,
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Rebuilds the tracker from the store. Never fails: bad task data loads as an
/// empty list and any inconsistent timer state loads as idle.
pub fn load_tracker(store: &impl KeyValueStore) -> Tracker {
    let tasks = match store.get(TASKS_KEY) {
        Some(raw) => serde_json::from_str::<Vec<Task>>(&raw).unwrap_or_else(|err| {
            warn!(%err, "stored tasks unreadable, starting with none");
            Vec::new()
        }),
        None => Vec::new(),
    };

    let timer = rehydrate_timer(
        &tasks,
        store.get(ACTIVE_TASK_KEY),
        store.get(START_TIME_KEY),
    );
    info!(tasks = tasks.len(), running = timer != TimerState::Idle, "tracker loaded");
    Tracker::from_parts(tasks, timer)
}

fn rehydrate_timer(
    tasks: &[Task],
    active_task_id: Option<String>,
    start_time: Option<String>,
) -> TimerState {
    let (task_id, raw_start) = match (active_task_id, start_time) {
        (Some(task_id), Some(raw_start)) => (task_id, raw_start),
        (None, None) => return TimerState::Idle,
        (task_id, raw_start) => {
            warn!(?task_id, ?raw_start, "partial timer state in store, treating as idle");
            return TimerState::Idle;
        }
    };

    let Some(started_at) = raw_start
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
    else {
        warn!(%raw_start, "stored start time unreadable, treating as idle");
        return TimerState::Idle;
    };

    if !tasks.iter().any(|task| task.id == task_id) {
        warn!(%task_id, "stored active task no longer exists, treating as idle");
        return TimerState::Idle;
    }

    TimerState::Running {
        task_id,
        started_at,
    }
}

pub fn save_tracker(store: &mut impl KeyValueStore, tracker: &Tracker) -> Result<(), StorageError> {
    let tasks = serde_json::to_string(&tracker.tasks).map_err(StorageError::JsonEncode)?;
    store.set(TASKS_KEY, tasks)?;

    match tracker.timer() {
        TimerState::Idle => {
            store.remove(ACTIVE_TASK_KEY)?;
            store.remove(START_TIME_KEY)?;
        }
        TimerState::Running {
            task_id,
            started_at,
        } => {
            store.set(ACTIVE_TASK_KEY, task_id.clone())?;
            store.set(START_TIME_KEY, started_at.timestamp_millis().to_string())?;
        }
    }

    Ok(())
}

fn corrupt_backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{Duration, TimeZone, Utc};

    use crate::domain::{TimerState, Tracker};

    use super::{
        ACTIVE_TASK_KEY, JsonFileStore, KeyValueStore, MemoryStore, START_TIME_KEY, TASKS_KEY,
        load_tracker, save_tracker,
    };

    fn running_tracker() -> (Tracker, String) {
        let mut tracker = Tracker::default();
        let t0 = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let reading = tracker
            .add_task("Reading", Some("green".to_string()), t0)
            .expect("task should be created");
        let writing = tracker
            .add_task("Writing", None, t0)
            .expect("task should be created");
        tracker.start(&reading, t0).expect("start should work");
        tracker
            .start(&writing, t0 + Duration::minutes(20))
            .expect("start should work");
        (tracker, writing)
    }

    #[test]
    fn running_timer_survives_a_reload() {
        let (tracker, writing) = running_tracker();
        let mut store = MemoryStore::default();
        save_tracker(&mut store, &tracker).expect("save should succeed");

        assert_eq!(store.get(ACTIVE_TASK_KEY), Some(writing.clone()));
        let loaded = load_tracker(&store);
        assert_eq!(loaded.tasks, tracker.tasks);
        assert_eq!(loaded.timer(), tracker.timer());

        let later = Utc.with_ymd_and_hms(2026, 10, 19, 9, 25, 0).unwrap();
        assert_eq!(loaded.elapsed(later), 5 * 60_000);
    }

    #[test]
    fn stopping_clears_the_timer_keys() {
        let (mut tracker, _) = running_tracker();
        let mut store = MemoryStore::default();
        save_tracker(&mut store, &tracker).expect("save should succeed");

        tracker.stop(Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap());
        save_tracker(&mut store, &tracker).expect("save should succeed");

        assert!(store.get(ACTIVE_TASK_KEY).is_none());
        assert!(store.get(START_TIME_KEY).is_none());
        assert_eq!(load_tracker(&store).timer(), &TimerState::Idle);
    }

    #[test]
    fn tasks_use_the_camel_case_layout() {
        let (tracker, _) = running_tracker();
        let mut store = MemoryStore::default();
        save_tracker(&mut store, &tracker).expect("save should succeed");

        let raw = store.get(TASKS_KEY).expect("tasks stored");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        let session = &value[0]["sessions"][0];
        assert_eq!(session["duration"], 20 * 60_000);
        assert_eq!(session["startTime"], 1_792_400_400_000_i64);
        assert!(value[0]["createdAt"].is_i64());
    }

    #[test]
    fn inconsistent_timer_state_loads_idle() {
        let (tracker, writing) = running_tracker();
        let mut store = MemoryStore::default();
        save_tracker(&mut store, &tracker).expect("save should succeed");

        store.remove(START_TIME_KEY).expect("remove");
        assert_eq!(load_tracker(&store).timer(), &TimerState::Idle);

        store.set(START_TIME_KEY, "soon".to_string()).expect("set");
        assert_eq!(load_tracker(&store).timer(), &TimerState::Idle);

        store.set(START_TIME_KEY, "1792400400000".to_string()).expect("set");
        store.set(ACTIVE_TASK_KEY, "gone".to_string()).expect("set");
        assert_eq!(load_tracker(&store).timer(), &TimerState::Idle);

        store.set(ACTIVE_TASK_KEY, writing).expect("set");
        assert!(load_tracker(&store).active_task_id().is_some());
    }

    #[test]
    fn malformed_tasks_load_as_empty() {
        let mut store = MemoryStore::default();
        store.set(TASKS_KEY, "{not json".to_string()).expect("set");
        let loaded = load_tracker(&store);
        assert!(loaded.tasks.is_empty());
        assert_eq!(loaded.timer(), &TimerState::Idle);
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("store.json");
        let (tracker, _) = running_tracker();

        let mut store = JsonFileStore::open(&path).expect("open should succeed");
        save_tracker(&mut store, &tracker).expect("save should succeed");

        let reopened = JsonFileStore::open(&path).expect("open should succeed");
        let loaded = load_tracker(&reopened);
        assert_eq!(loaded.tasks.len(), 2);
        assert_eq!(loaded.timer(), tracker.timer());
    }

    #[test]
    fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("store.json");
        fs::write(&path, "][").expect("write");

        let store = JsonFileStore::open(&path).expect("open should succeed");
        assert!(store.get(TASKS_KEY).is_none());
        assert!(dir.path().join("store.json.corrupt").exists());
        assert!(!path.exists());
    }
}
