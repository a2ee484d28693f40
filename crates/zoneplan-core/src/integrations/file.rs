//! JSON-file task source and calendar.
//!
//! The task file is either a plain array of tasks or an object with a
//! `tasks` array and a `status` map that [`TaskSource::update_status`]
//! writes to. The calendar file is an array of [`CalendarEntry`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::marker::{block_to_entry, entry_to_event, CalendarEntry};
use super::traits::{CalendarSource, TaskSource};
use crate::error::AdapterError;
use crate::task::{Task, TaskStatus};
use crate::timeblock::{Event, EventId, Interval, TimeBlock};

const TASKS: &str = "json-tasks";
const CALENDAR: &str = "json-calendar";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskDocument {
    tasks: Vec<Task>,
    #[serde(default)]
    status: BTreeMap<String, TaskStatus>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFileFormat {
    Bare(Vec<Task>),
    Document(TaskDocument),
}

fn unavailable(service: &str, path: &Path, err: impl std::fmt::Display) -> AdapterError {
    AdapterError::Unavailable {
        service: service.to_string(),
        message: format!("{}: {err}", path.display()),
    }
}

fn invalid(service: &str, path: &Path, err: impl std::fmt::Display) -> AdapterError {
    AdapterError::InvalidData {
        service: service.to_string(),
        message: format!("{}: {err}", path.display()),
    }
}

fn write_json<T: Serialize>(service: &str, path: &Path, value: &T) -> Result<(), AdapterError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| invalid(service, path, e))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| unavailable(service, path, e))?;
        }
    }
    fs::write(path, json).map_err(|e| unavailable(service, path, e))
}

/// Tasks read from a JSON file.
pub struct JsonTaskFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonTaskFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<TaskDocument, AdapterError> {
        let content = fs::read_to_string(&self.path).map_err(|e| unavailable(TASKS, &self.path, e))?;
        let format: TaskFileFormat = serde_json::from_str(&content).map_err(|e| invalid(TASKS, &self.path, e))?;
        Ok(match format {
            TaskFileFormat::Bare(tasks) => TaskDocument {
                tasks,
                status: BTreeMap::new(),
            },
            TaskFileFormat::Document(doc) => doc,
        })
    }
}

impl TaskSource for JsonTaskFile {
    fn name(&self) -> &str {
        TASKS
    }

    fn fetch_tasks(&self) -> Result<Vec<Task>, AdapterError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.read()?.tasks)
    }

    fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), AdapterError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut doc = self.read()?;
        if !doc.tasks.iter().any(|t| t.id == task_id) {
            return Err(AdapterError::NotFound {
                service: TASKS.to_string(),
                id: task_id.to_string(),
            });
        }
        doc.status.insert(task_id.to_string(), status);
        write_json(TASKS, &self.path, &doc)
    }
}

/// Calendar stored as a JSON array of entries. A missing file is an empty calendar.
pub struct JsonCalendarFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonCalendarFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All raw entries in the file.
    pub fn entries(&self) -> Result<Vec<CalendarEntry>, AdapterError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.read()
    }

    fn read(&self) -> Result<Vec<CalendarEntry>, AdapterError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| unavailable(CALENDAR, &self.path, e))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| invalid(CALENDAR, &self.path, e))
    }
}

impl CalendarSource for JsonCalendarFile {
    fn name(&self) -> &str {
        CALENDAR
    }

    fn sync_events(&self, window: &Interval) -> Result<Vec<Event>, AdapterError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.read()?
            .iter()
            .filter(|e| e.start < window.end && window.start < e.end)
            .map(|e| entry_to_event(CALENDAR, e))
            .collect()
    }

    fn create_event(&self, block: &TimeBlock) -> Result<EventId, AdapterError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries = self.read()?;
        let id = uuid::Uuid::new_v4().to_string();
        entries.push(block_to_entry(id.clone(), block));
        entries.sort_by_key(|e| e.start);
        write_json(CALENDAR, &self.path, &entries)?;
        Ok(id)
    }

    fn delete_event(&self, id: &EventId) -> Result<(), AdapterError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries = self.read()?;
        let before = entries.len();
        entries.retain(|e| &e.id != id);
        if entries.len() == before {
            return Err(AdapterError::NotFound {
                service: CALENDAR.to_string(),
                id: id.clone(),
            });
        }
        write_json(CALENDAR, &self.path, &entries)
    }
}
