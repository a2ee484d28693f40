//! In-memory task source and calendar.
//!
//! Both keep their state behind a mutex and can be told to fail the next
//! few calls, which is how the resilience layer and the planning service
//! are exercised without a network.

use std::collections::HashMap;
use std::sync::Mutex;

use super::marker::{block_to_entry, entry_to_event, CalendarEntry};
use super::traits::{CalendarSource, TaskSource};
use crate::error::AdapterError;
use crate::task::{Task, TaskStatus};
use crate::timeblock::{Event, EventId, Interval, TimeBlock};

const TASKS: &str = "memory-tasks";
const CALENDAR: &str = "memory-calendar";

fn take_failure(counter: &Mutex<u32>, service: &str) -> Result<(), AdapterError> {
    let mut left = counter.lock().unwrap_or_else(|p| p.into_inner());
    if *left > 0 {
        *left -= 1;
        return Err(AdapterError::Unavailable {
            service: service.to_string(),
            message: "injected failure".to_string(),
        });
    }
    Ok(())
}

/// Task list held in memory.
#[derive(Default)]
pub struct InMemoryTaskSource {
    tasks: Mutex<Vec<Task>>,
    statuses: Mutex<HashMap<String, TaskStatus>>,
    failures: Mutex<u32>,
}

impl InMemoryTaskSource {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Self::default()
        }
    }

    /// Make the next `count` calls fail with a retryable error.
    pub fn fail_next(&self, count: u32) {
        *self.failures.lock().unwrap_or_else(|p| p.into_inner()) = count;
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(task_id)
            .copied()
    }
}

impl TaskSource for InMemoryTaskSource {
    fn name(&self) -> &str {
        TASKS
    }

    fn fetch_tasks(&self) -> Result<Vec<Task>, AdapterError> {
        take_failure(&self.failures, TASKS)?;
        Ok(self.tasks.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), AdapterError> {
        take_failure(&self.failures, TASKS)?;
        let known = self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .any(|t| t.id == task_id);
        if !known {
            return Err(AdapterError::NotFound {
                service: TASKS.to_string(),
                id: task_id.to_string(),
            });
        }
        self.statuses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(task_id.to_string(), status);
        Ok(())
    }
}

/// Calendar held in memory as raw entries.
#[derive(Default)]
pub struct InMemoryCalendar {
    entries: Mutex<Vec<CalendarEntry>>,
    failures: Mutex<u32>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CalendarEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    /// Add an externally owned entry.
    pub fn add_fixed(&self, id: impl Into<String>, title: impl Into<String>, interval: Interval) {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(CalendarEntry {
                id: id.into(),
                title: title.into(),
                description: None,
                start: interval.start,
                end: interval.end,
            });
    }

    /// Make the next `count` calls fail with a retryable error.
    pub fn fail_next(&self, count: u32) {
        *self.failures.lock().unwrap_or_else(|p| p.into_inner()) = count;
    }

    pub fn entries(&self) -> Vec<CalendarEntry> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl CalendarSource for InMemoryCalendar {
    fn name(&self) -> &str {
        CALENDAR
    }

    fn sync_events(&self, window: &Interval) -> Result<Vec<Event>, AdapterError> {
        take_failure(&self.failures, CALENDAR)?;
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .iter()
            .filter(|e| e.start < window.end && window.start < e.end)
            .map(|e| entry_to_event(CALENDAR, e))
            .collect()
    }

    fn create_event(&self, block: &TimeBlock) -> Result<EventId, AdapterError> {
        take_failure(&self.failures, CALENDAR)?;
        let id = uuid::Uuid::new_v4().to_string();
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(block_to_entry(id.clone(), block));
        Ok(id)
    }

    fn delete_event(&self, id: &EventId) -> Result<(), AdapterError> {
        take_failure(&self.failures, CALENDAR)?;
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|e| &e.id != id);
        if entries.len() == before {
            return Err(AdapterError::NotFound {
                service: CALENDAR.to_string(),
                id: id.clone(),
            });
        }
        Ok(())
    }
}
