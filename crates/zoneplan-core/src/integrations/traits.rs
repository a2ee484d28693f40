use crate::error::AdapterError;
use crate::task::{Task, TaskStatus};
use crate::timeblock::{Event, EventId, Interval, TimeBlock};

/// Where tasks come from and where their status goes back to.
///
/// Implementations are synchronous and may block; the planning service runs
/// them on the blocking pool.
pub trait TaskSource: Send + Sync {
    /// Unique identifier (e.g. "memory", "json-file").
    fn name(&self) -> &str;

    /// All tasks that should be considered by a run.
    fn fetch_tasks(&self) -> Result<Vec<Task>, AdapterError>;

    /// Record the outcome of a run for one task.
    fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), AdapterError>;
}

/// The calendar placements are read from and written to.
pub trait CalendarSource: Send + Sync {
    /// Unique identifier (e.g. "memory", "json-file").
    fn name(&self) -> &str;

    /// Events overlapping `window`, tagged Fixed or Managed.
    fn sync_events(&self, window: &Interval) -> Result<Vec<Event>, AdapterError>;

    /// Store a placement as a managed entry and return its calendar id.
    fn create_event(&self, block: &TimeBlock) -> Result<EventId, AdapterError>;

    /// Delete an entry by id.
    fn delete_event(&self, id: &EventId) -> Result<(), AdapterError>;
}
