//! Collaborator boundary: task sources and calendars.

pub mod file;
pub mod marker;
pub mod memory;
pub mod resilience;
pub mod traits;

pub use file::{JsonCalendarFile, JsonTaskFile};
pub use marker::{CalendarEntry, ManagedMarker, TITLE_PREFIX};
pub use memory::{InMemoryCalendar, InMemoryTaskSource};
pub use resilience::{BreakerState, CircuitBreaker, CircuitBreakerConfig, Guarded, RetryPolicy};
pub use traits::{CalendarSource, TaskSource};
