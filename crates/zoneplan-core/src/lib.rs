//! # Zoneplan Core Library
//!
//! Zone-aware task scheduling: tasks are placed onto a calendar timeline in
//! daily windows ("zones") that match their energy and focus needs, around
//! externally owned calendar entries. The library performs no I/O of its own
//! beyond the bundled adapters; the `zoneplan` CLI is a thin host over it.
//!
//! ## Architecture
//!
//! - **Zones**: Deep/Light/Admin catalogue with duration bounds, buffers and
//!   daily ranges expanded across a planning horizon
//! - **Scheduler**: run state machine that orders tasks, finds slots, splits
//!   tasks that do not fit whole and commits placements incrementally
//! - **Conflict detection**: overlap and zone-transition checks, slot search
//! - **Integrations**: task source and calendar traits, resilience wrapper,
//!   in-memory and JSON-file adapters
//! - **Service**: fetch, compute and persist pipeline
//!
//! ## Key Components
//!
//! - [`Scheduler`]: `schedule_tasks`, `clean`, `reschedule`
//! - [`ZoneCatalogue`]: validated zone definitions
//! - [`PlanningService`]: end-to-end run against collaborators
//! - [`Config`]: TOML configuration

pub mod config;
pub mod conflict;
pub mod error;
pub mod integrations;
pub mod scheduler;
pub mod service;
pub mod split;
pub mod task;
pub mod timeblock;
pub mod zone;

pub use config::{AdapterSettings, Config, SchedulerSettings, StrategyKind};
pub use conflict::{ConflictDetector, ConflictReason, SchedulingConflict, ZoneTransitionConflict};
pub use error::{AdapterError, ConfigError, CoreError, Result, SchedulingError, SplitError, ValidationError};
pub use integrations::{CalendarSource, Guarded, TaskSource};
pub use scheduler::{
    CleanResult, FailurePolicy, RunState, ScheduleAbort, ScheduleReport, ScheduleResult, Scheduler,
    SchedulerConfig, SchedulingStrategy, SequenceBasedStrategy, TaskFailure, TaskRejection, ZoneAwareStrategy,
};
pub use service::{PlanMode, PlanningService, ServiceError, SyncSummary};
pub use split::{SplitMetrics, SplitStrategy};
pub use task::{Chunk, Task, TaskStatus};
pub use timeblock::{Event, EventId, EventSet, Interval, Ownership, PlanningHorizon, TimeBlock};
pub use zone::{DailyRange, EnergyLevel, InterruptionPolicy, TimeBlockZone, ZoneCatalogue, ZoneType};
