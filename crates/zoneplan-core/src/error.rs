//! Core error types for zoneplan-core.
//!
//! This module defines the error hierarchy of a scheduling run using
//! thiserror. The split mirrors how each failure is handled:
//!
//! - [`ConfigError`]: zone catalogue missing or malformed, fatal for a run
//! - [`ValidationError`]: a task is rejected, the run continues
//! - [`SchedulingError`] / [`SplitError`]: a task cannot be placed, fail-fast by default
//! - [`AdapterError`]: a collaborator failed, the run aborts

use std::path::PathBuf;
use thiserror::Error;

use crate::conflict::SchedulingConflict;
use crate::zone::{EnergyLevel, ZoneType};

/// Core error type for zoneplan-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Scheduling conflicts that could not be resolved
    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    /// Task splitting failures
    #[error("Splitting error: {0}")]
    Splitting(#[from] SplitError),

    /// Collaborator (task source / calendar) failures
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] AdapterError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// The zone catalogue has no zones
    #[error("Zone catalogue is empty")]
    EmptyCatalogue,

    /// A zone type is defined more than once
    #[error("Zone '{0}' is defined more than once")]
    DuplicateZone(ZoneType),

    /// A zone type requested by a task is not in the catalogue
    #[error("Zone '{0}' is not defined in the zone catalogue")]
    UndefinedZone(ZoneType),

    /// Two daily ranges overlap
    #[error("Zone '{first}' ({first_range}) overlaps zone '{second}' ({second_range})")]
    OverlappingZones {
        first: ZoneType,
        first_range: String,
        second: ZoneType,
        second_range: String,
    },

    /// A zone definition is internally inconsistent
    #[error("Invalid zone '{zone}': {message}")]
    InvalidZone { zone: ZoneType, message: String },
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end_time ({end}) must be greater than start_time ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Task duration is zero
    #[error("Task '{task_id}' must have a positive duration")]
    NonPositiveDuration { task_id: String },

    /// Split settings contradict each other
    #[error("Task '{task_id}' has inconsistent split settings: {message}")]
    InvalidSplitSettings { task_id: String, message: String },

    /// Task depends on itself
    #[error("Task '{task_id}' depends on itself")]
    SelfDependency { task_id: String },

    /// Task depends on a task that is not part of the run
    #[error("Task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency { task_id: String, dependency: String },

    /// The zone's energy level is below what the task needs
    #[error("Task '{task_id}' needs {required} energy but zone '{zone}' provides {available}")]
    IncompatibleEnergy {
        task_id: String,
        zone: ZoneType,
        required: EnergyLevel,
        available: EnergyLevel,
    },

    /// No block of this task could satisfy the zone's minimum duration
    #[error("Task '{task_id}' ({minutes} min) is shorter than the '{zone}' zone minimum of {zone_minimum} min")]
    BelowZoneMinimum {
        task_id: String,
        zone: ZoneType,
        minutes: u32,
        zone_minimum: u32,
    },

    /// Smallest placement plus buffers never fits one zone window
    #[error("Task '{task_id}' cannot fit {minutes} min plus {buffer} min buffer into any '{zone}' window")]
    BufferInfeasible {
        task_id: String,
        zone: ZoneType,
        minutes: u32,
        buffer: u32,
    },
}

/// Scheduling failures for a single task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    /// No slot and no split could place the task
    #[error("Task '{task_id}' has no feasible '{zone}' slot of {minutes} min within the planning horizon")]
    NoFeasibleSlot {
        task_id: String,
        zone: ZoneType,
        minutes: u32,
        conflicts: Vec<SchedulingConflict>,
    },

    /// Dependencies can never be placed (cycle, rejected or failed dependency)
    #[error("Task '{task_id}' has unresolvable dependencies: {}", .pending.join(", "))]
    UnresolvableDependencies { task_id: String, pending: Vec<String> },

    /// The run was cancelled between task placements
    #[error("Scheduling run cancelled before task '{next_task}'")]
    Cancelled { next_task: String },
}

impl SchedulingError {
    /// Task the failure belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            Self::NoFeasibleSlot { task_id, .. } => task_id,
            Self::UnresolvableDependencies { task_id, .. } => task_id,
            Self::Cancelled { next_task } => next_task,
        }
    }
}

/// Task splitting failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    /// The task does not allow splitting
    #[error("Task '{task_id}' is not splittable")]
    NotSplittable { task_id: String },

    /// Chunk durations do not add up to the task duration
    #[error("Chunks of task '{task_id}' sum to {actual} min, expected {expected} min")]
    SumMismatch {
        task_id: String,
        expected: u32,
        actual: u32,
    },

    /// Too many chunks requested
    #[error("Task '{task_id}' allows at most {max} chunks, got {requested}")]
    TooManyChunks {
        task_id: String,
        max: u32,
        requested: usize,
    },

    /// A chunk is shorter than the minimum chunk duration
    #[error("Chunk {chunk_index} of task '{task_id}' is {minutes} min, below the minimum of {minimum} min")]
    ChunkTooShort {
        task_id: String,
        chunk_index: u32,
        minutes: u32,
        minimum: u32,
    },

    /// No decomposition fits the offered slots
    #[error("No feasible split of task '{task_id}' into at most {max_chunks} chunks across {slot_count} slots")]
    NoFeasibleSplit {
        task_id: String,
        max_chunks: u32,
        slot_count: usize,
    },

    /// A projected chunk failed validation right before commit and no alternative existed
    #[error("Chunk {chunk_index} of task '{task_id}' could not be committed")]
    ChunkRejected {
        task_id: String,
        chunk_index: u32,
        conflicts: Vec<SchedulingConflict>,
    },
}

impl SplitError {
    /// Task the failure belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            Self::NotSplittable { task_id }
            | Self::SumMismatch { task_id, .. }
            | Self::TooManyChunks { task_id, .. }
            | Self::ChunkTooShort { task_id, .. }
            | Self::NoFeasibleSplit { task_id, .. }
            | Self::ChunkRejected { task_id, .. } => task_id,
        }
    }
}

/// Collaborator (adapter) errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// A single call exceeded the per-call timeout
    #[error("{service}: {operation} timed out after {timeout_secs} seconds")]
    Timeout {
        service: String,
        operation: String,
        timeout_secs: u64,
    },

    /// The circuit breaker rejected the call
    #[error("{service}: circuit breaker open, retry after {retry_after_secs}s")]
    CircuitOpen {
        service: String,
        retry_after_secs: u64,
    },

    /// All attempts failed
    #[error("{service}: {operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        service: String,
        operation: String,
        attempts: u32,
        last: Box<AdapterError>,
    },

    /// Requested entity does not exist
    #[error("{service}: '{id}' not found")]
    NotFound { service: String, id: String },

    /// Remote data could not be understood
    #[error("{service}: invalid data: {message}")]
    InvalidData { service: String, message: String },

    /// Transport or storage failure
    #[error("{service}: {message}")]
    Unavailable { service: String, message: String },
}

impl AdapterError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
