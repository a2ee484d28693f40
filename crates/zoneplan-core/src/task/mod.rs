//! Task types for zone scheduling.
//!
//! A task carries everything the scheduler needs: its zone, how long it
//! takes, when it is due, its position in a sequence group, whether it may
//! be split into chunks, and which tasks must be placed before it.

pub mod sequence;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SplitError, ValidationError};
use crate::zone::{EnergyLevel, ZoneType};

/// Placement status reported back to the task source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has committed placements
    Scheduled,
    /// Task was rejected or could not be placed
    Unscheduled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Scheduled => write!(f, "scheduled"),
            TaskStatus::Unscheduled => write!(f, "unscheduled"),
        }
    }
}

fn default_max_splits() -> u32 {
    1
}

/// A unit of work to schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Calendar title
    pub title: String,
    /// Total work in minutes
    pub duration_minutes: u32,
    /// Deadline, earlier deadlines are placed first across groups
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    /// Ordering group; tasks of one group keep their `sequence` order
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub sequence: u32,
    pub zone: ZoneType,
    /// Energy the task needs; the zone must provide at least this much
    #[serde(default)]
    pub energy: EnergyLevel,
    #[serde(default)]
    pub splittable: bool,
    /// Smallest chunk when split (minutes)
    #[serde(default)]
    pub min_chunk_minutes: u32,
    /// Upper bound on chunk count; 1 for unsplittable tasks
    #[serde(default = "default_max_splits")]
    pub max_splits: u32,
    /// Extra idle time required around the task's blocks (minutes)
    #[serde(default)]
    pub buffer_minutes: u32,
    /// Tasks that must be placed (and end) before this one starts
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Task {
    /// Create an unsplittable task with no deadline, group or dependencies.
    pub fn new(id: impl Into<String>, title: impl Into<String>, duration_minutes: u32, zone: ZoneType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            duration_minutes,
            due: None,
            group: String::new(),
            sequence: 0,
            zone,
            energy: EnergyLevel::default(),
            splittable: false,
            min_chunk_minutes: 0,
            max_splits: 1,
            buffer_minutes: 0,
            dependencies: Vec::new(),
        }
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_sequence(mut self, group: impl Into<String>, sequence: u32) -> Self {
        self.group = group.into();
        self.sequence = sequence;
        self
    }

    pub fn with_energy(mut self, energy: EnergyLevel) -> Self {
        self.energy = energy;
        self
    }

    /// Allow splitting into at most `max_splits` chunks of at least `min_chunk_minutes`.
    pub fn with_splitting(mut self, min_chunk_minutes: u32, max_splits: u32) -> Self {
        self.splittable = true;
        self.min_chunk_minutes = min_chunk_minutes;
        self.max_splits = max_splits;
        self
    }

    pub fn with_buffer(mut self, minutes: u32) -> Self {
        self.buffer_minutes = minutes;
        self
    }

    pub fn with_dependency(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }

    pub fn depends_on(&self, task_id: &str) -> bool {
        self.dependencies.iter().any(|d| d == task_id)
    }

    /// Check the task's own fields.
    ///
    /// Zone-dependent rules (energy, zone minimum) are checked by the scheduler,
    /// which knows the catalogue.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "id".to_string(),
                message: "task id must not be empty".to_string(),
            });
        }
        if self.duration_minutes == 0 {
            return Err(ValidationError::NonPositiveDuration {
                task_id: self.id.clone(),
            });
        }

        let settings = |message: &str| ValidationError::InvalidSplitSettings {
            task_id: self.id.clone(),
            message: message.to_string(),
        };
        if self.max_splits == 0 {
            return Err(settings("max_splits must be at least 1"));
        }
        if self.splittable {
            if self.min_chunk_minutes == 0 {
                return Err(settings("min_chunk_minutes must be positive for splittable tasks"));
            }
            if self.min_chunk_minutes > self.duration_minutes {
                return Err(settings("min_chunk_minutes exceeds the task duration"));
            }
        } else if self.max_splits != 1 {
            return Err(settings("unsplittable tasks must have max_splits = 1"));
        }

        if self.depends_on(&self.id) {
            return Err(ValidationError::SelfDependency {
                task_id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Break the task into chunks of the given durations.
    ///
    /// # Errors
    ///
    /// Fails when the task is not splittable, the durations do not sum to the
    /// task duration, there are more than `max_splits` of them, or one is
    /// shorter than `min_chunk_minutes`.
    pub fn split(&self, durations: &[u32]) -> Result<Vec<Chunk>, SplitError> {
        if !self.splittable {
            return Err(SplitError::NotSplittable {
                task_id: self.id.clone(),
            });
        }
        if durations.is_empty() || durations.len() > self.max_splits as usize {
            return Err(SplitError::TooManyChunks {
                task_id: self.id.clone(),
                max: self.max_splits,
                requested: durations.len(),
            });
        }

        let total: u32 = durations.iter().sum();
        if total != self.duration_minutes {
            return Err(SplitError::SumMismatch {
                task_id: self.id.clone(),
                expected: self.duration_minutes,
                actual: total,
            });
        }

        let chunk_count = durations.len() as u32;
        durations
            .iter()
            .enumerate()
            .map(|(i, &minutes)| {
                if minutes < self.min_chunk_minutes {
                    return Err(SplitError::ChunkTooShort {
                        task_id: self.id.clone(),
                        chunk_index: i as u32,
                        minutes,
                        minimum: self.min_chunk_minutes,
                    });
                }
                Ok(Chunk {
                    task_id: self.id.clone(),
                    chunk_index: i as u32,
                    chunk_count,
                    duration_minutes: minutes,
                })
            })
            .collect()
    }
}

/// One piece of a split task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub task_id: String,
    /// 0-based position; chunk i is scheduled before chunk i + 1
    pub chunk_index: u32,
    pub chunk_count: u32,
    pub duration_minutes: u32,
}
