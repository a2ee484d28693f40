//! Conflict detection against the working event set.
//!
//! Every candidate placement is checked for double-booking, zone-transition
//! buffers and zone coverage. The same rules drive the slot search, so a
//! slot returned by [`ConflictDetector::find_available_slot`] always passes
//! [`ConflictDetector::validate_placement`].

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::task::Task;
use crate::timeblock::{Event, EventId, Interval};
use crate::zone::{TimeBlockZone, ZoneCatalogue, ZoneType};

/// Why a candidate placement is not allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Overlaps an existing event
    DoubleBooking,
    /// Not inside a window of the task's zone
    ZoneMismatch,
    /// Too close to a neighbouring event
    BufferViolation,
    /// Longer than the zone allows or than any of its windows
    ZoneCapacityExceeded,
}

/// A rejected candidate and what it collided with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConflict {
    pub candidate: Interval,
    pub existing: Interval,
    pub event_id: Option<EventId>,
    pub against_fixed: bool,
    pub reason: ConflictReason,
}

/// A neighbour closer than the required transition gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTransitionConflict {
    pub candidate: Interval,
    pub neighbor_id: EventId,
    pub neighbor: Interval,
    pub candidate_zone: ZoneType,
    pub neighbor_zone: Option<ZoneType>,
    pub neighbor_fixed: bool,
    pub required_gap: u32,
    pub actual_gap: i64,
}

impl ZoneTransitionConflict {
    pub fn to_scheduling_conflict(&self) -> SchedulingConflict {
        SchedulingConflict {
            candidate: self.candidate,
            existing: self.neighbor,
            event_id: Some(self.neighbor_id.clone()),
            against_fixed: self.neighbor_fixed,
            reason: ConflictReason::BufferViolation,
        }
    }
}

/// Stateless checker bound to a zone catalogue.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector<'a> {
    catalogue: &'a ZoneCatalogue,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(catalogue: &'a ZoneCatalogue) -> Self {
        Self { catalogue }
    }

    /// Energy compatibility: the zone must provide at least what the task needs.
    pub fn check_compatibility(&self, task: &Task, zone: &TimeBlockZone) -> Result<(), ValidationError> {
        if zone.energy < task.energy {
            return Err(ValidationError::IncompatibleEnergy {
                task_id: task.id.clone(),
                zone: zone.zone_type,
                required: task.energy,
                available: zone.energy,
            });
        }
        Ok(())
    }

    /// Gap required between a block in `zone` and a neighbour in `neighbor`.
    pub fn required_gap(&self, zone: ZoneType, neighbor: Option<ZoneType>, task_buffer: u32) -> u32 {
        self.catalogue.buffer_between(zone, neighbor).max(task_buffer)
    }

    /// Events overlapping the candidate.
    pub fn find_conflicts(&self, candidate: &Interval, events: &[Event]) -> Vec<SchedulingConflict> {
        events
            .iter()
            .filter(|e| e.interval.overlaps(candidate))
            .map(|e| SchedulingConflict {
                candidate: *candidate,
                existing: e.interval,
                event_id: Some(e.id.clone()),
                against_fixed: !e.is_managed(),
                reason: ConflictReason::DoubleBooking,
            })
            .collect()
    }

    /// Non-overlapping events that sit closer to the candidate than the gap they require.
    pub fn find_zone_transition_conflicts(
        &self,
        candidate: &Interval,
        zone: ZoneType,
        task_buffer: u32,
        events: &[Event],
    ) -> Vec<ZoneTransitionConflict> {
        events
            .iter()
            .filter(|e| !e.interval.overlaps(candidate))
            .filter_map(|e| {
                let actual = if e.interval.end <= candidate.start {
                    e.interval.gap_to(candidate)
                } else {
                    candidate.gap_to(&e.interval)
                };
                let required = self.required_gap(zone, e.zone, task_buffer);
                (actual < i64::from(required)).then(|| self.transition(candidate, zone, e, required, actual))
            })
            .collect()
    }

    fn transition(
        &self,
        candidate: &Interval,
        zone: ZoneType,
        neighbor: &Event,
        required_gap: u32,
        actual_gap: i64,
    ) -> ZoneTransitionConflict {
        ZoneTransitionConflict {
            candidate: *candidate,
            neighbor_id: neighbor.id.clone(),
            neighbor: neighbor.interval,
            candidate_zone: zone,
            neighbor_zone: neighbor.zone,
            neighbor_fixed: !neighbor.is_managed(),
            required_gap,
            actual_gap,
        }
    }

    /// All reasons a placement of `candidate` in `zone` would be refused.
    ///
    /// Empty means the placement is valid.
    pub fn validate_placement(
        &self,
        candidate: &Interval,
        zone: &TimeBlockZone,
        task_buffer: u32,
        events: &[Event],
    ) -> Vec<SchedulingConflict> {
        let mut conflicts = Vec::new();

        let minutes = candidate.duration_minutes();
        if minutes < i64::from(zone.min_duration) || !zone.accepts_duration(minutes.max(0) as u32) {
            conflicts.push(SchedulingConflict {
                candidate: *candidate,
                existing: *candidate,
                event_id: None,
                against_fixed: false,
                reason: ConflictReason::ZoneCapacityExceeded,
            });
        }

        let inside_zone = self
            .catalogue
            .windows(zone, candidate)
            .iter()
            .any(|w| w.covers(candidate));
        if !inside_zone {
            conflicts.push(SchedulingConflict {
                candidate: *candidate,
                existing: *candidate,
                event_id: None,
                against_fixed: false,
                reason: ConflictReason::ZoneMismatch,
            });
        }

        conflicts.extend(self.find_conflicts(candidate, events));
        conflicts.extend(
            self.find_zone_transition_conflicts(candidate, zone.zone_type, task_buffer, events)
                .iter()
                .map(ZoneTransitionConflict::to_scheduling_conflict),
        );
        conflicts
    }

    /// Earliest conflict-free interval of `minutes` inside `window`.
    ///
    /// Returns `None` when the duration exceeds the zone maximum or nothing fits.
    pub fn find_available_slot(
        &self,
        zone: &TimeBlockZone,
        minutes: u32,
        window: &Interval,
        events: &[Event],
        task_buffer: u32,
    ) -> Option<Interval> {
        if minutes == 0 || !zone.accepts_duration(minutes) {
            return None;
        }

        let mut cursor = window.start;
        loop {
            let candidate = Interval::from_minutes(cursor, minutes);
            if candidate.end > window.end {
                return None;
            }

            // Jump past whatever blocks the candidate, then retry.
            let overlap_end = events
                .iter()
                .filter(|e| e.interval.overlaps(&candidate))
                .map(|e| e.interval.end)
                .max();
            if let Some(end) = overlap_end {
                cursor = end;
                continue;
            }

            let transitions = self.find_zone_transition_conflicts(&candidate, zone.zone_type, task_buffer, events);
            let Some(conflict) = transitions.first() else {
                return Some(candidate);
            };

            let required = Duration::minutes(i64::from(conflict.required_gap));
            cursor = if conflict.neighbor.end <= candidate.start {
                conflict.neighbor.end + required
            } else {
                conflict.neighbor.end
            };
        }
    }

    /// Free parts of `window`, with every event widened by the gap it requires.
    pub fn free_intervals(
        &self,
        zone: &TimeBlockZone,
        window: &Interval,
        events: &[Event],
        task_buffer: u32,
    ) -> Vec<Interval> {
        let mut blocked: Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> = events
            .iter()
            .map(|e| {
                let gap = Duration::minutes(i64::from(self.required_gap(zone.zone_type, e.zone, task_buffer)));
                (e.interval.start - gap, e.interval.end + gap)
            })
            .filter(|(start, end)| *start < window.end && *end > window.start)
            .collect();
        blocked.sort();

        let mut free = Vec::new();
        let mut cursor = window.start;
        for (start, end) in blocked {
            if start > cursor {
                if let Some(gap) = Interval::clipped(cursor, start, window) {
                    free.push(gap);
                }
            }
            cursor = cursor.max(end);
        }
        if let Some(tail) = Interval::clipped(cursor, window.end, window) {
            free.push(tail);
        }
        free
    }

    /// Explain why no slot of `minutes` exists in `windows`.
    pub fn diagnose(
        &self,
        zone: &TimeBlockZone,
        minutes: u32,
        windows: &[Interval],
        events: &[Event],
    ) -> Vec<SchedulingConflict> {
        let longest = windows.iter().map(Interval::duration_minutes).max().unwrap_or(0);
        if !zone.accepts_duration(minutes) || i64::from(minutes) > longest {
            return windows
                .iter()
                .take(1)
                .map(|w| SchedulingConflict {
                    candidate: Interval::from_minutes(w.start, minutes),
                    existing: *w,
                    event_id: None,
                    against_fixed: false,
                    reason: ConflictReason::ZoneCapacityExceeded,
                })
                .collect();
        }

        let mut conflicts: Vec<SchedulingConflict> = Vec::new();
        for window in windows {
            for conflict in self.find_conflicts(window, events) {
                if !conflicts.iter().any(|c| c.event_id == conflict.event_id) {
                    conflicts.push(conflict);
                }
            }
        }
        if conflicts.is_empty() {
            // Windows are clear of overlaps, so only transition gaps can be in the way.
            for window in windows {
                let candidate = Interval::from_minutes(window.start, minutes);
                for transition in self.find_zone_transition_conflicts(&candidate, zone.zone_type, 0, events) {
                    conflicts.push(transition.to_scheduling_conflict());
                }
            }
        }
        conflicts
    }
}
