//! Pluggable placement strategies.
//!
//! A strategy decides the task order and which zone windows are tried, and
//! in which order. Slot search, splitting and conflict checks stay in the
//! scheduler, so every strategy obeys the same placement invariants.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::conflict::ConflictDetector;
use crate::split::SplitStrategy;
use crate::task::sequence::{self, ResolvedOrder};
use crate::task::Task;
use crate::timeblock::{Event, Interval};
use crate::zone::{TimeBlockZone, ZoneCatalogue};

/// What a strategy may look at when proposing windows.
#[derive(Debug, Clone, Copy)]
pub struct PlanningContext<'a> {
    pub catalogue: &'a ZoneCatalogue,
    pub horizon: Interval,
    /// Earliest start allowed for the task (dependencies included)
    pub not_before: DateTime<Utc>,
    pub events: &'a [Event],
}

impl PlanningContext<'_> {
    /// Part of the horizon the task may use.
    pub fn search_span(&self) -> Option<Interval> {
        self.horizon.starting_from(self.not_before.max(self.horizon.start))
    }
}

/// Placement strategy.
pub trait SchedulingStrategy {
    /// Short name for logs and configuration.
    fn name(&self) -> &str;

    /// Order tasks for placement. Defaults to dependency, sequence, due-date ordering.
    fn resolve_order<'t>(&self, tasks: &[&'t Task], placed: &HashSet<String>) -> ResolvedOrder<'t> {
        sequence::resolve_order(tasks, placed)
    }

    /// Zone windows to try for `task`, in preference order.
    fn candidate_windows(&self, task: &Task, zone: &TimeBlockZone, ctx: &PlanningContext<'_>) -> Vec<Interval>;
}

impl<S: SchedulingStrategy + ?Sized> SchedulingStrategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn resolve_order<'t>(&self, tasks: &[&'t Task], placed: &HashSet<String>) -> ResolvedOrder<'t> {
        (**self).resolve_order(tasks, placed)
    }

    fn candidate_windows(&self, task: &Task, zone: &TimeBlockZone, ctx: &PlanningContext<'_>) -> Vec<Interval> {
        (**self).candidate_windows(task, zone, ctx)
    }
}

/// Earliest window first.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceBasedStrategy;

impl SchedulingStrategy for SequenceBasedStrategy {
    fn name(&self) -> &str {
        "sequence"
    }

    fn candidate_windows(&self, _task: &Task, zone: &TimeBlockZone, ctx: &PlanningContext<'_>) -> Vec<Interval> {
        match ctx.search_span() {
            Some(span) => ctx.catalogue.windows(zone, &span),
            None => Vec::new(),
        }
    }
}

/// Least-loaded window first.
///
/// Windows whose free time the zone's interruption policy would not use are
/// dropped; the rest are ordered by how many events already sit in them,
/// then chronologically.
#[derive(Debug, Clone, Default)]
pub struct ZoneAwareStrategy {
    split: SplitStrategy,
}

impl ZoneAwareStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulingStrategy for ZoneAwareStrategy {
    fn name(&self) -> &str {
        "zone_aware"
    }

    fn candidate_windows(&self, task: &Task, zone: &TimeBlockZone, ctx: &PlanningContext<'_>) -> Vec<Interval> {
        let Some(span) = ctx.search_span() else {
            return Vec::new();
        };
        let detector = ConflictDetector::new(ctx.catalogue);

        let mut ranked: Vec<(usize, Interval)> = ctx
            .catalogue
            .windows(zone, &span)
            .into_iter()
            .filter(|window| {
                let free = detector.free_intervals(zone, window, ctx.events, task.buffer_minutes);
                !self.split.analyze_zone_patterns(zone, &free).is_empty()
            })
            .map(|window| {
                let load = ctx.events.iter().filter(|e| e.interval.overlaps(&window)).count();
                (load, window)
            })
            .collect();

        ranked.sort_by_key(|(load, window)| (*load, window.start));
        ranked.into_iter().map(|(_, window)| window).collect()
    }
}
