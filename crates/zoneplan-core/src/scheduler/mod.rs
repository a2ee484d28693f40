//! Zone-aware scheduler.
//!
//! A run takes tasks, the zone catalogue and the current calendar events and
//! produces placements:
//! - rejects tasks that fail validation, the rest of the run continues
//! - orders tasks by dependency, sequence and due date
//! - places each task whole in the first free zone slot, or splits it
//! - re-checks every chunk against the working set before committing it
//!
//! Nothing is persisted here; callers receive a [`ScheduleReport`] and decide.

pub mod strategy;

pub use strategy::{PlanningContext, SchedulingStrategy, SequenceBasedStrategy, ZoneAwareStrategy};

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conflict::ConflictDetector;
use crate::error::{CoreError, SchedulingError, SplitError, ValidationError};
use crate::split::{ChunkPlacement, SplitStrategy, DEFAULT_MAX_CANDIDATE_SLOTS};
use crate::task::{Chunk, Task, TaskStatus};
use crate::timeblock::{Event, EventSet, Interval, PlanningHorizon, TimeBlock};
use crate::zone::{TimeBlockZone, ZoneCatalogue};

/// What to do when a task cannot be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run and discard its placements
    #[default]
    FailFast,
    /// Record the failure and keep placing the remaining tasks
    Continue,
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Days covered by the planning horizon
    pub horizon_days: u32,
    pub failure_policy: FailurePolicy,
    /// Free slots considered when splitting
    pub max_candidate_slots: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            failure_policy: FailurePolicy::default(),
            max_candidate_slots: DEFAULT_MAX_CANDIDATE_SLOTS,
        }
    }
}

/// Lifecycle of a scheduling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    ResolvingOrder,
    Placing,
    /// Terminal: placements are final
    Committed,
    /// Terminal: placements were discarded
    Aborted,
}

impl RunState {
    pub fn can_transition_to(&self, to: &RunState) -> bool {
        match self {
            RunState::Idle => matches!(to, RunState::ResolvingOrder),
            RunState::ResolvingOrder => matches!(to, RunState::Placing | RunState::Aborted),
            RunState::Placing => matches!(to, RunState::Committed | RunState::Aborted),
            RunState::Committed | RunState::Aborted => false,
        }
    }
}

/// A task dropped during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRejection {
    pub task_id: String,
    pub error: ValidationError,
}

/// A valid task that could not be placed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskFailure {
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
    #[error(transparent)]
    Splitting(#[from] SplitError),
}

impl TaskFailure {
    pub fn task_id(&self) -> &str {
        match self {
            TaskFailure::Scheduling(e) => e.task_id(),
            TaskFailure::Splitting(e) => e.task_id(),
        }
    }
}

impl From<TaskFailure> for CoreError {
    fn from(failure: TaskFailure) -> Self {
        match failure {
            TaskFailure::Scheduling(e) => CoreError::Scheduling(e),
            TaskFailure::Splitting(e) => CoreError::Splitting(e),
        }
    }
}

/// Outcome of a committed run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleReport {
    pub state: RunState,
    /// New placements, in commit order
    pub placements: Vec<TimeBlock>,
    /// Working event set after the run, sorted by start
    pub events: Vec<Event>,
    /// Managed events removed before placing (reschedule only)
    pub removed: Vec<Event>,
    pub rejected: Vec<TaskRejection>,
    pub failures: Vec<TaskFailure>,
}

impl ScheduleReport {
    pub fn placements_for<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a TimeBlock> + 'a {
        self.placements.iter().filter(move |b| b.task_id == task_id)
    }

    /// True when every task was either placed or already had placements.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty() && self.failures.is_empty()
    }

    /// Status per task touched by the run: placed tasks are scheduled,
    /// rejected and failed tasks unscheduled.
    pub fn statuses(&self) -> Vec<(String, TaskStatus)> {
        let mut statuses: Vec<(String, TaskStatus)> = Vec::new();
        for block in &self.placements {
            if !statuses.iter().any(|(id, _)| *id == block.task_id) {
                statuses.push((block.task_id.clone(), TaskStatus::Scheduled));
            }
        }
        let unplaced = self
            .rejected
            .iter()
            .map(|r| r.task_id.as_str())
            .chain(self.failures.iter().map(TaskFailure::task_id));
        for task_id in unplaced {
            if !statuses.iter().any(|(id, _)| id == task_id) {
                statuses.push((task_id.to_string(), TaskStatus::Unscheduled));
            }
        }
        statuses
    }
}

/// A run that ended without committing anything.
#[derive(Error, Debug)]
#[error("scheduling run aborted: {cause}")]
pub struct ScheduleAbort {
    pub cause: CoreError,
    pub rejected: Vec<TaskRejection>,
    pub failures: Vec<TaskFailure>,
    pub removed: Vec<Event>,
}

pub type ScheduleResult = std::result::Result<ScheduleReport, ScheduleAbort>;

/// Managed events split off by [`Scheduler::clean`].
#[derive(Debug, Clone, PartialEq)]
pub struct CleanResult {
    pub removed: Vec<Event>,
    pub remaining: Vec<Event>,
}

impl CleanResult {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Mutable state of one run.
struct Run {
    state: RunState,
    events: EventSet,
    /// Latest placement end per task id
    placed: HashMap<String, DateTime<Utc>>,
    placements: Vec<TimeBlock>,
    removed: Vec<Event>,
    rejected: Vec<TaskRejection>,
    failures: Vec<TaskFailure>,
}

impl Run {
    fn new(events: EventSet, removed: Vec<Event>) -> Self {
        Self {
            state: RunState::Idle,
            events,
            placed: HashMap::new(),
            placements: Vec::new(),
            removed,
            rejected: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn transition(&mut self, to: RunState) {
        if self.state.can_transition_to(&to) {
            debug!(from = ?self.state, to = ?to, "run state changed");
            self.state = to;
        } else {
            warn!(from = ?self.state, to = ?to, "ignored invalid run state transition");
        }
    }

    fn commit(&mut self, block: TimeBlock) {
        debug!(
            task_id = %block.task_id,
            chunk = block.chunk_index,
            start = %block.interval.start,
            end = %block.interval.end,
            "placement committed"
        );
        self.events.insert(block.to_event(block.provisional_id()));
        let end = self.placed.entry(block.task_id.clone()).or_insert(block.interval.end);
        *end = (*end).max(block.interval.end);
        self.placements.push(block);
    }

    fn rollback(&mut self, task_id: &str) {
        self.events.rollback_task(task_id);
        self.placed.remove(task_id);
        self.placements.retain(|b| b.task_id != task_id);
    }

    fn abort(mut self, cause: CoreError) -> ScheduleAbort {
        self.transition(RunState::Aborted);
        warn!(error = %cause, discarded = self.placements.len(), "scheduling run aborted");
        ScheduleAbort {
            cause,
            rejected: self.rejected,
            failures: self.failures,
            removed: self.removed,
        }
    }

    fn finish(mut self) -> ScheduleReport {
        self.transition(RunState::Committed);
        ScheduleReport {
            state: self.state,
            placements: self.placements,
            events: self.events.into_vec(),
            removed: self.removed,
            rejected: self.rejected,
            failures: self.failures,
        }
    }
}

fn now_minute() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(now)
}

/// Zone-aware scheduler
pub struct Scheduler<S = SequenceBasedStrategy> {
    strategy: S,
    config: SchedulerConfig,
    split: SplitStrategy,
    horizon: PlanningHorizon,
    cancel: Option<Arc<AtomicBool>>,
}

impl Scheduler<SequenceBasedStrategy> {
    /// Scheduler with the default strategy and a horizon starting now.
    pub fn new() -> Self {
        Self::with_strategy(SequenceBasedStrategy)
    }
}

impl Default for Scheduler<SequenceBasedStrategy> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SchedulingStrategy> Scheduler<S> {
    pub fn with_strategy(strategy: S) -> Self {
        let config = SchedulerConfig::default();
        Self {
            strategy,
            horizon: Interval::days_from(now_minute(), config.horizon_days),
            split: SplitStrategy::new().with_max_candidate_slots(config.max_candidate_slots),
            config,
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.horizon = Interval::days_from(self.horizon.start, config.horizon_days);
        self.split = SplitStrategy::new().with_max_candidate_slots(config.max_candidate_slots);
        self.config = config;
        self
    }

    /// Anchor the planning horizon at `start` instead of now.
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.horizon = Interval::days_from(start, self.config.horizon_days);
        self
    }

    /// Stop between task placements once `flag` is set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn horizon(&self) -> PlanningHorizon {
        self.horizon
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Place `tasks` around `events`.
    ///
    /// Existing managed events stay; tasks that already own one are kept as
    /// they are. Use [`Scheduler::reschedule`] to start from scratch.
    pub fn schedule_tasks(&self, tasks: &[Task], zones: &ZoneCatalogue, events: &[Event]) -> ScheduleResult {
        self.run(tasks, zones, Run::new(EventSet::new(events.to_vec()), Vec::new()))
    }

    /// Split events into managed (removed) and fixed (remaining).
    pub fn clean(&self, events: &[Event]) -> CleanResult {
        let (removed, remaining): (Vec<Event>, Vec<Event>) = events.iter().cloned().partition(Event::is_managed);
        info!(removed = removed.len(), kept = remaining.len(), "managed events cleaned");
        CleanResult { removed, remaining }
    }

    /// Remove every managed event, then schedule all tasks again.
    pub fn reschedule(&self, tasks: &[Task], zones: &ZoneCatalogue, events: &[Event]) -> ScheduleResult {
        let cleaned = self.clean(events);
        self.run(tasks, zones, Run::new(EventSet::new(cleaned.remaining), cleaned.removed))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn run(&self, tasks: &[Task], zones: &ZoneCatalogue, mut run: Run) -> ScheduleResult {
        info!(
            strategy = self.strategy.name(),
            tasks = tasks.len(),
            events = run.events.len(),
            horizon_start = %self.horizon.start,
            horizon_end = %self.horizon.end,
            "scheduling run started"
        );
        run.transition(RunState::ResolvingOrder);

        for task in tasks {
            if let Err(e) = zones.zone_for(task.zone) {
                return Err(run.abort(e.into()));
            }
        }

        let already: HashSet<String> = run.events.managed().filter_map(Event::task_id).map(str::to_string).collect();
        for task_id in &already {
            if let Some(end) = run.events.latest_end_for(task_id) {
                run.placed.insert(task_id.clone(), end);
            }
        }

        let known: HashSet<&str> = tasks
            .iter()
            .map(|t| t.id.as_str())
            .chain(already.iter().map(String::as_str))
            .collect();
        let mut seen = HashSet::new();
        let mut valid: Vec<&Task> = Vec::new();
        for task in tasks {
            let checked = if seen.insert(task.id.as_str()) {
                self.validate_task(task, zones, &known)
            } else {
                Err(ValidationError::InvalidValue {
                    field: "id".to_string(),
                    message: format!("duplicate task id '{}'", task.id),
                })
            };
            match checked {
                Ok(()) => valid.push(task),
                Err(error) => {
                    warn!(task_id = %task.id, %error, "task rejected");
                    run.rejected.push(TaskRejection {
                        task_id: task.id.clone(),
                        error,
                    });
                }
            }
        }

        let order = self.strategy.resolve_order(&valid, &already);
        for (task, pending) in order.unresolved {
            let failure = SchedulingError::UnresolvableDependencies {
                task_id: task.id.clone(),
                pending,
            };
            if let Some(cause) = self.record_failure(&mut run, failure.into()) {
                return Err(run.abort(cause));
            }
        }

        run.transition(RunState::Placing);
        for task in order.ordered {
            if self.is_cancelled() {
                let cause = SchedulingError::Cancelled {
                    next_task: task.id.clone(),
                };
                return Err(run.abort(cause.into()));
            }
            if already.contains(&task.id) {
                debug!(task_id = %task.id, "task already has placements, keeping them");
                continue;
            }

            let pending: Vec<String> = task
                .dependencies
                .iter()
                .filter(|d| !run.placed.contains_key(d.as_str()))
                .cloned()
                .collect();
            let outcome = if pending.is_empty() {
                match zones.zone_for(task.zone) {
                    Ok(zone) => self.place_task(task, zone, zones, &mut run),
                    Err(e) => return Err(run.abort(e.into())),
                }
            } else {
                Err(SchedulingError::UnresolvableDependencies {
                    task_id: task.id.clone(),
                    pending,
                }
                .into())
            };

            if let Err(failure) = outcome {
                if let Some(cause) = self.record_failure(&mut run, failure) {
                    return Err(run.abort(cause));
                }
            }
        }

        let report = run.finish();
        info!(
            placed = report.placements.len(),
            rejected = report.rejected.len(),
            failed = report.failures.len(),
            "scheduling run committed"
        );
        Ok(report)
    }

    fn record_failure(&self, run: &mut Run, failure: TaskFailure) -> Option<CoreError> {
        warn!(task_id = failure.task_id(), error = %failure, "task not placed");
        run.failures.push(failure.clone());
        match self.config.failure_policy {
            FailurePolicy::FailFast => Some(failure.into()),
            FailurePolicy::Continue => None,
        }
    }

    /// Validation that needs the catalogue and the rest of the run.
    fn validate_task(&self, task: &Task, zones: &ZoneCatalogue, known: &HashSet<&str>) -> Result<(), ValidationError> {
        task.validate()?;

        if let Some(dependency) = task.dependencies.iter().find(|d| !known.contains(d.as_str())) {
            return Err(ValidationError::UnknownDependency {
                task_id: task.id.clone(),
                dependency: dependency.clone(),
            });
        }

        let zone = zones.zone_for(task.zone).map_err(|e| ValidationError::InvalidValue {
            field: "zone".to_string(),
            message: e.to_string(),
        })?;
        ConflictDetector::new(zones).check_compatibility(task, zone)?;

        if task.duration_minutes < zone.min_duration {
            return Err(ValidationError::BelowZoneMinimum {
                task_id: task.id.clone(),
                zone: zone.zone_type,
                minutes: task.duration_minutes,
                zone_minimum: zone.min_duration,
            });
        }

        let smallest = if task.splittable {
            task.min_chunk_minutes.max(zone.min_duration)
        } else {
            task.duration_minutes
        };
        let longest = zone.longest_range_minutes();
        if task.buffer_minutes > 0 && smallest <= longest && smallest + task.buffer_minutes > longest {
            return Err(ValidationError::BufferInfeasible {
                task_id: task.id.clone(),
                zone: zone.zone_type,
                minutes: smallest,
                buffer: task.buffer_minutes,
            });
        }
        Ok(())
    }

    fn place_task(
        &self,
        task: &Task,
        zone: &TimeBlockZone,
        zones: &ZoneCatalogue,
        run: &mut Run,
    ) -> Result<(), TaskFailure> {
        let detector = ConflictDetector::new(zones);
        let not_before = task
            .dependencies
            .iter()
            .filter_map(|d| run.placed.get(d))
            .copied()
            .max()
            .map_or(self.horizon.start, |end| end.max(self.horizon.start));

        let windows = {
            let ctx = PlanningContext {
                catalogue: zones,
                horizon: self.horizon,
                not_before,
                events: run.events.as_slice(),
            };
            self.strategy.candidate_windows(task, zone, &ctx)
        };

        if zone.accepts_duration(task.duration_minutes) {
            let found = windows.iter().find_map(|w| {
                detector.find_available_slot(zone, task.duration_minutes, w, run.events.as_slice(), task.buffer_minutes)
            });
            if let Some(interval) = found {
                run.commit(TimeBlock::whole(task, interval));
                return Ok(());
            }
        }

        if task.splittable && task.max_splits > 1 {
            return self
                .place_split(task, zone, &detector, &windows, run)
                .map_err(TaskFailure::from);
        }

        Err(SchedulingError::NoFeasibleSlot {
            task_id: task.id.clone(),
            zone: zone.zone_type,
            minutes: task.duration_minutes,
            conflicts: detector.diagnose(zone, task.duration_minutes, &windows, run.events.as_slice()),
        }
        .into())
    }

    fn place_split(
        &self,
        task: &Task,
        zone: &TimeBlockZone,
        detector: &ConflictDetector<'_>,
        windows: &[Interval],
        run: &mut Run,
    ) -> Result<(), SplitError> {
        let mut slots: Vec<Interval> = windows
            .iter()
            .flat_map(|w| detector.free_intervals(zone, w, run.events.as_slice(), task.buffer_minutes))
            .collect();
        slots.sort_by_key(|s| s.start);
        slots.dedup();

        let usable = self.split.analyze_zone_patterns(zone, &slots);
        let metrics = self.split.calculate_optimal_split(task, zone, &usable)?;
        let chunks = task.split(&metrics.chunk_durations)?;
        debug!(
            task_id = %task.id,
            chunks = metrics.chunk_count,
            variance = metrics.variance,
            utilization = metrics.zone_utilization,
            "task split"
        );

        commit_chunks(task, zone, detector, &chunks, &metrics.placements, windows, run)
    }
}

/// Commit chunks at their projected placements, moving a chunk to the
/// earliest valid slot after its predecessor when the projection no
/// longer holds. Rolls back the task's chunks when a chunk fits nowhere.
fn commit_chunks(
    task: &Task,
    zone: &TimeBlockZone,
    detector: &ConflictDetector<'_>,
    chunks: &[Chunk],
    projected: &[ChunkPlacement],
    windows: &[Interval],
    run: &mut Run,
) -> Result<(), SplitError> {
    let mut chronological = windows.to_vec();
    chronological.sort_by_key(|w| w.start);

    let mut previous_end: Option<DateTime<Utc>> = None;
    for (chunk, placement) in chunks.iter().zip(projected) {
        let projected = placement.interval();
        let in_order = previous_end.map_or(true, |end| projected.start >= end);
        let valid = in_order
            && detector
                .validate_placement(&projected, zone, task.buffer_minutes, run.events.as_slice())
                .is_empty();

        let interval = if valid {
            projected
        } else {
            let after = previous_end.unwrap_or(projected.start);
            let fallback = chronological.iter().filter_map(|w| w.starting_from(after)).find_map(|w| {
                detector.find_available_slot(
                    zone,
                    chunk.duration_minutes,
                    &w,
                    run.events.as_slice(),
                    task.buffer_minutes,
                )
            });
            match fallback {
                Some(interval) => {
                    debug!(task_id = %task.id, chunk = chunk.chunk_index, "chunk moved to fallback slot");
                    interval
                }
                None => {
                    let conflicts =
                        detector.validate_placement(&projected, zone, task.buffer_minutes, run.events.as_slice());
                    run.rollback(&task.id);
                    return Err(SplitError::ChunkRejected {
                        task_id: task.id.clone(),
                        chunk_index: chunk.chunk_index,
                        conflicts,
                    });
                }
            }
        };

        run.commit(TimeBlock::chunk(task, chunk, interval));
        previous_end = Some(interval.end);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::timeblock::Ownership;
    use crate::zone::{DailyRange, EnergyLevel, ZoneType};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap()
    }

    fn make_test_scheduler() -> Scheduler {
        Scheduler::new()
            .with_config(SchedulerConfig {
                horizon_days: 2,
                ..SchedulerConfig::default()
            })
            .starting_at(at(3, 0, 0))
    }

    fn fixed(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event::fixed(id, id, Interval::new(start, end).unwrap())
    }

    /// One Light zone, 13:00-17:00, capped at 120 minutes per block.
    fn make_afternoon_catalogue(buffer: u32) -> ZoneCatalogue {
        ZoneCatalogue::new(vec![TimeBlockZone::new(ZoneType::Light, EnergyLevel::Medium, 30)
            .with_max_duration(120)
            .with_buffer(buffer)
            .with_range(DailyRange::hm(13, 0, 17, 0))])
        .unwrap()
    }

    fn one_day_scheduler() -> Scheduler {
        make_test_scheduler().with_config(SchedulerConfig {
            horizon_days: 1,
            ..SchedulerConfig::default()
        })
    }

    fn projection(chunk_index: u32, start: DateTime<Utc>, minutes: u32, slot: Interval) -> ChunkPlacement {
        ChunkPlacement {
            chunk_index,
            start,
            duration_minutes: minutes,
            slot,
        }
    }

    #[test]
    fn run_state_transitions() {
        assert!(RunState::Idle.can_transition_to(&RunState::ResolvingOrder));
        assert!(RunState::Placing.can_transition_to(&RunState::Aborted));
        assert!(!RunState::Idle.can_transition_to(&RunState::Committed));
        assert!(!RunState::Committed.can_transition_to(&RunState::Placing));
        assert!(!RunState::Aborted.can_transition_to(&RunState::Idle));
    }

    #[test]
    fn places_whole_task_in_first_window() {
        let scheduler = make_test_scheduler();
        let tasks = vec![Task::new("mail", "Inbox", 30, ZoneType::Admin)];
        let report = scheduler
            .schedule_tasks(&tasks, &ZoneCatalogue::standard(), &[])
            .unwrap();

        assert_eq!(report.state, RunState::Committed);
        assert_eq!(report.placements.len(), 1);
        assert_eq!(report.placements[0].interval.start, at(3, 8, 0));
        assert_eq!(report.placements[0].interval.end, at(3, 8, 30));
        assert_eq!(report.events.len(), 1);
    }

    #[test]
    fn dependent_task_starts_after_dependency() {
        let scheduler = make_test_scheduler();
        let tasks = vec![
            Task::new("review", "Review", 60, ZoneType::Light).with_dependency("draft"),
            Task::new("draft", "Draft", 60, ZoneType::Light),
        ];
        let report = scheduler
            .schedule_tasks(&tasks, &ZoneCatalogue::standard(), &[])
            .unwrap();

        let draft = report.placements_for("draft").next().unwrap();
        let review = report.placements_for("review").next().unwrap();
        assert!(review.interval.start >= draft.interval.end);
    }

    #[test]
    fn invalid_tasks_are_rejected_and_run_continues() {
        let scheduler = make_test_scheduler();
        let tasks = vec![
            Task::new("short", "Too short", 30, ZoneType::Deep),
            Task::new("orphan", "Orphan", 30, ZoneType::Admin).with_dependency("ghost"),
            Task::new("ok", "Fine", 30, ZoneType::Admin),
        ];
        let report = scheduler
            .schedule_tasks(&tasks, &ZoneCatalogue::standard(), &[])
            .unwrap();

        assert_eq!(report.rejected.len(), 2);
        assert!(matches!(report.rejected[0].error, ValidationError::BelowZoneMinimum { .. }));
        assert!(matches!(report.rejected[1].error, ValidationError::UnknownDependency { .. }));
        assert_eq!(report.placements.len(), 1);
        assert_eq!(
            report.statuses(),
            vec![
                ("ok".to_string(), TaskStatus::Scheduled),
                ("short".to_string(), TaskStatus::Unscheduled),
                ("orphan".to_string(), TaskStatus::Unscheduled),
            ]
        );
    }

    #[test]
    fn undefined_zone_aborts_run() {
        let zones = ZoneCatalogue::new(vec![crate::zone::TimeBlockZone::new(ZoneType::Admin, EnergyLevel::Low, 15)
            .with_range(crate::zone::DailyRange::hm(8, 0, 9, 0))])
        .unwrap();
        let tasks = vec![Task::new("deep", "Deep", 120, ZoneType::Deep)];
        let abort = make_test_scheduler().schedule_tasks(&tasks, &zones, &[]).unwrap_err();
        assert!(matches!(
            abort.cause,
            CoreError::Config(ConfigError::UndefinedZone(ZoneType::Deep))
        ));
    }

    #[test]
    fn continue_policy_keeps_placing() {
        let scheduler = make_test_scheduler().with_config(SchedulerConfig {
            horizon_days: 2,
            failure_policy: FailurePolicy::Continue,
            ..SchedulerConfig::default()
        });
        let events = vec![
            fixed("busy1", at(3, 9, 0), at(3, 13, 0)),
            fixed("busy2", at(4, 9, 0), at(4, 13, 0)),
        ];
        let tasks = vec![
            Task::new("deep", "Deep work", 120, ZoneType::Deep),
            Task::new("mail", "Inbox", 30, ZoneType::Admin),
        ];
        let report = scheduler
            .schedule_tasks(&tasks, &ZoneCatalogue::standard(), &events)
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].task_id(), "deep");
        assert_eq!(report.placements.len(), 1);
    }

    #[test]
    fn cancellation_aborts_between_tasks() {
        let flag = Arc::new(AtomicBool::new(true));
        let scheduler = make_test_scheduler().with_cancellation(flag);
        let tasks = vec![Task::new("mail", "Inbox", 30, ZoneType::Admin)];
        let abort = scheduler
            .schedule_tasks(&tasks, &ZoneCatalogue::standard(), &[])
            .unwrap_err();
        assert!(matches!(
            abort.cause,
            CoreError::Scheduling(SchedulingError::Cancelled { .. })
        ));
    }

    #[test]
    fn existing_managed_placements_are_kept() {
        let scheduler = make_test_scheduler();
        let existing = Event {
            id: "cal-1".to_string(),
            title: "Inbox".to_string(),
            interval: Interval::new(at(3, 17, 0), at(3, 17, 30)).unwrap(),
            zone: Some(ZoneType::Admin),
            ownership: Ownership::Managed {
                task_id: "mail".to_string(),
                chunk_index: 0,
                chunk_count: 1,
            },
        };
        let tasks = vec![Task::new("mail", "Inbox", 30, ZoneType::Admin)];
        let report = scheduler
            .schedule_tasks(&tasks, &ZoneCatalogue::standard(), &[existing.clone()])
            .unwrap();
        assert!(report.placements.is_empty());
        assert_eq!(report.events, vec![existing]);
    }

    #[test]
    fn clean_separates_managed_events() {
        let scheduler = make_test_scheduler();
        let block = TimeBlock::whole(
            &Task::new("mail", "Inbox", 30, ZoneType::Admin),
            Interval::new(at(3, 8, 0), at(3, 8, 30)).unwrap(),
        );
        let events = vec![block.to_event("m1".into()), fixed("f1", at(3, 12, 0), at(3, 13, 0))];
        let cleaned = scheduler.clean(&events);
        assert_eq!(cleaned.removed_count(), 1);
        assert_eq!(cleaned.remaining[0].id, "f1");
    }

    #[test]
    fn split_packs_chunks_into_one_long_window() {
        let zones = make_afternoon_catalogue(10);
        let tasks = vec![Task::new("t", "Report", 220, ZoneType::Light).with_splitting(30, 2)];
        let report = one_day_scheduler().schedule_tasks(&tasks, &zones, &[]).unwrap();

        let placed: Vec<Interval> = report.placements.iter().map(|b| b.interval).collect();
        assert_eq!(
            placed,
            vec![
                Interval::new(at(3, 13, 0), at(3, 14, 50)).unwrap(),
                Interval::new(at(3, 15, 0), at(3, 16, 50)).unwrap(),
            ]
        );
        assert_eq!(report.placements[1].chunk_index, 1);
    }

    #[test]
    fn failed_split_is_reported_as_splitting_error() {
        let zones = make_afternoon_catalogue(10);
        let events = vec![fixed("review", at(3, 13, 0), at(3, 14, 50))];
        let tasks = vec![Task::new("t", "Report", 300, ZoneType::Light).with_splitting(30, 2)];
        let abort = one_day_scheduler().schedule_tasks(&tasks, &zones, &events).unwrap_err();

        assert!(matches!(
            abort.cause,
            CoreError::Splitting(SplitError::NoFeasibleSplit { max_chunks: 2, .. })
        ));
        assert!(matches!(abort.failures[0], TaskFailure::Splitting(_)));
    }

    #[test]
    fn buffer_wider_than_longest_range_is_rejected() {
        let zones = ZoneCatalogue::new(vec![TimeBlockZone::new(ZoneType::Light, EnergyLevel::Medium, 30)
            .with_range(DailyRange::hm(13, 0, 15, 0))])
        .unwrap();
        let tasks = vec![
            Task::new("talk", "Prepare talk", 120, ZoneType::Light).with_buffer(15),
            Task::new("notes", "Notes", 30, ZoneType::Light),
        ];
        let report = make_test_scheduler().schedule_tasks(&tasks, &zones, &[]).unwrap();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].task_id, "talk");
        assert!(matches!(
            report.rejected[0].error,
            ValidationError::BufferInfeasible {
                minutes: 120,
                buffer: 15,
                ..
            }
        ));
        assert_eq!(report.placements.len(), 1);
    }

    #[test]
    fn invalidated_chunks_move_past_their_predecessor() {
        let zones = make_afternoon_catalogue(0);
        let zone = zones.zone_for(ZoneType::Light).unwrap();
        let detector = ConflictDetector::new(&zones);
        let task = Task::new("t", "Report", 120, ZoneType::Light).with_splitting(60, 2);
        let chunks = task.split(&[60, 60]).unwrap();
        let window = Interval::new(at(3, 13, 0), at(3, 17, 0)).unwrap();
        // first projection now overlaps a fixed event, second starts before the moved first ends
        let projected = vec![
            projection(0, at(3, 13, 0), 60, window),
            projection(1, at(3, 14, 30), 60, window),
        ];
        let mut run = Run::new(EventSet::new(vec![fixed("call", at(3, 13, 0), at(3, 14, 0))]), Vec::new());

        commit_chunks(&task, zone, &detector, &chunks, &projected, &[window], &mut run).unwrap();

        let placed: Vec<Interval> = run.placements.iter().map(|b| b.interval).collect();
        assert_eq!(
            placed,
            vec![
                Interval::new(at(3, 14, 0), at(3, 15, 0)).unwrap(),
                Interval::new(at(3, 15, 0), at(3, 16, 0)).unwrap(),
            ]
        );
        assert_eq!(run.placed.get("t"), Some(&at(3, 16, 0)));
    }

    #[test]
    fn rejected_chunk_rolls_back_earlier_chunks() {
        let zones = make_afternoon_catalogue(0);
        let zone = zones.zone_for(ZoneType::Light).unwrap();
        let detector = ConflictDetector::new(&zones);
        let task = Task::new("t", "Report", 120, ZoneType::Light).with_splitting(60, 2);
        let chunks = task.split(&[60, 60]).unwrap();
        let window = Interval::new(at(3, 13, 0), at(3, 17, 0)).unwrap();
        let projected = vec![
            projection(0, at(3, 13, 0), 60, window),
            projection(1, at(3, 14, 0), 60, window),
        ];
        let blocker = fixed("offsite", at(3, 14, 0), at(3, 17, 0));
        let mut run = Run::new(EventSet::new(vec![blocker.clone()]), Vec::new());

        let err = commit_chunks(&task, zone, &detector, &chunks, &projected, &[window], &mut run).unwrap_err();

        match err {
            SplitError::ChunkRejected {
                task_id,
                chunk_index,
                conflicts,
            } => {
                assert_eq!(task_id, "t");
                assert_eq!(chunk_index, 1);
                assert!(conflicts.iter().any(|c| c.event_id.as_deref() == Some("offsite")));
            }
            other => panic!("unexpected split error: {other}"),
        }
        assert!(run.placements.is_empty());
        assert!(!run.placed.contains_key("t"));
        assert_eq!(run.events.as_slice(), &[blocker]);
    }
}
