//! Planning pipeline: fetch, compute, persist.
//!
//! [`PlanningService`] fetches tasks and calendar events concurrently, runs
//! the scheduler and writes the outcome back: deletions first, then one
//! created event per committed placement, then one status update per task
//! the run touched. Persistence is not transactional; a failure part way
//! through reports what was already written.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::AdapterError;
use crate::integrations::{CalendarSource, CircuitBreakerConfig, Guarded, RetryPolicy, TaskSource};
use crate::scheduler::{CleanResult, ScheduleAbort, ScheduleReport, Scheduler, SchedulingStrategy, SequenceBasedStrategy};
use crate::task::Task;
use crate::timeblock::{Event, EventId};
use crate::zone::ZoneCatalogue;

/// Which scheduler operation a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Keep existing managed events, place the rest
    Schedule,
    /// Remove managed events, place everything again
    Reschedule,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Tasks or events could not be fetched; nothing was computed
    #[error("fetch failed: {0}")]
    Fetch(#[source] AdapterError),

    /// The scheduling run aborted; nothing was written
    #[error(transparent)]
    Aborted(#[from] ScheduleAbort),

    /// Writing the outcome failed part way through
    #[error("persist failed after creating {} and deleting {} events: {error}", .created.len(), .deleted.len())]
    Persist {
        #[source]
        error: AdapterError,
        created: Vec<EventId>,
        deleted: Vec<EventId>,
    },
}

/// What a persisted run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
    pub report: ScheduleReport,
    /// Calendar ids of created events, in placement order
    pub created: Vec<EventId>,
    pub deleted: Vec<EventId>,
    pub status_updates: usize,
}

/// Tracks writes so a failure can report them.
#[derive(Default)]
struct Written {
    created: Vec<EventId>,
    deleted: Vec<EventId>,
}

impl Written {
    fn fail(self, error: AdapterError) -> ServiceError {
        warn!(
            %error,
            created = self.created.len(),
            deleted = self.deleted.len(),
            "persist failed, calendar left partially updated"
        );
        ServiceError::Persist {
            error,
            created: self.created,
            deleted: self.deleted,
        }
    }
}

pub struct PlanningService<S = SequenceBasedStrategy> {
    tasks: Guarded<dyn TaskSource>,
    calendar: Guarded<dyn CalendarSource>,
    scheduler: Scheduler<S>,
    zones: ZoneCatalogue,
}

impl<S: SchedulingStrategy> PlanningService<S> {
    /// Service with the default retry and breaker settings.
    pub fn new(
        tasks: Arc<dyn TaskSource>,
        calendar: Arc<dyn CalendarSource>,
        scheduler: Scheduler<S>,
        zones: ZoneCatalogue,
    ) -> Self {
        let task_name = tasks.name().to_string();
        let calendar_name = calendar.name().to_string();
        Self {
            tasks: Guarded::new(tasks, task_name, RetryPolicy::default(), CircuitBreakerConfig::default()),
            calendar: Guarded::new(
                calendar,
                calendar_name,
                RetryPolicy::default(),
                CircuitBreakerConfig::default(),
            ),
            scheduler,
            zones,
        }
    }

    /// Replace the retry and breaker settings of both collaborators.
    pub fn with_resilience(mut self, policy: RetryPolicy, breaker: CircuitBreakerConfig) -> Self {
        self.tasks = Guarded::new(
            Arc::clone(self.tasks.inner()),
            self.tasks.service().to_string(),
            policy.clone(),
            breaker.clone(),
        );
        self.calendar = Guarded::new(
            Arc::clone(self.calendar.inner()),
            self.calendar.service().to_string(),
            policy,
            breaker,
        );
        self
    }

    pub fn scheduler(&self) -> &Scheduler<S> {
        &self.scheduler
    }

    pub fn zones(&self) -> &ZoneCatalogue {
        &self.zones
    }

    /// Fetch tasks and horizon events concurrently. Both must succeed.
    async fn fetch(&self) -> Result<(Vec<Task>, Vec<Event>), ServiceError> {
        let window = self.scheduler.horizon();
        let (tasks, events) = tokio::join!(
            self.tasks.call("fetch_tasks", |s| s.fetch_tasks()),
            self.calendar.call("sync_events", move |c| c.sync_events(&window)),
        );
        let tasks = tasks.map_err(ServiceError::Fetch)?;
        let events = events.map_err(ServiceError::Fetch)?;
        info!(tasks = tasks.len(), events = events.len(), "collaborator data fetched");
        Ok((tasks, events))
    }

    /// Compute a run without writing anything.
    pub async fn plan(&self, mode: PlanMode) -> Result<ScheduleReport, ServiceError> {
        let (tasks, events) = self.fetch().await?;
        let report = match mode {
            PlanMode::Schedule => self.scheduler.schedule_tasks(&tasks, &self.zones, &events)?,
            PlanMode::Reschedule => self.scheduler.reschedule(&tasks, &self.zones, &events)?,
        };
        Ok(report)
    }

    /// Place unplaced tasks and persist the new placements.
    pub async fn schedule(&self) -> Result<SyncSummary, ServiceError> {
        let report = self.plan(PlanMode::Schedule).await?;
        self.persist(report).await
    }

    /// Replace every managed event with a fresh placement.
    pub async fn reschedule(&self) -> Result<SyncSummary, ServiceError> {
        let report = self.plan(PlanMode::Reschedule).await?;
        self.persist(report).await
    }

    /// Managed events a clean would delete.
    pub async fn plan_clean(&self) -> Result<CleanResult, ServiceError> {
        let (_, events) = self.fetch().await?;
        Ok(self.scheduler.clean(&events))
    }

    /// Delete every managed event in the horizon.
    pub async fn clean(&self) -> Result<CleanResult, ServiceError> {
        let cleaned = self.plan_clean().await?;
        let mut written = Written::default();
        self.delete_all(&cleaned.removed, &mut written).await.map_err(|e| written.fail(e))?;
        Ok(cleaned)
    }

    async fn delete_all(&self, events: &[Event], written: &mut Written) -> Result<(), AdapterError> {
        for event in events {
            let id = event.id.clone();
            self.calendar
                .call("delete_event", move |c| c.delete_event(&id))
                .await?;
            written.deleted.push(event.id.clone());
        }
        Ok(())
    }

    async fn persist(&self, report: ScheduleReport) -> Result<SyncSummary, ServiceError> {
        let mut written = Written::default();
        if let Err(e) = self.delete_all(&report.removed, &mut written).await {
            return Err(written.fail(e));
        }

        for block in &report.placements {
            let block = block.clone();
            match self.calendar.call("create_event", move |c| c.create_event(&block)).await {
                Ok(id) => written.created.push(id),
                Err(e) => return Err(written.fail(e)),
            }
        }

        let statuses = report.statuses();
        for (task_id, status) in &statuses {
            let task_id = task_id.clone();
            let status = *status;
            if let Err(e) = self
                .tasks
                .call("update_status", move |s| s.update_status(&task_id, status))
                .await
            {
                return Err(written.fail(e));
            }
        }

        info!(
            created = written.created.len(),
            deleted = written.deleted.len(),
            status_updates = statuses.len(),
            "run persisted"
        );
        Ok(SyncSummary {
            report,
            created: written.created,
            deleted: written.deleted,
            status_updates: statuses.len(),
        })
    }
}
