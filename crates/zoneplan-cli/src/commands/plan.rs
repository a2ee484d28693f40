use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use zoneplan_core::integrations::{InMemoryTaskSource, JsonCalendarFile, JsonTaskFile};
use zoneplan_core::{
    CleanResult, Config, PlanMode, PlanningService, ScheduleReport, Scheduler, SchedulingStrategy, ServiceError,
    TaskSource,
};

use super::load_config;

#[derive(Args)]
pub struct PlanArgs {
    /// Task file (JSON array, or an object with a "tasks" array)
    #[arg(long)]
    tasks: PathBuf,
    /// Calendar file (JSON array of entries, created if missing)
    #[arg(long)]
    calendar: PathBuf,
    /// Horizon start (RFC 3339 or YYYY-MM-DD, UTC); defaults to now
    #[arg(long)]
    start: Option<String>,
    /// Compute placements without writing anything
    #[arg(long)]
    dry_run: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Calendar file
    #[arg(long)]
    calendar: PathBuf,
    /// Horizon start (RFC 3339 or YYYY-MM-DD, UTC); defaults to now
    #[arg(long)]
    start: Option<String>,
    /// List what would be deleted without deleting
    #[arg(long)]
    dry_run: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

type DynStrategy = Box<dyn SchedulingStrategy + Send + Sync>;

fn parse_start(value: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid --start '{value}': expected RFC 3339 or YYYY-MM-DD"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| format!("invalid --start '{value}'").into())
}

fn build_service(
    config: &Config,
    tasks: Arc<dyn TaskSource>,
    calendar: &Path,
    start: Option<&str>,
) -> Result<PlanningService<DynStrategy>, Box<dyn std::error::Error>> {
    let mut scheduler = Scheduler::with_strategy(config.scheduler.strategy.build()).with_config(config.scheduler_config());
    if let Some(start) = start {
        scheduler = scheduler.starting_at(parse_start(start)?);
    }
    debug!(strategy = scheduler.strategy().name(), horizon_start = %scheduler.horizon().start, "scheduler ready");
    let calendar = Arc::new(JsonCalendarFile::new(calendar));
    Ok(
        PlanningService::new(tasks, calendar, scheduler, config.catalogue()?).with_resilience(
            config.adapters.retry_policy(),
            config.adapters.breaker_config(),
        ),
    )
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

fn report_json(report: &ScheduleReport) -> serde_json::Value {
    json!({
        "placements": report.placements,
        "removed": report.removed.iter().map(|e| &e.id).collect::<Vec<_>>(),
        "rejected": report.rejected.iter().map(|r| json!({
            "task_id": r.task_id,
            "error": r.error.to_string(),
        })).collect::<Vec<_>>(),
        "failures": report.failures.iter().map(|f| json!({
            "task_id": f.task_id(),
            "error": f.to_string(),
        })).collect::<Vec<_>>(),
    })
}

fn print_report(report: &ScheduleReport) {
    for block in &report.placements {
        println!(
            "  {}  {}-{}  {:<5}  {}",
            block.interval.start.format("%Y-%m-%d"),
            block.interval.start.format("%H:%M"),
            block.interval.end.format("%H:%M"),
            block.zone.as_str(),
            block.title,
        );
    }
    for rejection in &report.rejected {
        println!("  rejected {}: {}", rejection.task_id, rejection.error);
    }
    for failure in &report.failures {
        println!("  failed {}: {}", failure.task_id(), failure);
    }
}

fn explain(error: ServiceError) -> Box<dyn std::error::Error> {
    if let ServiceError::Aborted(abort) = &error {
        for rejection in &abort.rejected {
            eprintln!("rejected {}: {}", rejection.task_id, rejection.error);
        }
        for failure in &abort.failures {
            eprintln!("failed {}: {}", failure.task_id(), failure);
        }
    }
    Box::new(error)
}

pub fn run_schedule(explicit: Option<&Path>, args: PlanArgs, reschedule: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;
    let tasks = Arc::new(JsonTaskFile::new(&args.tasks));
    let service = build_service(&config, tasks, &args.calendar, args.start.as_deref())?;
    let mode = if reschedule { PlanMode::Reschedule } else { PlanMode::Schedule };
    let rt = runtime()?;
    info!(
        ?mode,
        dry_run = args.dry_run,
        tasks = %args.tasks.display(),
        calendar = %args.calendar.display(),
        "planning"
    );

    if args.dry_run {
        let report = rt.block_on(service.plan(mode)).map_err(explain)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
        } else {
            println!(
                "dry run: {} blocks would be created, {} removed",
                report.placements.len(),
                report.removed.len()
            );
            print_report(&report);
        }
        return Ok(());
    }

    let outcome = match mode {
        PlanMode::Schedule => rt.block_on(service.schedule()),
        PlanMode::Reschedule => rt.block_on(service.reschedule()),
    };
    let summary = outcome.map_err(explain)?;
    if args.json {
        let mut value = report_json(&summary.report);
        value["created"] = json!(summary.created);
        value["deleted"] = json!(summary.deleted);
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "{} blocks created, {} deleted ({} strategy)",
            summary.created.len(),
            summary.deleted.len(),
            service.scheduler().strategy().name()
        );
        print_report(&summary.report);
    }
    Ok(())
}

pub fn run_clean(explicit: Option<&Path>, args: CleanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;
    let tasks = Arc::new(InMemoryTaskSource::new(Vec::new()));
    let service = build_service(&config, tasks, &args.calendar, args.start.as_deref())?;
    let rt = runtime()?;
    info!(dry_run = args.dry_run, calendar = %args.calendar.display(), "cleaning managed blocks");

    let cleaned: CleanResult = if args.dry_run {
        rt.block_on(service.plan_clean()).map_err(explain)?
    } else {
        rt.block_on(service.clean()).map_err(explain)?
    };

    if args.json {
        let value = json!({
            "dry_run": args.dry_run,
            "removed": cleaned.removed.iter().map(|e| &e.id).collect::<Vec<_>>(),
            "remaining": cleaned.remaining.len(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if args.dry_run {
        println!("dry run: {} managed blocks would be deleted", cleaned.removed_count());
    } else {
        println!("{} managed blocks deleted", cleaned.removed_count());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_date_and_rfc3339_starts() {
        assert_eq!(
            parse_start("2025-03-03").unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_start("2025-03-03T10:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()
        );
        assert!(parse_start("next tuesday").is_err());
    }
}
