//! Intervals, calendar events and the working event set of a run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::task::{Chunk, Task};
use crate::zone::ZoneType;

/// Identifier assigned to an event by the calendar that stores it.
pub type EventId = String;

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Create an interval, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Interval of `minutes` starting at `start`.
    pub fn from_minutes(start: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            start,
            end: start + Duration::minutes(i64::from(minutes)),
        }
    }

    /// Planning horizon of `days` whole days starting at `start`.
    pub fn days_from(start: DateTime<Utc>, days: u32) -> Self {
        Self {
            start,
            end: start + Duration::days(i64::from(days.max(1))),
        }
    }

    /// `[start, end)` clipped to `bounds`, `None` when nothing is left.
    pub fn clipped(start: DateTime<Utc>, end: DateTime<Utc>, bounds: &Interval) -> Option<Self> {
        let start = start.max(bounds.start);
        let end = end.min(bounds.end);
        (end > start).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn covers(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Minutes from the end of `self` to the start of `later` (negative on overlap).
    pub fn gap_to(&self, later: &Interval) -> i64 {
        (later.start - self.end).num_minutes()
    }

    /// Part of `self` that starts no earlier than `instant`.
    pub fn starting_from(&self, instant: DateTime<Utc>) -> Option<Self> {
        Self::clipped(self.start, self.end, &Interval { start: instant, end: self.end })
    }
}

/// Bounded range of days a run may place blocks in.
pub type PlanningHorizon = Interval;

/// Who owns an event on the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ownership {
    /// Created by something else; never moved or deleted.
    Fixed,
    /// Created by this engine for a task chunk.
    Managed {
        task_id: String,
        chunk_index: u32,
        chunk_count: u32,
    },
}

/// A calendar event as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    #[serde(flatten)]
    pub interval: Interval,
    #[serde(default)]
    pub zone: Option<ZoneType>,
    pub ownership: Ownership,
}

impl Event {
    /// A fixed (externally owned) event.
    pub fn fixed(id: impl Into<String>, title: impl Into<String>, interval: Interval) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            interval,
            zone: None,
            ownership: Ownership::Fixed,
        }
    }

    pub fn with_zone(mut self, zone: ZoneType) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn is_managed(&self) -> bool {
        matches!(self.ownership, Ownership::Managed { .. })
    }

    /// Task id of a managed event.
    pub fn task_id(&self) -> Option<&str> {
        match &self.ownership {
            Ownership::Managed { task_id, .. } => Some(task_id),
            Ownership::Fixed => None,
        }
    }
}

/// A placed task or chunk of a task, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub task_id: String,
    /// 0-based
    pub chunk_index: u32,
    pub chunk_count: u32,
    pub title: String,
    #[serde(flatten)]
    pub interval: Interval,
    pub zone: ZoneType,
}

impl TimeBlock {
    /// Block holding a whole task.
    pub fn whole(task: &Task, interval: Interval) -> Self {
        Self {
            task_id: task.id.clone(),
            chunk_index: 0,
            chunk_count: 1,
            title: task.title.clone(),
            interval,
            zone: task.zone,
        }
    }

    /// Block holding one chunk of a split task.
    pub fn chunk(task: &Task, chunk: &Chunk, interval: Interval) -> Self {
        let title = if chunk.chunk_count > 1 {
            format!("{} (Part {}/{})", task.title, chunk.chunk_index + 1, chunk.chunk_count)
        } else {
            task.title.clone()
        };
        Self {
            task_id: task.id.clone(),
            chunk_index: chunk.chunk_index,
            chunk_count: chunk.chunk_count,
            title,
            interval,
            zone: task.zone,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        self.interval.duration_minutes()
    }

    /// Run-local id used until the calendar assigns a real one.
    pub fn provisional_id(&self) -> EventId {
        format!("{}#{}", self.task_id, self.chunk_index)
    }

    pub fn to_event(&self, id: EventId) -> Event {
        Event {
            id,
            title: self.title.clone(),
            interval: self.interval,
            zone: Some(self.zone),
            ownership: Ownership::Managed {
                task_id: self.task_id.clone(),
                chunk_index: self.chunk_index,
                chunk_count: self.chunk_count,
            },
        }
    }
}

/// Working set of events for one run, kept sorted by start time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSet {
    events: Vec<Event>,
}

/// Sort key shared by construction and insertion: start, end, then id.
fn order_key(event: &Event) -> (DateTime<Utc>, DateTime<Utc>, &str) {
    (event.interval.start, event.interval.end, event.id.as_str())
}

impl EventSet {
    pub fn new(mut events: Vec<Event>) -> Self {
        events.sort_by(|a, b| order_key(a).cmp(&order_key(b)));
        Self { events }
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn insert(&mut self, event: Event) {
        let pos = {
            let key = order_key(&event);
            self.events.partition_point(|e| order_key(e) <= key)
        };
        self.events.insert(pos, event);
    }

    pub fn managed(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.is_managed())
    }

    pub fn fixed(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| !e.is_managed())
    }

    /// Managed events belonging to a task.
    pub fn placements_for<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.task_id() == Some(task_id))
    }

    /// Latest end among a task's managed events.
    pub fn latest_end_for(&self, task_id: &str) -> Option<DateTime<Utc>> {
        self.placements_for(task_id).map(|e| e.interval.end).max()
    }

    /// Remove every managed event, returning them.
    pub fn remove_managed(&mut self) -> Vec<Event> {
        let (managed, fixed): (Vec<_>, Vec<_>) = self.events.drain(..).partition(|e| e.is_managed());
        self.events = fixed;
        managed
    }

    /// Remove the managed events of one task, returning them.
    pub fn rollback_task(&mut self, task_id: &str) -> Vec<Event> {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .events
            .drain(..)
            .partition(|e| e.task_id() == Some(task_id));
        self.events = kept;
        removed
    }

    pub fn into_vec(self) -> Vec<Event> {
        self.events
    }
}

impl From<Vec<Event>> for EventSet {
    fn from(events: Vec<Event>) -> Self {
        Self::new(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, hour, minute, 0).unwrap()
    }

    fn make_test_interval(start: u32, end: u32) -> Interval {
        Interval::new(at(start, 0), at(end, 0)).unwrap()
    }

    fn make_managed(id: &str, task: &str, interval: Interval) -> Event {
        Event {
            id: id.to_string(),
            title: task.to_string(),
            interval,
            zone: Some(ZoneType::Deep),
            ownership: Ownership::Managed {
                task_id: task.to_string(),
                chunk_index: 0,
                chunk_count: 1,
            },
        }
    }

    #[test]
    fn interval_rejects_inverted_range() {
        assert!(Interval::new(at(10, 0), at(9, 0)).is_err());
        assert!(Interval::new(at(10, 0), at(10, 0)).is_err());
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let a = make_test_interval(9, 10);
        let b = make_test_interval(10, 11);
        assert!(!a.overlaps(&b));
        assert_eq!(a.gap_to(&b), 0);
        assert!(a.overlaps(&make_test_interval(9, 12)));
    }

    #[test]
    fn clipping_and_starting_from() {
        let bounds = make_test_interval(9, 12);
        assert_eq!(Interval::clipped(at(8, 0), at(10, 0), &bounds), Some(make_test_interval(9, 10)));
        assert_eq!(Interval::clipped(at(12, 0), at(13, 0), &bounds), None);
        assert_eq!(bounds.starting_from(at(11, 0)), Some(make_test_interval(11, 12)));
        assert_eq!(bounds.starting_from(at(12, 0)), None);
    }

    #[test]
    fn event_set_keeps_order_on_insert() {
        let mut set = EventSet::new(vec![
            Event::fixed("b", "Lunch", make_test_interval(12, 13)),
            Event::fixed("a", "Standup", make_test_interval(9, 10)),
        ]);
        set.insert(make_managed("c", "write", make_test_interval(10, 11)));

        let ids: Vec<_> = set.as_slice().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(set.managed().count(), 1);
        assert_eq!(set.fixed().count(), 2);
    }

    #[test]
    fn tied_events_order_the_same_whether_inserted_or_given() {
        let tied = |id: &str| Event::fixed(id, "Sync", make_test_interval(9, 10));
        let mut inserted = EventSet::new(vec![tied("b")]);
        inserted.insert(tied("c"));
        inserted.insert(tied("a"));

        let given = EventSet::new(vec![tied("c"), tied("a"), tied("b")]);
        assert_eq!(inserted.as_slice(), given.as_slice());
        let ids: Vec<_> = inserted.as_slice().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn rollback_removes_only_that_task() {
        let mut set = EventSet::new(vec![
            make_managed("1", "write", make_test_interval(9, 10)),
            make_managed("2", "write", make_test_interval(14, 15)),
            make_managed("3", "review", make_test_interval(11, 12)),
            Event::fixed("4", "Lunch", make_test_interval(12, 13)),
        ]);
        assert_eq!(set.latest_end_for("write"), Some(at(15, 0)));

        let removed = set.rollback_task("write");
        assert_eq!(removed.len(), 2);
        assert_eq!(set.len(), 2);
        assert_eq!(set.placements_for("write").count(), 0);

        let managed = set.remove_managed();
        assert_eq!(managed.len(), 1);
        assert!(set.as_slice().iter().all(|e| !e.is_managed()));
    }

    #[test]
    fn event_serializes_flat() {
        let event = Event::fixed("e1", "Standup", make_test_interval(9, 10));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["ownership"]["kind"], "fixed");
        assert!(json.get("start").is_some());
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
