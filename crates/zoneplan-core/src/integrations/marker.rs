//! Marker convention for engine-owned calendar entries.
//!
//! Managed entries carry a title prefix for humans and a machine-readable
//! description line:
//!
//! ```text
//! [ZONEPLAN] Write report (Part 1/2)
//! zoneplan:chunk=0/2;zone=deep;task=write
//! ```
//!
//! The task id comes last so it may contain any character but a newline.
//! An entry without a parseable marker line is Fixed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::timeblock::{Event, EventId, Interval, Ownership, TimeBlock};
use crate::zone::ZoneType;

/// Title prefix of managed entries.
pub const TITLE_PREFIX: &str = "[ZONEPLAN]";

const MARKER_KEY: &str = "zoneplan:";

/// A raw calendar entry as stored by a calendar backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub id: EventId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Fields recovered from a marker line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedMarker {
    pub task_id: String,
    pub chunk_index: u32,
    pub chunk_count: u32,
    pub zone: ZoneType,
}

/// Marker line for a placement.
pub fn encode_marker(block: &TimeBlock) -> String {
    format!(
        "{MARKER_KEY}chunk={}/{};zone={};task={}",
        block.chunk_index, block.chunk_count, block.zone, block.task_id
    )
}

/// Parse the first marker line in `description`, if any.
pub fn decode_marker(description: &str) -> Option<ManagedMarker> {
    let line = description.lines().find_map(|l| l.trim().strip_prefix(MARKER_KEY))?;

    let (chunk, rest) = line.split_once(';')?;
    let (zone, task) = rest.split_once(';')?;

    let (index, count) = chunk.strip_prefix("chunk=")?.split_once('/')?;
    let chunk_index: u32 = index.parse().ok()?;
    let chunk_count: u32 = count.parse().ok()?;
    if chunk_count == 0 || chunk_index >= chunk_count {
        return None;
    }

    let zone = ZoneType::parse(zone.strip_prefix("zone=")?)?;
    let task_id = task.strip_prefix("task=")?;
    if task_id.is_empty() {
        return None;
    }

    Some(ManagedMarker {
        task_id: task_id.to_string(),
        chunk_index,
        chunk_count,
        zone,
    })
}

/// Calendar entry for a placement.
pub fn block_to_entry(id: EventId, block: &TimeBlock) -> CalendarEntry {
    CalendarEntry {
        id,
        title: format!("{TITLE_PREFIX} {}", block.title),
        description: Some(encode_marker(block)),
        start: block.interval.start,
        end: block.interval.end,
    }
}

/// Scheduler view of a calendar entry.
pub fn entry_to_event(service: &str, entry: &CalendarEntry) -> Result<Event, AdapterError> {
    let interval = Interval::new(entry.start, entry.end).map_err(|e| AdapterError::InvalidData {
        service: service.to_string(),
        message: format!("entry '{}': {e}", entry.id),
    })?;

    let marker = entry.description.as_deref().and_then(decode_marker);
    let event = match marker {
        Some(marker) => Event {
            id: entry.id.clone(),
            title: entry
                .title
                .strip_prefix(TITLE_PREFIX)
                .map(str::trim_start)
                .unwrap_or(&entry.title)
                .to_string(),
            interval,
            zone: Some(marker.zone),
            ownership: Ownership::Managed {
                task_id: marker.task_id,
                chunk_index: marker.chunk_index,
                chunk_count: marker.chunk_count,
            },
        },
        None => Event::fixed(entry.id.clone(), entry.title.clone(), interval),
    };
    Ok(event)
}
