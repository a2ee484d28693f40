//! Splitting a task across the free slots of its zone.
//!
//! The optimiser looks for the smallest chunk count that fits, then the
//! most even chunk sizes, then the earliest slots. A slot may hold several
//! chunks back to back; consecutive chunks in one slot are separated by the
//! gap the conflict detector requires between same-zone neighbours.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SplitError;
use crate::task::Task;
use crate::timeblock::Interval;
use crate::zone::TimeBlockZone;

/// Default cap on how many free slots the optimiser considers.
pub const DEFAULT_MAX_CANDIDATE_SLOTS: usize = 24;

/// Cap on slot assignments examined for one chunk count.
const MAX_COMBINATIONS_PER_COUNT: usize = 50_000;

/// Where one chunk lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPlacement {
    pub chunk_index: u32,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    /// The free slot the chunk was fitted into
    pub slot: Interval,
}

impl ChunkPlacement {
    pub fn interval(&self) -> Interval {
        Interval::from_minutes(self.start, self.duration_minutes)
    }
}

/// Outcome of a split computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub chunk_count: u32,
    pub chunk_durations: Vec<u32>,
    pub placements: Vec<ChunkPlacement>,
    /// Population variance of the chunk durations
    pub variance: f64,
    /// Task minutes divided by the minutes of the slots used
    pub zone_utilization: f64,
}

/// Size limits for the chunks of one task.
#[derive(Debug, Clone, Copy)]
struct ChunkBounds {
    min: u32,
    max: u32,
    /// Minutes between consecutive chunks sharing a slot
    gap: u32,
}

impl ChunkBounds {
    /// Minutes `count` chunks can fill together in a slot of `slot_minutes`,
    /// or `None` when even minimum-sized chunks do not fit.
    fn shared_capacity(&self, slot_minutes: u64, count: u64) -> Option<u64> {
        let gaps = count.saturating_sub(1) * u64::from(self.gap);
        if count == 0 || count * u64::from(self.min) + gaps > slot_minutes {
            return None;
        }
        Some((slot_minutes - gaps).min(count * u64::from(self.max)))
    }
}

/// Split optimiser.
#[derive(Debug, Clone)]
pub struct SplitStrategy {
    max_candidate_slots: usize,
}

impl Default for SplitStrategy {
    fn default() -> Self {
        Self {
            max_candidate_slots: DEFAULT_MAX_CANDIDATE_SLOTS,
        }
    }
}

impl SplitStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_candidate_slots(mut self, max: usize) -> Self {
        self.max_candidate_slots = max.max(1);
        self
    }

    /// Keep the slots the zone's interruption policy considers usable, earliest first.
    pub fn analyze_zone_patterns(&self, zone: &TimeBlockZone, slots: &[Interval]) -> Vec<Interval> {
        let threshold = i64::from(zone.interruption.min_usable_slot(zone.min_duration));
        let mut usable: Vec<Interval> = slots
            .iter()
            .filter(|s| s.duration_minutes() >= threshold)
            .copied()
            .collect();
        usable.sort_by_key(|s| s.start);
        usable
    }

    /// Choose chunk count, sizes and slots for `task`.
    ///
    /// Every chunk is at least `max(task.min_chunk_minutes, zone.min_duration)`
    /// and at most the zone maximum. Chunks are laid out in chronological
    /// order; chunks sharing a slot keep `max(zone.buffer, task.buffer_minutes)`
    /// between them.
    pub fn calculate_optimal_split(
        &self,
        task: &Task,
        zone: &TimeBlockZone,
        slots: &[Interval],
    ) -> Result<SplitMetrics, SplitError> {
        if !task.splittable {
            return Err(SplitError::NotSplittable {
                task_id: task.id.clone(),
            });
        }

        let bounds = ChunkBounds {
            min: task.min_chunk_minutes.max(zone.min_duration),
            max: zone.max_duration.unwrap_or(u32::MAX),
            gap: zone.buffer.max(task.buffer_minutes),
        };

        let mut ordered: Vec<Interval> = slots.to_vec();
        ordered.sort_by_key(|s| s.start);
        let usable: Vec<Interval> = ordered
            .into_iter()
            .filter(|s| bounds.shared_capacity(slot_minutes(s), 1).is_some())
            .take(self.max_candidate_slots)
            .collect();

        for count in 1..=task.max_splits as usize {
            if usable.is_empty() || (count as u64) * u64::from(bounds.min) > u64::from(task.duration_minutes) {
                break;
            }

            let ceiling: u64 = usable
                .iter()
                .map(|s| {
                    (1..=count as u64)
                        .filter_map(|k| bounds.shared_capacity(slot_minutes(s), k))
                        .max()
                        .unwrap_or(0)
                })
                .sum();
            if ceiling < u64::from(task.duration_minutes) {
                continue;
            }

            if let Some((indices, sizes)) = best_split(&usable, count, task.duration_minutes, bounds) {
                return Ok(metrics(&usable, &indices, sizes, task.duration_minutes, bounds.gap));
            }
        }

        Err(SplitError::NoFeasibleSplit {
            task_id: task.id.clone(),
            max_chunks: task.max_splits,
            slot_count: usable.len(),
        })
    }
}

fn slot_minutes(slot: &Interval) -> u64 {
    slot.duration_minutes().max(0) as u64
}

/// Per-chunk capacity for a slot assignment, or `None` when a slot is asked
/// to hold more chunks than fit. Chunks sharing a slot share it evenly.
fn chunk_caps(usable: &[Interval], combo: &[usize], bounds: ChunkBounds) -> Option<Vec<u32>> {
    let mut caps = Vec::with_capacity(combo.len());
    let mut i = 0;
    while i < combo.len() {
        let slot = combo[i];
        let run = combo[i..].iter().take_while(|&&s| s == slot).count();
        let shared = bounds.shared_capacity(slot_minutes(&usable[slot]), run as u64)?;
        let each = u32::try_from(shared / run as u64).unwrap_or(u32::MAX);
        caps.extend(std::iter::repeat(each).take(run));
        i += run;
    }
    Some(caps)
}

/// Lowest-variance split into exactly `count` chunks; ties go to the earliest slots.
fn best_split(usable: &[Interval], count: usize, total: u32, bounds: ChunkBounds) -> Option<(Vec<usize>, Vec<u32>)> {
    let mut best: Option<(f64, Vec<usize>, Vec<u32>)> = None;
    let mut combo: Vec<usize> = vec![0; count];
    let mut examined = 0;

    loop {
        if let Some(caps) = chunk_caps(usable, &combo, bounds) {
            let capacity: u64 = caps.iter().map(|&c| u64::from(c)).sum();
            if capacity >= u64::from(total) {
                let sizes = water_fill(&caps, total);
                if sizes.iter().all(|&s| s >= bounds.min) {
                    let v = variance(&sizes);
                    if best.as_ref().map_or(true, |(bv, _, _)| v < *bv - f64::EPSILON) {
                        let even = v <= f64::EPSILON;
                        best = Some((v, combo.clone(), sizes));
                        if even {
                            break;
                        }
                    }
                }
            }
        }

        examined += 1;
        if examined >= MAX_COMBINATIONS_PER_COUNT || !next_assignment(&mut combo, usable.len()) {
            break;
        }
    }

    best.map(|(_, indices, sizes)| (indices, sizes))
}

/// Advance `combo` to the next non-decreasing sequence over `0..n` in
/// lexicographic order. Repeated indices put several chunks in one slot.
fn next_assignment(combo: &mut [usize], n: usize) -> bool {
    let mut i = combo.len();
    while i > 0 {
        i -= 1;
        if combo[i] + 1 < n {
            let next = combo[i] + 1;
            for slot in &mut combo[i..] {
                *slot = next;
            }
            return true;
        }
    }
    false
}

/// Most even sizes summing to `total` with `sizes[i] <= caps[i]`.
///
/// Slots too small for an even share are filled completely; the rest is
/// shared evenly, extra minutes going to earlier chunks.
fn water_fill(caps: &[u32], total: u32) -> Vec<u32> {
    let mut order: Vec<usize> = (0..caps.len()).collect();
    order.sort_by_key(|&i| (caps[i], i));

    let mut sizes = vec![0u32; caps.len()];
    let mut remaining = u64::from(total);
    let mut left = caps.len() as u64;
    let mut shared = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        if u64::from(caps[i]) * left < remaining {
            sizes[i] = caps[i];
            remaining -= u64::from(caps[i]);
            left -= 1;
        } else {
            shared = order[pos..].to_vec();
            break;
        }
    }
    if left == 0 {
        return sizes;
    }

    shared.sort_unstable();
    let base = remaining / left;
    let extra = remaining % left;
    for (j, &i) in shared.iter().enumerate() {
        sizes[i] = (base + u64::from((j as u64) < extra)) as u32;
    }
    sizes
}

fn variance(sizes: &[u32]) -> f64 {
    if sizes.is_empty() {
        return 0.0;
    }
    let n = sizes.len() as f64;
    let mean = sizes.iter().map(|&s| f64::from(s)).sum::<f64>() / n;
    sizes.iter().map(|&s| (f64::from(s) - mean).powi(2)).sum::<f64>() / n
}

fn metrics(usable: &[Interval], indices: &[usize], sizes: Vec<u32>, total: u32, gap: u32) -> SplitMetrics {
    let mut cursor: Option<(usize, DateTime<Utc>)> = None;
    let mut placements = Vec::with_capacity(sizes.len());
    for (chunk, (&slot, &minutes)) in indices.iter().zip(&sizes).enumerate() {
        let start = match cursor {
            Some((current, next)) if current == slot => next,
            _ => usable[slot].start,
        };
        cursor = Some((slot, start + Duration::minutes(i64::from(minutes) + i64::from(gap))));
        placements.push(ChunkPlacement {
            chunk_index: chunk as u32,
            start,
            duration_minutes: minutes,
            slot: usable[slot],
        });
    }

    let mut distinct = indices.to_vec();
    distinct.dedup();
    let slot_minutes: i64 = distinct.iter().map(|&i| usable[i].duration_minutes()).sum();
    let zone_utilization = if slot_minutes > 0 {
        f64::from(total) / slot_minutes as f64
    } else {
        0.0
    };

    SplitMetrics {
        chunk_count: sizes.len() as u32,
        variance: variance(&sizes),
        chunk_durations: sizes,
        placements,
        zone_utilization,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::{EnergyLevel, InterruptionPolicy, ZoneType};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap()
    }

    fn slot(day: u32, sh: u32, sm: u32, eh: u32, em: u32) -> Interval {
        Interval::new(at(day, sh, sm), at(day, eh, em)).unwrap()
    }

    fn make_test_zone() -> TimeBlockZone {
        TimeBlockZone::new(ZoneType::Deep, EnergyLevel::High, 60)
            .with_max_duration(180)
            .with_interruption(InterruptionPolicy::Limited)
    }

    #[test]
    fn water_fill_shares_evenly_with_small_caps_full() {
        assert_eq!(water_fill(&[120, 120], 240), vec![120, 120]);
        assert_eq!(water_fill(&[60, 200, 200], 300), vec![60, 120, 120]);
        assert_eq!(water_fill(&[200, 200], 241), vec![121, 120]);
    }

    #[test]
    fn next_assignment_is_lexicographic_with_repeats() {
        let mut combo = vec![0, 0];
        let mut seen = vec![combo.clone()];
        while next_assignment(&mut combo, 3) {
            seen.push(combo.clone());
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[1], vec![0, 1]);
        assert_eq!(seen[3], vec![1, 1]);
        assert_eq!(seen[5], vec![2, 2]);
    }

    #[test]
    fn prefers_fewest_chunks() {
        let task = Task::new("t", "Essay", 150, ZoneType::Deep).with_splitting(60, 3);
        let slots = vec![slot(3, 9, 0, 10, 0), slot(3, 10, 30, 13, 0)];
        let metrics = SplitStrategy::new()
            .calculate_optimal_split(&task, &make_test_zone(), &slots)
            .unwrap();
        assert_eq!(metrics.chunk_count, 1);
        assert_eq!(metrics.placements[0].start, at(3, 10, 30));
    }

    #[test]
    fn prefers_even_chunks_then_earliest() {
        let task = Task::new("t", "Essay", 240, ZoneType::Deep).with_splitting(60, 3);
        let slots = vec![slot(3, 9, 0, 10, 30), slot(3, 11, 0, 13, 0), slot(4, 9, 0, 11, 0)];
        let metrics = SplitStrategy::new()
            .calculate_optimal_split(&task, &make_test_zone(), &slots)
            .unwrap();
        assert_eq!(metrics.chunk_durations, vec![120, 120]);
        assert_eq!(metrics.placements[0].start, at(3, 11, 0));
        assert_eq!(metrics.placements[1].start, at(4, 9, 0));
        assert_eq!(metrics.variance, 0.0);
    }

    #[test]
    fn chunks_respect_zone_minimum() {
        let task = Task::new("t", "Essay", 120, ZoneType::Deep).with_splitting(15, 4);
        let slots = vec![slot(3, 9, 0, 9, 50), slot(3, 10, 0, 10, 50), slot(3, 11, 0, 11, 50)];
        let err = SplitStrategy::new()
            .calculate_optimal_split(&task, &make_test_zone(), &slots)
            .unwrap_err();
        assert!(matches!(err, SplitError::NoFeasibleSplit { slot_count: 0, .. }));
    }

    #[test]
    fn long_slot_holds_several_chunks() {
        let zone = TimeBlockZone::new(ZoneType::Light, EnergyLevel::Medium, 30)
            .with_max_duration(120)
            .with_buffer(10);
        let task = Task::new("t", "Report", 220, ZoneType::Light).with_splitting(30, 2);
        let metrics = SplitStrategy::new()
            .calculate_optimal_split(&task, &zone, &[slot(3, 13, 0, 17, 0)])
            .unwrap();

        assert_eq!(metrics.chunk_durations, vec![110, 110]);
        assert_eq!(metrics.placements[0].start, at(3, 13, 0));
        assert_eq!(metrics.placements[1].start, at(3, 15, 0));
        assert_eq!(metrics.placements[1].interval().end, at(3, 16, 50));
    }

    #[test]
    fn shared_slot_leaves_room_for_gaps() {
        let zone = TimeBlockZone::new(ZoneType::Light, EnergyLevel::Medium, 30)
            .with_max_duration(120)
            .with_buffer(10);
        let task = Task::new("t", "Report", 240, ZoneType::Light).with_splitting(30, 2);
        let err = SplitStrategy::new()
            .calculate_optimal_split(&task, &zone, &[slot(3, 13, 0, 17, 0)])
            .unwrap_err();
        assert!(matches!(err, SplitError::NoFeasibleSplit { slot_count: 1, .. }));
    }

    #[test]
    fn unsplittable_task_is_refused() {
        let task = Task::new("t", "Call", 60, ZoneType::Deep);
        let err = SplitStrategy::new()
            .calculate_optimal_split(&task, &make_test_zone(), &[])
            .unwrap_err();
        assert_eq!(err, SplitError::NotSplittable { task_id: "t".into() });
    }

    #[test]
    fn pattern_analysis_filters_by_policy() {
        let zone = make_test_zone();
        let slots = vec![slot(3, 11, 0, 11, 20), slot(3, 9, 0, 9, 30)];
        let usable = SplitStrategy::new().analyze_zone_patterns(&zone, &slots);
        assert_eq!(usable, vec![slot(3, 9, 0, 9, 30)]);

        let strict = zone.with_interruption(InterruptionPolicy::None);
        assert!(SplitStrategy::new().analyze_zone_patterns(&strict, &slots).is_empty());
    }
}
