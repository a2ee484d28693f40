//! Time-block zones: the fixed catalogue of Deep/Light/Admin windows.
//!
//! A zone is a recurring daily window with an energy level, duration
//! bounds, an interruption policy and a buffer requirement. The catalogue
//! is built once per process (usually from configuration) and is read-only
//! afterwards. Daily ranges are interpreted in UTC.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;
use crate::timeblock::Interval;

/// Kind of work a zone is reserved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    /// Long, uninterrupted focus work
    Deep,
    /// Shorter, lower-intensity work
    Light,
    /// Email, planning, reviews
    Admin,
}

impl ZoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneType::Deep => "deep",
            ZoneType::Light => "light",
            ZoneType::Admin => "admin",
        }
    }

    /// Parse the lowercase name used in configuration and calendar markers.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deep" => Some(ZoneType::Deep),
            "light" => Some(ZoneType::Light),
            "admin" => Some(ZoneType::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Energy level a zone provides or a task requires.
///
/// Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    /// No particular requirement
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for EnergyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyLevel::Low => write!(f, "low"),
            EnergyLevel::Medium => write!(f, "medium"),
            EnergyLevel::High => write!(f, "high"),
        }
    }
}

/// How tolerant a zone is of fragmented time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterruptionPolicy {
    /// Only gaps of at least the full zone minimum are usable.
    None,
    /// Gaps of at least half the zone minimum are usable.
    #[default]
    Limited,
    /// Any gap of a quarter hour or more is usable.
    Flexible,
}

/// Shortest gap any zone considers usable, in minutes.
pub const MIN_USABLE_SLOT_MINUTES: u32 = 15;

impl InterruptionPolicy {
    /// Shortest free slot (minutes) this policy lets the scheduler consider.
    pub fn min_usable_slot(&self, zone_minimum: u32) -> u32 {
        match self {
            InterruptionPolicy::None => zone_minimum.max(1),
            InterruptionPolicy::Limited => (zone_minimum / 2).max(MIN_USABLE_SLOT_MINUTES),
            InterruptionPolicy::Flexible => MIN_USABLE_SLOT_MINUTES,
        }
    }
}

/// `HH:MM` serde representation for daily times.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time '{raw}': {e}")))
    }
}

/// A same-day time range, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRange {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl DailyRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Build a range from hour/minute pairs. Out-of-range values collapse to midnight
    /// and are caught by catalogue validation.
    pub fn hm(start_hour: u32, start_minute: u32, end_hour: u32, end_minute: u32) -> Self {
        Self {
            start: at(start_hour, start_minute),
            end: at(end_hour, end_minute),
        }
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }

    pub fn overlaps(&self, other: &DailyRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for DailyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// A zone definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBlockZone {
    pub zone_type: ZoneType,
    pub energy: EnergyLevel,
    /// Shortest block the zone accepts (minutes)
    pub min_duration: u32,
    /// Longest single block the zone accepts (minutes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u32>,
    #[serde(default)]
    pub interruption: InterruptionPolicy,
    /// Idle gap required next to blocks in this zone (minutes)
    #[serde(default)]
    pub buffer: u32,
    pub ranges: Vec<DailyRange>,
}

impl TimeBlockZone {
    pub fn new(zone_type: ZoneType, energy: EnergyLevel, min_duration: u32) -> Self {
        Self {
            zone_type,
            energy,
            min_duration,
            max_duration: None,
            interruption: InterruptionPolicy::default(),
            buffer: 0,
            ranges: Vec::new(),
        }
    }

    pub fn with_max_duration(mut self, minutes: u32) -> Self {
        self.max_duration = Some(minutes);
        self
    }

    pub fn with_interruption(mut self, policy: InterruptionPolicy) -> Self {
        self.interruption = policy;
        self
    }

    pub fn with_buffer(mut self, minutes: u32) -> Self {
        self.buffer = minutes;
        self
    }

    pub fn with_range(mut self, range: DailyRange) -> Self {
        self.ranges.push(range);
        self.ranges.sort_by_key(|r| r.start);
        self
    }

    /// Whether a single block of `minutes` respects the zone maximum.
    pub fn accepts_duration(&self, minutes: u32) -> bool {
        self.max_duration.map_or(true, |max| minutes <= max)
    }

    /// Length of the longest daily range in minutes.
    pub fn longest_range_minutes(&self) -> u32 {
        self.ranges
            .iter()
            .map(|r| r.minutes().max(0) as u32)
            .max()
            .unwrap_or(0)
    }

    /// True iff one of the zone's daily ranges covers the instant's time of day.
    pub fn is_available(&self, instant: DateTime<Utc>) -> bool {
        let time = instant.time();
        self.ranges.iter().any(|r| r.contains(time))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidZone {
            zone: self.zone_type,
            message: message.to_string(),
        };

        if self.ranges.is_empty() {
            return Err(invalid("at least one daily range is required"));
        }
        if self.min_duration == 0 {
            return Err(invalid("min_duration must be positive"));
        }
        if let Some(max) = self.max_duration {
            if max < self.min_duration {
                return Err(invalid("max_duration must not be below min_duration"));
            }
        }
        for range in &self.ranges {
            if range.end <= range.start {
                return Err(ConfigError::InvalidZone {
                    zone: self.zone_type,
                    message: format!("range {range} must end after it starts on the same day"),
                });
            }
        }
        Ok(())
    }
}

/// Validated, read-only set of zones.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneCatalogue {
    zones: Vec<TimeBlockZone>,
}

impl ZoneCatalogue {
    /// Validate and build a catalogue.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the list is empty, a zone type repeats,
    /// a zone is inconsistent, or any two daily ranges overlap.
    pub fn new(zones: Vec<TimeBlockZone>) -> Result<Self, ConfigError> {
        if zones.is_empty() {
            return Err(ConfigError::EmptyCatalogue);
        }

        let mut seen = Vec::new();
        for zone in &zones {
            if seen.contains(&zone.zone_type) {
                return Err(ConfigError::DuplicateZone(zone.zone_type));
            }
            seen.push(zone.zone_type);
            zone.validate()?;
        }

        let mut ranges: Vec<(ZoneType, DailyRange)> = zones
            .iter()
            .flat_map(|z| z.ranges.iter().map(move |r| (z.zone_type, *r)))
            .collect();
        ranges.sort_by_key(|(_, r)| (r.start, r.end));
        for pair in ranges.windows(2) {
            let (first, first_range) = pair[0];
            let (second, second_range) = pair[1];
            if first_range.overlaps(&second_range) {
                return Err(ConfigError::OverlappingZones {
                    first,
                    first_range: first_range.to_string(),
                    second,
                    second_range: second_range.to_string(),
                });
            }
        }

        let mut zones = zones;
        for zone in &mut zones {
            zone.ranges.sort_by_key(|r| r.start);
        }
        Ok(Self { zones })
    }

    /// Default working day: admin bookends around a deep morning and a light afternoon.
    pub fn standard() -> Self {
        Self {
            zones: standard_zones(),
        }
    }

    pub fn zones(&self) -> &[TimeBlockZone] {
        &self.zones
    }

    /// Look up the zone for a type.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UndefinedZone`] when the catalogue has no such zone.
    pub fn zone_for(&self, zone_type: ZoneType) -> Result<&TimeBlockZone, ConfigError> {
        self.zones
            .iter()
            .find(|z| z.zone_type == zone_type)
            .ok_or(ConfigError::UndefinedZone(zone_type))
    }

    /// Zone whose daily range covers the instant, if any.
    pub fn zone_at(&self, instant: DateTime<Utc>) -> Option<&TimeBlockZone> {
        self.zones.iter().find(|z| z.is_available(instant))
    }

    pub fn is_available(&self, zone: &TimeBlockZone, instant: DateTime<Utc>) -> bool {
        zone.is_available(instant)
    }

    /// Buffer of a zone type, zero when the type is unknown or absent.
    pub fn buffer_of(&self, zone_type: Option<ZoneType>) -> u32 {
        zone_type
            .and_then(|t| self.zone_for(t).ok())
            .map_or(0, |z| z.buffer)
    }

    /// Gap required between a block in `zone` and a neighbour in `neighbor`.
    ///
    /// Different zones need the stricter of both buffers; the same zone needs its own.
    pub fn buffer_between(&self, zone: ZoneType, neighbor: Option<ZoneType>) -> u32 {
        match neighbor {
            Some(other) if other == zone => self.buffer_of(Some(zone)),
            other => self.buffer_of(Some(zone)).max(self.buffer_of(other)),
        }
    }

    /// Concrete windows of `zone` inside `within`, clipped and in chronological order.
    pub fn windows(&self, zone: &TimeBlockZone, within: &Interval) -> Vec<Interval> {
        let mut windows = Vec::new();
        let mut day = within.start.date_naive();
        let last_day = within.end.date_naive();

        while day <= last_day {
            for range in &zone.ranges {
                let start = day.and_time(range.start).and_utc();
                let end = day.and_time(range.end).and_utc();
                if let Some(window) = Interval::clipped(start, end, within) {
                    windows.push(window);
                }
            }
            day += Duration::days(1);
        }

        windows.sort_by_key(|w| w.start);
        windows
    }
}

impl Default for ZoneCatalogue {
    fn default() -> Self {
        Self::standard()
    }
}

/// Zones of [`ZoneCatalogue::standard`], also the configuration default.
pub fn standard_zones() -> Vec<TimeBlockZone> {
    vec![
        TimeBlockZone::new(ZoneType::Admin, EnergyLevel::Low, 15)
            .with_max_duration(60)
            .with_interruption(InterruptionPolicy::Flexible)
            .with_buffer(5)
            .with_range(DailyRange::hm(8, 0, 9, 0))
            .with_range(DailyRange::hm(17, 0, 18, 0)),
        TimeBlockZone::new(ZoneType::Deep, EnergyLevel::High, 120)
            .with_max_duration(240)
            .with_interruption(InterruptionPolicy::None)
            .with_buffer(15)
            .with_range(DailyRange::hm(9, 0, 13, 0)),
        TimeBlockZone::new(ZoneType::Light, EnergyLevel::Medium, 30)
            .with_max_duration(120)
            .with_interruption(InterruptionPolicy::Limited)
            .with_buffer(10)
            .with_range(DailyRange::hm(13, 0, 17, 0)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn standard_catalogue_is_valid() {
        let catalogue = ZoneCatalogue::new(standard_zones()).unwrap();
        assert_eq!(catalogue.zones().len(), 3);
        assert_eq!(catalogue.zone_for(ZoneType::Admin).unwrap().ranges.len(), 2);
    }

    #[test]
    fn zone_for_missing_type_is_config_error() {
        let catalogue = ZoneCatalogue::new(vec![TimeBlockZone::new(ZoneType::Deep, EnergyLevel::High, 60)
            .with_range(DailyRange::hm(9, 0, 12, 0))])
        .unwrap();
        assert_eq!(
            catalogue.zone_for(ZoneType::Light).unwrap_err(),
            ConfigError::UndefinedZone(ZoneType::Light)
        );
    }

    #[test]
    fn rejects_overlapping_ranges() {
        let zones = vec![
            TimeBlockZone::new(ZoneType::Deep, EnergyLevel::High, 60).with_range(DailyRange::hm(9, 0, 12, 0)),
            TimeBlockZone::new(ZoneType::Light, EnergyLevel::Medium, 30).with_range(DailyRange::hm(11, 30, 14, 0)),
        ];
        assert!(matches!(
            ZoneCatalogue::new(zones),
            Err(ConfigError::OverlappingZones { .. })
        ));
    }

    #[test]
    fn rejects_empty_and_duplicate_catalogues() {
        assert_eq!(ZoneCatalogue::new(vec![]).unwrap_err(), ConfigError::EmptyCatalogue);

        let zones = vec![
            TimeBlockZone::new(ZoneType::Deep, EnergyLevel::High, 60).with_range(DailyRange::hm(9, 0, 10, 0)),
            TimeBlockZone::new(ZoneType::Deep, EnergyLevel::High, 60).with_range(DailyRange::hm(14, 0, 15, 0)),
        ];
        assert_eq!(
            ZoneCatalogue::new(zones).unwrap_err(),
            ConfigError::DuplicateZone(ZoneType::Deep)
        );
    }

    #[test]
    fn rejects_inverted_range_and_bad_bounds() {
        let inverted = TimeBlockZone::new(ZoneType::Deep, EnergyLevel::High, 60).with_range(DailyRange::hm(12, 0, 9, 0));
        assert!(matches!(
            ZoneCatalogue::new(vec![inverted]),
            Err(ConfigError::InvalidZone { .. })
        ));

        let bounds = TimeBlockZone::new(ZoneType::Deep, EnergyLevel::High, 120)
            .with_max_duration(60)
            .with_range(DailyRange::hm(9, 0, 13, 0));
        assert!(matches!(
            ZoneCatalogue::new(vec![bounds]),
            Err(ConfigError::InvalidZone { .. })
        ));
    }

    #[test]
    fn is_available_is_half_open() {
        let catalogue = ZoneCatalogue::standard();
        let deep = catalogue.zone_for(ZoneType::Deep).unwrap();
        assert!(catalogue.is_available(deep, utc(3, 9, 0)));
        assert!(catalogue.is_available(deep, utc(3, 12, 59)));
        assert!(!catalogue.is_available(deep, utc(3, 13, 0)));
        assert_eq!(catalogue.zone_at(utc(3, 13, 0)).unwrap().zone_type, ZoneType::Light);
        assert_eq!(catalogue.zone_at(utc(3, 17, 30)).unwrap().zone_type, ZoneType::Admin);
        assert!(catalogue.zone_at(utc(3, 22, 0)).is_none());
    }

    #[test]
    fn windows_span_days_and_clip() {
        let catalogue = ZoneCatalogue::standard();
        let admin = catalogue.zone_for(ZoneType::Admin).unwrap();
        let within = Interval::new(utc(3, 8, 30), utc(4, 17, 30)).unwrap();

        let windows = catalogue.windows(admin, &within);
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0], Interval::new(utc(3, 8, 30), utc(3, 9, 0)).unwrap());
        assert_eq!(windows[3], Interval::new(utc(4, 17, 0), utc(4, 17, 30)).unwrap());
        assert!(windows.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn buffer_between_uses_stricter_zone() {
        let catalogue = ZoneCatalogue::standard();
        assert_eq!(catalogue.buffer_between(ZoneType::Deep, Some(ZoneType::Light)), 15);
        assert_eq!(catalogue.buffer_between(ZoneType::Admin, Some(ZoneType::Light)), 10);
        assert_eq!(catalogue.buffer_between(ZoneType::Light, Some(ZoneType::Light)), 10);
        assert_eq!(catalogue.buffer_between(ZoneType::Admin, None), 5);
    }

    #[test]
    fn interruption_policy_thresholds() {
        assert_eq!(InterruptionPolicy::None.min_usable_slot(120), 120);
        assert_eq!(InterruptionPolicy::Limited.min_usable_slot(120), 60);
        assert_eq!(InterruptionPolicy::Limited.min_usable_slot(20), 15);
        assert_eq!(InterruptionPolicy::Flexible.min_usable_slot(120), 15);
    }

    #[test]
    fn zone_serializes_times_as_hhmm() {
        let zone = TimeBlockZone::new(ZoneType::Light, EnergyLevel::Medium, 30).with_range(DailyRange::hm(13, 0, 17, 0));
        let json = serde_json::to_value(&zone).unwrap();
        assert_eq!(json["ranges"][0]["start"], "13:00");
        assert!(json.get("max_duration").is_none());

        let parsed: TimeBlockZone = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, zone);
    }
}
