//! TOML-based configuration.
//!
//! Holds:
//! - scheduler settings (horizon, failure policy, strategy)
//! - collaborator resilience settings (attempts, timeout, breaker)
//! - the zone catalogue (`[[zones]]`)
//!
//! Configuration is read from `$ZONEPLAN_CONFIG` or
//! `~/.config/zoneplan/config.toml`. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::integrations::{CircuitBreakerConfig, RetryPolicy};
use crate::scheduler::{FailurePolicy, SchedulerConfig, SchedulingStrategy, SequenceBasedStrategy, ZoneAwareStrategy};
use crate::zone::{standard_zones, TimeBlockZone, ZoneCatalogue};

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "ZONEPLAN_CONFIG";

/// Which placement strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Sequence,
    ZoneAware,
}

impl StrategyKind {
    pub fn build(&self) -> Box<dyn SchedulingStrategy + Send + Sync> {
        match self {
            StrategyKind::Sequence => Box::new(SequenceBasedStrategy),
            StrategyKind::ZoneAware => Box::new(ZoneAwareStrategy::new()),
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default = "default_max_candidate_slots")]
    pub max_candidate_slots: usize,
}

/// `[adapters]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub adapters: AdapterSettings,
    #[serde(default = "standard_zones")]
    pub zones: Vec<TimeBlockZone>,
}

fn default_horizon_days() -> u32 {
    7
}
fn default_max_candidate_slots() -> usize {
    crate::split::DEFAULT_MAX_CANDIDATE_SLOTS
}
fn default_max_attempts() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_reset_timeout_secs() -> u64 {
    60
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            failure_policy: FailurePolicy::default(),
            strategy: StrategyKind::default(),
            max_candidate_slots: default_max_candidate_slots(),
        }
    }
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            backoff_ms: default_backoff_ms(),
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            adapters: AdapterSettings::default(),
            zones: standard_zones(),
        }
    }
}

impl AdapterSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            timeout: Duration::from_secs(self.timeout_secs),
            initial_backoff: Duration::from_millis(self.backoff_ms),
            max_backoff: Duration::from_millis(self.backoff_ms.saturating_mul(16)),
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(root: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = match current {
                serde_json::Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    fn set_json_value_by_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<(), ConfigError> {
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".to_string(),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let (parents, leaf) = match key.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        for part in parents.into_iter().flat_map(|p| p.split('.')) {
            current = current.get_mut(part).ok_or_else(unknown)?;
        }
        let obj = current.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(leaf).ok_or_else(unknown)?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => {
                serde_json::Value::Bool(value.parse::<bool>().map_err(|e| invalid(e.to_string()))?)
            }
            serde_json::Value::Number(_) => {
                let n = value
                    .parse::<u64>()
                    .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?;
                serde_json::Value::Number(n.into())
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            _ => serde_json::Value::String(value.to_string()),
        };
        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    /// Location of the configuration file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        dirs::config_dir()
            .map(|dir| dir.join("zoneplan").join("config.toml"))
            .ok_or_else(|| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: "no configuration directory on this platform".to_string(),
            })
    }

    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Persist to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key (`zones.0.buffer` indexes arrays).
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a scalar value by dot-separated key. Unknown keys are rejected.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Validated zone catalogue.
    pub fn catalogue(&self) -> Result<ZoneCatalogue, ConfigError> {
        ZoneCatalogue::new(self.zones.clone())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            horizon_days: self.scheduler.horizon_days.max(1),
            failure_policy: self.scheduler.failure_policy,
            max_candidate_slots: self.scheduler.max_candidate_slots.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneType;
    use indoc::indoc;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = cfg.to_toml().unwrap();
        let parsed = Config::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert!(parsed.catalogue().is_ok());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.scheduler.horizon_days, 7);
        assert_eq!(cfg.adapters.max_attempts, 3);
        assert_eq!(cfg.zones.len(), 3);
    }

    #[test]
    fn parses_custom_zones_and_settings() {
        let cfg = Config::from_toml_str(indoc! {r#"
            [scheduler]
            horizon_days = 3
            failure_policy = "continue"
            strategy = "zone_aware"

            [[zones]]
            zone_type = "deep"
            energy = "high"
            min_duration = 90
            max_duration = 180
            interruption = "none"
            buffer = 10

            [[zones.ranges]]
            start = "08:30"
            end = "12:00"
        "#})
        .unwrap();

        assert_eq!(cfg.scheduler.failure_policy, FailurePolicy::Continue);
        assert_eq!(cfg.scheduler.strategy, StrategyKind::ZoneAware);
        assert_eq!(cfg.scheduler.strategy.build().name(), "zone_aware");

        let catalogue = cfg.catalogue().unwrap();
        let deep = catalogue.zone_for(ZoneType::Deep).unwrap();
        assert_eq!(deep.ranges[0].to_string(), "08:30-12:00");
        assert!(catalogue.zone_for(ZoneType::Light).is_err());
    }

    #[test]
    fn overlapping_zones_fail_catalogue() {
        let cfg = Config::from_toml_str(indoc! {r#"
            [[zones]]
            zone_type = "deep"
            energy = "high"
            min_duration = 60

            [[zones.ranges]]
            start = "09:00"
            end = "12:00"

            [[zones]]
            zone_type = "light"
            energy = "medium"
            min_duration = 30

            [[zones.ranges]]
            start = "11:00"
            end = "14:00"
        "#})
        .unwrap();
        assert!(matches!(cfg.catalogue(), Err(ConfigError::OverlappingZones { .. })));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        assert!(matches!(
            Config::from_toml_str("[scheduler\nhorizon_days = 3"),
            Err(ConfigError::ParseFailed(_))
        ));
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("scheduler.horizon_days").as_deref(), Some("7"));
        assert_eq!(cfg.get("scheduler.failure_policy").as_deref(), Some("fail_fast"));
        assert_eq!(cfg.get("zones.0.zone_type").as_deref(), Some("admin"));
        assert_eq!(cfg.get("scheduler.nope"), None);
    }

    #[test]
    fn set_updates_and_rejects_unknown_keys() {
        let mut cfg = Config::default();
        cfg.set("scheduler.horizon_days", "14").unwrap();
        assert_eq!(cfg.scheduler.horizon_days, 14);
        cfg.set("scheduler.failure_policy", "continue").unwrap();
        assert_eq!(cfg.scheduler_config().failure_policy, FailurePolicy::Continue);

        assert!(cfg.set("scheduler.unknown", "1").is_err());
        assert!(cfg.set("adapters.max_attempts", "many").is_err());
        assert!(cfg.set("scheduler.failure_policy", "sometimes").is_err());
    }

    #[test]
    fn save_and_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        let mut cfg = Config::default();
        cfg.scheduler.horizon_days = 2;
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().scheduler.horizon_days, 2);
    }

    #[test]
    fn adapter_settings_map_to_policies() {
        let settings = AdapterSettings::default();
        assert_eq!(settings.retry_policy().max_attempts, 3);
        assert_eq!(settings.retry_policy().timeout, Duration::from_secs(30));
        assert_eq!(settings.breaker_config().failure_threshold, 5);
    }
}
