//! Runtime configuration for a dependency session and its updater worker

use super::error::{check_range, ConfigError, ConfigResult, Unit};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Schema versions `from_yaml` accepts
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

const MAX_TTL_SECS: u64 = 7 * 24 * 3600;

/// Notification delivery guarantee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Claim with a lease, delete on acknowledge; redelivered if the lease lapses
    #[default]
    AtLeastOnce,
    /// Delete on dequeue; a consumer crash loses the record
    AtMostOnce,
}

/// Object cache thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Age after which the group cache is cleared and bulk-refilled
    pub group_ttl_secs: u64,
    pub computation_ttl_secs: u64,
    pub time_series_ttl_secs: u64,
    /// Entries older than this are re-checked against the store before use
    pub staleness_watermark_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            group_ttl_secs: 1200,
            computation_ttl_secs: 1200,
            time_series_ttl_secs: 1200,
            staleness_watermark_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn group_ttl(&self) -> Duration {
        Duration::from_secs(self.group_ttl_secs)
    }

    pub fn computation_ttl(&self) -> Duration {
        Duration::from_secs(self.computation_ttl_secs)
    }

    pub fn time_series_ttl(&self) -> Duration {
        Duration::from_secs(self.time_series_ttl_secs)
    }

    pub fn staleness_watermark(&self) -> Duration {
        Duration::from_secs(self.staleness_watermark_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("cache.group_ttl_secs", self.group_ttl_secs),
            ("cache.computation_ttl_secs", self.computation_ttl_secs),
            ("cache.time_series_ttl_secs", self.time_series_ttl_secs),
        ] {
            check_range(
                field,
                value,
                1..=MAX_TTL_SECS,
                Unit::Seconds,
                "a cache is bulk-refilled at most weekly and at least every second",
            )?;
        }
        check_range(
            "cache.staleness_watermark_secs",
            self.staleness_watermark_secs,
            0..=MAX_TTL_SECS,
            Unit::Seconds,
            "0 re-checks the stored modify time on every lookup",
        )
    }
}

/// Notification queue behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NotifyConfig {
    pub delivery: DeliveryMode,
    /// How long a claimed, unacknowledged record stays invisible
    pub lease_secs: u64,
    /// Updater sleep between polls of an empty queue
    pub poll_interval_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::AtLeastOnce,
            lease_secs: 300,
            poll_interval_ms: 1000,
        }
    }
}

impl NotifyConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_range(
            "notify.lease_secs",
            self.lease_secs,
            1..=86_400,
            Unit::Seconds,
            "a claimed notification must outlast its slowest handler and expire within a day",
        )?;
        check_range(
            "notify.poll_interval_ms",
            self.poll_interval_ms,
            10..=600_000,
            Unit::Millis,
            "an idle updater polls the queue at most every 10ms and at least every 10 minutes",
        )
    }
}

/// Dependency updater worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UpdaterConfig {
    /// Interval between full cache refreshes
    pub cache_refresh_secs: u64,
    /// Rebuild every dependency edge when the worker starts
    pub full_eval_on_startup: bool,
    /// Directory receiving JSON group expansions after each refresh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_dump_dir: Option<PathBuf>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            cache_refresh_secs: 900,
            full_eval_on_startup: false,
            group_dump_dir: None,
        }
    }
}

impl UpdaterConfig {
    pub fn cache_refresh(&self) -> Duration {
        Duration::from_secs(self.cache_refresh_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_range(
            "updater.cache_refresh_secs",
            self.cache_refresh_secs,
            1..=MAX_TTL_SECS,
            Unit::Seconds,
            "the updater reloads its caches at most weekly",
        )?;
        if let Some(dir) = &self.group_dump_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "updater.group_dump_dir must not be empty; omit it to disable dumps".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Complete configuration of one dependency session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepsConfig {
    pub cache: CacheConfig,
    pub notify: NotifyConfig,
    pub updater: UpdaterConfig,
}

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepsConfigFileV1 {
    /// Schema version (always 1 for v1)
    #[serde(default)]
    pub version: Option<u32>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub updater: UpdaterConfig,
}

impl DepsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.cache.validate()?;
        self.notify.validate()?;
        self.updater.validate()?;
        Ok(())
    }

    /// Load and validate a YAML configuration file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: DepsConfigFileV1 = serde_yaml::from_str(content)?;

        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(ConfigError::UnsupportedVersion {
                found: version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let config = Self {
            cache: file.cache,
            notify: file.notify,
            updater: file.updater,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = DepsConfigFileV1 {
            version: Some(1),
            cache: self.cache.clone(),
            notify: self.notify.clone(),
            updater: self.updater.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}
