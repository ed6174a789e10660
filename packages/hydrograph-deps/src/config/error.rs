//! Errors raised while loading or validating a `DepsConfig`

use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Unit a bounded setting is expressed in, for messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Seconds,
    Millis,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unit::Seconds => "s",
            Unit::Millis => "ms",
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A TTL, lease or interval outside its accepted bounds
    #[error("{field} = {value}{unit} is outside {min}{unit}..={max}{unit}: {hint}")]
    Range {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
        unit: Unit,
        hint: &'static str,
    },

    #[error("dependency config has no 'version'; start the document with 'version: 1'")]
    MissingVersion,

    #[error("dependency config version {found} is not understood (this build reads {})", join_versions(.supported))]
    UnsupportedVersion { found: u32, supported: Vec<u32> },

    #[error("cannot read dependency config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dependency config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A setting that is in range but still unusable
    #[error("invalid dependency config: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn join_versions(versions: &[u32]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `Ok(())` when `value` lies in `bounds`, otherwise a `Range` error
pub(crate) fn check_range(
    field: &'static str,
    value: u64,
    bounds: RangeInclusive<u64>,
    unit: Unit,
    hint: &'static str,
) -> ConfigResult<()> {
    if bounds.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Range {
        field,
        value,
        min: *bounds.start(),
        max: *bounds.end(),
        unit,
        hint,
    })
}
