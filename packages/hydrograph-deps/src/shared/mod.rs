//! Shared models and utilities used across features

pub mod clock;
pub mod models;

pub use clock::{Clock, ManualClock, SystemClock};
pub use models::{DbKey, TimeSeriesIdentifier, TsIdParts, TsSet};
