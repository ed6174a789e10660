//! Queue-draining worker that applies notifications to the dependency table

pub mod worker;

pub use worker::{DependsUpdater, PollOutcome, UpdaterStats};
