//! Feature modules
//!
//! - `cache`: per-session object caches
//! - `metadata`: time-series identifier lookup
//! - `groups`: group definitions, resolution and persistence
//! - `computation`: computation definitions and persistence
//! - `dependency`: the dependency table and its replace protocol
//! - `notify`: the cross-process notification queue
//! - `updater`: the worker draining that queue

pub mod cache;
pub mod computation;
pub mod dependency;
pub mod groups;
pub mod metadata;
pub mod notify;
pub mod updater;
