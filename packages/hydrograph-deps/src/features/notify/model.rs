//! Notification records

use crate::errors::{DepsError, DepsResult};
use crate::shared::models::DbKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What changed. Stored as a one-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyEventType {
    TsCreated,
    TsDeleted,
    TsModified,
    ComputationModified,
    GroupModified,
    /// Rebuild every dependency edge; the target key is ignored
    FullEvaluation,
}

impl NotifyEventType {
    pub fn code(self) -> &'static str {
        match self {
            NotifyEventType::TsCreated => "T",
            NotifyEventType::TsDeleted => "D",
            NotifyEventType::TsModified => "M",
            NotifyEventType::ComputationModified => "C",
            NotifyEventType::GroupModified => "G",
            NotifyEventType::FullEvaluation => "F",
        }
    }

    pub fn from_code(code: &str) -> DepsResult<Self> {
        match code.trim() {
            "T" | "t" => Ok(NotifyEventType::TsCreated),
            "D" | "d" => Ok(NotifyEventType::TsDeleted),
            "M" | "m" => Ok(NotifyEventType::TsModified),
            "C" | "c" => Ok(NotifyEventType::ComputationModified),
            "G" | "g" => Ok(NotifyEventType::GroupModified),
            "F" | "f" => Ok(NotifyEventType::FullEvaluation),
            other => Err(DepsError::validation(format!(
                "unknown notification event type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for NotifyEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotifyEventType::TsCreated => "ts-created",
            NotifyEventType::TsDeleted => "ts-deleted",
            NotifyEventType::TsModified => "ts-modified",
            NotifyEventType::ComputationModified => "computation-modified",
            NotifyEventType::GroupModified => "group-modified",
            NotifyEventType::FullEvaluation => "full-evaluation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Queue sequence number, breaks enqueue-time ties
    pub record_num: i64,
    pub event_type: NotifyEventType,
    pub key: DbKey,
    /// Milliseconds since epoch
    pub enqueued_at: i64,
    /// Consumer token holding the lease (at-least-once delivery only)
    pub claimed_by: Option<String>,
}

impl NotificationRecord {
    /// Same event on the same target
    pub fn same_work(&self, other: &NotificationRecord) -> bool {
        self.event_type == other.event_type && self.key == other.key
    }
}

impl fmt::Display for NotificationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.record_num, self.event_type, self.key)
    }
}
