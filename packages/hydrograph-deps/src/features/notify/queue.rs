//! Durable cross-process work queue (`cp_depends_notify`)
//!
//! Ordering is (enqueue time, record number). Every dequeue is one
//! conditional statement, so two consumers never both win the same record.
//!
//! Delivery modes:
//! - **at-least-once** (default): dequeue claims the record under a lease;
//!   `ack` deletes it, `release` hands it back, and a lapsed lease makes it
//!   visible to any consumer again.
//! - **at-most-once**: dequeue deletes the record; `ack`/`release` do nothing.

use super::model::{NotificationRecord, NotifyEventType};
use crate::config::{DeliveryMode, NotifyConfig};
use crate::errors::DepsResult;
use crate::shared::clock::Clock;
use crate::shared::models::DbKey;
use hydrograph_storage::{sql_params, Row, StatementExecutor};
use std::sync::Arc;

const CLAIM_OLDEST: &str = "UPDATE cp_depends_notify SET claimed_by = ?1, claimed_at = ?2 \
     WHERE record_num = (SELECT record_num FROM cp_depends_notify \
                         WHERE claimed_by IS NULL OR claimed_at <= ?3 \
                         ORDER BY enqueued_at, record_num LIMIT 1) \
       AND (claimed_by IS NULL OR claimed_at <= ?3) \
     RETURNING record_num, event_type, target_key, enqueued_at, claimed_by";

const TAKE_OLDEST: &str = "DELETE FROM cp_depends_notify \
     WHERE record_num = (SELECT record_num FROM cp_depends_notify \
                         WHERE claimed_by IS NULL OR claimed_at <= ?1 \
                         ORDER BY enqueued_at, record_num LIMIT 1) \
       AND (claimed_by IS NULL OR claimed_at <= ?1) \
     RETURNING record_num, event_type, target_key, enqueued_at, NULL AS claimed_by";

pub struct NotificationQueue {
    db: Arc<dyn StatementExecutor>,
    clock: Arc<dyn Clock>,
    config: NotifyConfig,
    consumer: String,
}

impl NotificationQueue {
    pub fn new(db: Arc<dyn StatementExecutor>, clock: Arc<dyn Clock>, config: NotifyConfig) -> Self {
        Self {
            db,
            clock,
            config,
            consumer: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Override the consumer token that claims are recorded under
    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub fn delivery(&self) -> DeliveryMode {
        self.config.delivery
    }

    /// Append a record stamped with the current time; returns its sequence
    pub fn enqueue(&self, event_type: NotifyEventType, key: DbKey) -> DepsResult<i64> {
        let now = self.clock.now_millis();
        let row = self.db.query_one(
            "INSERT INTO cp_depends_notify (event_type, target_key, enqueued_at) \
             VALUES (?1, ?2, ?3) RETURNING record_num",
            &sql_params![event_type.code(), key, now],
        )?;
        let record_num = match row {
            Some(r) => r.get_i64("record_num")?,
            None => {
                return Err(crate::errors::DepsError::validation(
                    "notification insert returned no sequence",
                ))
            }
        };
        tracing::debug!(record_num, event = %event_type, key = %key, "notification enqueued");
        Ok(record_num)
    }

    /// Oldest visible record, or `None` when the queue is empty
    pub fn dequeue_oldest(&self) -> DepsResult<Option<NotificationRecord>> {
        loop {
            let now = self.clock.now_millis();
            let lease_expiry = now - self.config.lease_secs as i64 * 1000;
            let row = match self.config.delivery {
                DeliveryMode::AtLeastOnce => self.db.query_one(
                    CLAIM_OLDEST,
                    &sql_params![self.consumer.as_str(), now, lease_expiry],
                )?,
                DeliveryMode::AtMostOnce => {
                    self.db.query_one(TAKE_OLDEST, &sql_params![lease_expiry])?
                }
            };
            let Some(row) = row else {
                return Ok(None);
            };

            match record_from_row(&row) {
                Ok(record) => {
                    tracing::debug!(record = %record, consumer = %self.consumer, "notification dequeued");
                    return Ok(Some(record));
                }
                Err(e) => {
                    // Unreadable records would block the head of the queue forever
                    let record_num = row.get_i64("record_num")?;
                    tracing::warn!(record_num, error = %e, "discarding unreadable notification");
                    self.db.execute(
                        "DELETE FROM cp_depends_notify WHERE record_num = ?1",
                        &sql_params![record_num],
                    )?;
                }
            }
        }
    }

    /// Processing finished: drop the record for good
    pub fn ack(&self, record: &NotificationRecord) -> DepsResult<bool> {
        if self.config.delivery == DeliveryMode::AtMostOnce {
            return Ok(true);
        }
        let n = self.db.execute(
            "DELETE FROM cp_depends_notify WHERE record_num = ?1 AND claimed_by = ?2",
            &sql_params![record.record_num, self.consumer.as_str()],
        )?;
        if n == 0 {
            tracing::warn!(record = %record, "ack after lease was lost; record may be processed twice");
        }
        Ok(n > 0)
    }

    /// Processing failed: make the record visible again immediately
    pub fn release(&self, record: &NotificationRecord) -> DepsResult<bool> {
        if self.config.delivery == DeliveryMode::AtMostOnce {
            return Ok(false);
        }
        let n = self.db.execute(
            "UPDATE cp_depends_notify SET claimed_by = NULL, claimed_at = NULL \
             WHERE record_num = ?1 AND claimed_by = ?2",
            &sql_params![record.record_num, self.consumer.as_str()],
        )?;
        Ok(n > 0)
    }

    /// Records still stored, claimed or not
    pub fn len(&self) -> DepsResult<usize> {
        let row = self
            .db
            .query_one("SELECT COUNT(*) AS n FROM cp_depends_notify", &[])?;
        Ok(match row {
            Some(r) => r.get_i64("n")?.max(0) as usize,
            None => 0,
        })
    }

    pub fn is_empty(&self) -> DepsResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn record_from_row(row: &Row) -> DepsResult<NotificationRecord> {
    Ok(NotificationRecord {
        record_num: row.get_i64("record_num")?,
        event_type: NotifyEventType::from_code(&row.get_string("event_type")?)?,
        key: DbKey(row.get_i64("target_key")?),
        enqueued_at: row.get_i64("enqueued_at")?,
        claimed_by: row.get_opt_string("claimed_by")?,
    })
}
