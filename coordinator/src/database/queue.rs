//! Local queue service over `queue_messages`.
//!
//! Visibility is kept as epoch milliseconds taken from the injected clock, so the same
//! delay/visibility rules hold under a manual clock in tests. Each receive stamps a fresh
//! receipt handle; only the latest handle deletes.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::records::QueueRecord;
use super::Database;
use crate::clock::Clock;
use crate::constants::queue::LONG_POLL_INTERVAL;
use crate::errors::ProviderError;
use crate::provider::{QueueMessage, WorkQueue};

pub struct SqliteWorkQueue {
    database: Arc<Database>,
    clock: Arc<dyn Clock>,
}

fn millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

fn from_millis(value: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value).unwrap_or_default()
}

fn decode_attributes(raw: &str) -> Result<HashMap<String, String>, ProviderError> {
    serde_json::from_str(raw)
        .map_err(|e| ProviderError::Storage(format!("corrupt message attributes: {}", e)))
}

impl SqliteWorkQueue {
    pub fn new(database: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { database, clock }
    }

    /// Every message in `queue`, visible or not, oldest first
    pub async fn list(&self, queue: &str) -> Result<Vec<QueueRecord>, ProviderError> {
        let rows = sqlx::query(
            r#"
            SELECT message_id, queue, body, attributes, sent_at, visible_at,
                   receipt_handle, receive_count
            FROM queue_messages
            WHERE queue = ?
            ORDER BY seq
            "#,
        )
        .bind(queue)
        .fetch_all(self.database.pool())
        .await?;

        rows.into_iter()
            .map(|row| -> Result<QueueRecord, ProviderError> {
                let attributes: String = row.try_get("attributes")?;
                Ok(QueueRecord {
                    message_id: row.try_get("message_id")?,
                    queue: row.try_get("queue")?,
                    body: row.try_get("body")?,
                    attributes: decode_attributes(&attributes)?,
                    sent_at: from_millis(row.try_get("sent_at")?),
                    visible_at: from_millis(row.try_get("visible_at")?),
                    receipt_handle: row.try_get("receipt_handle")?,
                    receive_count: row.try_get("receive_count")?,
                })
            })
            .collect()
    }

    /// Claim the oldest visible message in one statement
    async fn claim(
        &self,
        queue: &str,
        visibility_timeout: u32,
    ) -> Result<Option<QueueMessage>, ProviderError> {
        let now = self.clock.now();
        let receipt_handle = Uuid::new_v4().to_string();
        let hidden_until = now + Duration::seconds(i64::from(visibility_timeout));

        let row = sqlx::query(
            r#"
            UPDATE queue_messages
            SET receipt_handle = ?, visible_at = ?, receive_count = receive_count + 1
            WHERE seq = (
                SELECT seq FROM queue_messages
                WHERE queue = ? AND visible_at <= ?
                ORDER BY seq
                LIMIT 1
            )
            RETURNING message_id, body, attributes
            "#,
        )
        .bind(&receipt_handle)
        .bind(millis(hidden_until))
        .bind(queue)
        .bind(millis(now))
        .fetch_optional(self.database.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let attributes: String = row.try_get("attributes")?;
        Ok(Some(QueueMessage {
            message_id: row.try_get("message_id")?,
            receipt_handle,
            body: row.try_get("body")?,
            attributes: decode_attributes(&attributes)?,
        }))
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn send(
        &self,
        queue: &str,
        body: &str,
        attributes: &HashMap<String, String>,
        delay_seconds: u32,
    ) -> Result<String, ProviderError> {
        let message_id = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let encoded = serde_json::to_string(attributes)
            .map_err(|e| ProviderError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO queue_messages (
                message_id, queue, body, attributes, sent_at, visible_at, receive_count
            ) VALUES (?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&message_id)
        .bind(queue)
        .bind(body)
        .bind(encoded)
        .bind(millis(now))
        .bind(millis(now + Duration::seconds(i64::from(delay_seconds))))
        .execute(self.database.pool())
        .await?;

        debug!("Queued {} on {} (delay {}s)", message_id, queue, delay_seconds);
        Ok(message_id)
    }

    async fn receive_one(
        &self,
        queue: &str,
        wait_seconds: u32,
        visibility_timeout: u32,
    ) -> Result<Option<QueueMessage>, ProviderError> {
        let deadline =
            tokio::time::Instant::now() + std::time::Duration::from_secs(u64::from(wait_seconds));

        loop {
            if let Some(message) = self.claim(queue, visibility_timeout).await? {
                debug!("Received {} from {}", message.message_id, queue);
                return Ok(Some(message));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(LONG_POLL_INTERVAL).await;
        }
    }

    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<(), ProviderError> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE queue = ? AND receipt_handle = ?")
            .bind(queue)
            .bind(receipt_handle)
            .execute(self.database.pool())
            .await?;

        if result.rows_affected() == 0 {
            debug!("Receipt handle {} on {} is stale, nothing deleted", receipt_handle, queue);
        }
        Ok(())
    }
}
