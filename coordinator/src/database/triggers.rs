//! Trigger flags over the `triggers` table.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;
use tracing::debug;

use super::records::TriggerRecord;
use super::Database;
use crate::errors::ProviderError;
use crate::provider::TriggerControl;

pub struct SqliteTriggerStore {
    database: Arc<Database>,
}

impl SqliteTriggerStore {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    async fn set(&self, trigger: &str, enabled: bool) -> Result<(), ProviderError> {
        sqlx::query(
            r#"
            INSERT INTO triggers (name, enabled, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET enabled = excluded.enabled, updated_at = excluded.updated_at
            "#,
        )
        .bind(trigger)
        .bind(enabled)
        .bind(Utc::now())
        .execute(self.database.pool())
        .await?;

        debug!("Trigger {} set to {}", trigger, enabled);
        Ok(())
    }

    pub async fn get(&self, trigger: &str) -> Result<Option<TriggerRecord>, ProviderError> {
        let row = sqlx::query("SELECT name, enabled, updated_at FROM triggers WHERE name = ?")
            .bind(trigger)
            .fetch_optional(self.database.pool())
            .await?;

        row.map(|row| -> Result<TriggerRecord, ProviderError> {
            Ok(TriggerRecord {
                name: row.try_get("name")?,
                enabled: row.try_get("enabled")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl TriggerControl for SqliteTriggerStore {
    async fn enable(&self, trigger: &str) -> Result<(), ProviderError> {
        self.set(trigger, true).await
    }

    async fn disable(&self, trigger: &str) -> Result<(), ProviderError> {
        self.set(trigger, false).await
    }

    async fn is_enabled(&self, trigger: &str) -> Result<bool, ProviderError> {
        Ok(self
            .get(trigger)
            .await?
            .map(|record| record.enabled)
            .unwrap_or(false))
    }
}
