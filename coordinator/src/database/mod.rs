//! SQLite persistence for the local queue service and trigger flags.
//!
//! The module is organized into submodules:
//! - `records` - Row types
//! - `queue` - `WorkQueue` over the `queue_messages` table
//! - `triggers` - `TriggerControl` over the `triggers` table

mod queue;
mod records;
mod triggers;

pub use queue::SqliteWorkQueue;
pub use records::*;
pub use triggers::SqliteTriggerStore;

use anyhow::Result;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{error, info};

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        info!("Database path: {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("FAILED to create parent directory {:?}: {}", parent, e);
                return Err(e.into());
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = match SqlitePool::connect(&database_url).await {
            Ok(pool) => {
                info!("Successfully connected to SQLite database");
                pool
            }
            Err(e) => {
                error!("FAILED to connect to database: {}", e);
                error!("   Connection URL: {}", database_url);
                return Err(e.into());
            }
        };

        let database = Self { pool };
        if let Err(e) = database.initialize_tables().await {
            error!("CRITICAL: Database table initialization failed: {}", e);
            return Err(e);
        }

        info!("Database initialized");
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        let queue_table_sql = r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT UNIQUE NOT NULL,
                queue TEXT NOT NULL,
                body TEXT NOT NULL,
                attributes TEXT NOT NULL,
                sent_at INTEGER NOT NULL,
                visible_at INTEGER NOT NULL,
                receipt_handle TEXT,
                receive_count INTEGER NOT NULL DEFAULT 0
            )
        "#;
        if let Err(e) = sqlx::query(queue_table_sql).execute(&self.pool).await {
            error!("FAILED to create queue_messages table: {}", e);
            return Err(e.into());
        }

        let queue_index_sql =
            "CREATE INDEX IF NOT EXISTS idx_queue_visibility ON queue_messages(queue, visible_at)";
        if let Err(e) = sqlx::query(queue_index_sql).execute(&self.pool).await {
            error!("FAILED to create queue_messages index: {}", e);
            return Err(e.into());
        }
        info!("queue_messages table ready");

        let triggers_table_sql = r#"
            CREATE TABLE IF NOT EXISTS triggers (
                name TEXT PRIMARY KEY,
                enabled BOOLEAN NOT NULL,
                updated_at DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(triggers_table_sql).execute(&self.pool).await {
            error!("FAILED to create triggers table: {}", e);
            return Err(e.into());
        }
        info!("triggers table ready");

        Ok(())
    }
}
