//! Database record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A row of `queue_messages`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub message_id: String,
    pub queue: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
    pub sent_at: DateTime<Utc>,
    pub visible_at: DateTime<Utc>,
    pub receipt_handle: Option<String>,
    pub receive_count: i64,
}

/// A row of `triggers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub name: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}
