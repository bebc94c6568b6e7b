//! Collaborator interfaces the stages are written against
//!
//! The stages never talk to a concrete provider. They receive these traits as
//! `Arc<dyn Trait>` handles, which lets the service run against the HTTP compute API and the
//! SQLite queue/trigger store while tests run against the in-memory fleet in [`memory`].
//!
//! ```text
//! Detector ──► Inventory + PowerControl
//!    │
//!    ├──► WorkQueue (stop | start) ──► StopWorker / StartWorker
//!    └──► TriggerControl (enable)          │
//!                                          └──► TriggerControl (disable)
//! ```

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::{PowerAction, ProviderError};

/// Provider-reported lifecycle state of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    Other(String),
}

impl InstanceState {
    /// Case-insensitive mapping from the provider's state name
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            _ => InstanceState::Other(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Other(name) => name,
        }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        matches!(self, InstanceState::Stopped)
    }
}

impl From<String> for InstanceState {
    fn from(value: String) -> Self {
        InstanceState::from_name(&value)
    }
}

impl From<InstanceState> for String {
    fn from(value: InstanceState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message handed out by [`WorkQueue::receive_one`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    /// Handle for this particular delivery; a redelivery gets a new one
    pub receipt_handle: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
}

#[async_trait]
pub trait Inventory: Send + Sync {
    async fn list_instances(&self) -> Result<Vec<String>, ProviderError>;

    /// Latest health-event status code, if the instance has any scheduled event
    async fn health_status(&self, instance_id: &str) -> Result<Option<String>, ProviderError>;

    async fn runtime_state(&self, instance_id: &str) -> Result<InstanceState, ProviderError>;
}

#[async_trait]
pub trait PowerControl: Send + Sync {
    /// Permission check without effect. `Ok` means the provider confirmed the real call
    /// would be allowed; any error means it would not (or could not be confirmed).
    async fn dry_run(&self, action: PowerAction, instance_id: &str) -> Result<(), ProviderError>;

    async fn execute(&self, action: PowerAction, instance_id: &str) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a message that becomes visible after `delay_seconds`; returns its id
    async fn send(
        &self,
        queue: &str,
        body: &str,
        attributes: &HashMap<String, String>,
        delay_seconds: u32,
    ) -> Result<String, ProviderError>;

    /// Wait up to `wait_seconds` for one visible message and hide it for
    /// `visibility_timeout` seconds
    async fn receive_one(
        &self,
        queue: &str,
        wait_seconds: u32,
        visibility_timeout: u32,
    ) -> Result<Option<QueueMessage>, ProviderError>;

    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait TriggerControl: Send + Sync {
    async fn enable(&self, trigger: &str) -> Result<(), ProviderError>;

    async fn disable(&self, trigger: &str) -> Result<(), ProviderError>;

    async fn is_enabled(&self, trigger: &str) -> Result<bool, ProviderError>;
}
