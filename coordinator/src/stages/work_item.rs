//! Queue payloads exchanged between the stages
//!
//! Work items travel as message attributes; the body is only a human-readable note.

use std::collections::HashMap;

use super::Stage;
use crate::constants::attributes;
use crate::provider::QueueMessage;
use crate::window::MaintenanceWindow;

/// Deferred stop: the instance and the window resolved when it was detected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopWorkItem {
    pub instance_id: String,
    pub window: MaintenanceWindow,
}

/// Pending start after a completed stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartWorkItem {
    pub instance_id: String,
}

fn instance_id(message: &QueueMessage) -> Result<String, String> {
    message
        .attributes
        .get(attributes::INSTANCE_ID)
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("missing {} attribute", attributes::INSTANCE_ID))
}

impl StopWorkItem {
    pub fn attributes(&self) -> HashMap<String, String> {
        HashMap::from([
            (attributes::INSTANCE_ID.to_string(), self.instance_id.clone()),
            (attributes::WINDOW_START.to_string(), self.window.start().to_string()),
            (attributes::WINDOW_END.to_string(), self.window.end().to_string()),
        ])
    }

    pub fn body(&self, from: Stage) -> String {
        format!(
            "From {}: Instance stop has been queued for {}",
            from, self.instance_id
        )
    }

    pub fn from_message(message: &QueueMessage) -> Result<Self, String> {
        let instance_id = instance_id(message)?;
        let bound = |name: &str| {
            message
                .attributes
                .get(name)
                .ok_or_else(|| format!("missing {} attribute", name))
        };
        let window = MaintenanceWindow::parse(
            bound(attributes::WINDOW_START)?,
            bound(attributes::WINDOW_END)?,
        )
        .map_err(|e| e.to_string())?;

        Ok(Self {
            instance_id,
            window,
        })
    }
}

impl StartWorkItem {
    pub fn attributes(&self) -> HashMap<String, String> {
        HashMap::from([(attributes::INSTANCE_ID.to_string(), self.instance_id.clone())])
    }

    pub fn body(&self, from: Stage) -> String {
        format!(
            "From {}: Instance start scheduled for {}",
            from, self.instance_id
        )
    }

    pub fn from_message(message: &QueueMessage) -> Result<Self, String> {
        Ok(Self {
            instance_id: instance_id(message)?,
        })
    }
}
