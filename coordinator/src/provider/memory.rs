//! In-memory collaborators
//!
//! A small simulated fleet, queue service and trigger store. They keep the same observable
//! contracts as the real adapters (delayed visibility, per-delivery receipt handles, dry-run
//! semantics) and record every call so tests can assert on side effects. Faults can be
//! injected per operation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{InstanceState, Inventory, PowerControl, QueueMessage, TriggerControl, WorkQueue};
use crate::clock::Clock;
use crate::errors::{PowerAction, ProviderError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Consume one injected failure, if any are left
fn take_fault(counter: &mut u32, operation: &str, service: &str) -> Result<(), ProviderError> {
    if *counter > 0 {
        *counter -= 1;
        return Err(ProviderError::Api {
            operation: operation.to_string(),
            code: "ServiceUnavailable".to_string(),
            message: format!("{} unavailable", service),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FleetInstance {
    pub status_code: Option<String>,
    pub state: InstanceState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerCall {
    pub action: PowerAction,
    pub instance_id: String,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
struct FleetFaults {
    denied: HashSet<PowerAction>,
    failing_executions: HashMap<PowerAction, u32>,
    failing_status: HashSet<String>,
    failing_state: HashSet<String>,
}

/// Simulated compute inventory with power control
#[derive(Debug, Default)]
pub struct MemoryFleet {
    instances: Mutex<BTreeMap<String, FleetInstance>>,
    calls: Mutex<Vec<PowerCall>>,
    faults: Mutex<FleetFaults>,
}

impl MemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instance(&self, instance_id: &str, state: InstanceState, status_code: Option<&str>) {
        lock(&self.instances).insert(
            instance_id.to_string(),
            FleetInstance {
                status_code: status_code.map(str::to_string),
                state,
            },
        );
    }

    pub fn set_state(&self, instance_id: &str, state: InstanceState) {
        if let Some(instance) = lock(&self.instances).get_mut(instance_id) {
            instance.state = state;
        }
    }

    pub fn set_status_code(&self, instance_id: &str, status_code: Option<&str>) {
        if let Some(instance) = lock(&self.instances).get_mut(instance_id) {
            instance.status_code = status_code.map(str::to_string);
        }
    }

    pub fn state_of(&self, instance_id: &str) -> Option<InstanceState> {
        lock(&self.instances)
            .get(instance_id)
            .map(|instance| instance.state.clone())
    }

    /// Settle in-progress transitions the way the provider eventually would
    pub fn settle(&self) {
        for instance in lock(&self.instances).values_mut() {
            instance.state = match instance.state {
                InstanceState::Stopping => InstanceState::Stopped,
                InstanceState::Pending => InstanceState::Running,
                ref other => other.clone(),
            };
        }
    }

    /// Every dry-run for `action` is refused from now on
    pub fn deny(&self, action: PowerAction) {
        lock(&self.faults).denied.insert(action);
    }

    /// The next `times` real calls for `action` fail with a provider error
    pub fn fail_next(&self, action: PowerAction, times: u32) {
        lock(&self.faults).failing_executions.insert(action, times);
    }

    pub fn fail_status_lookup(&self, instance_id: &str) {
        lock(&self.faults)
            .failing_status
            .insert(instance_id.to_string());
    }

    pub fn fail_state_lookup(&self, instance_id: &str) {
        lock(&self.faults)
            .failing_state
            .insert(instance_id.to_string());
    }

    pub fn calls(&self) -> Vec<PowerCall> {
        lock(&self.calls).clone()
    }

    /// Instances a real (non dry-run) `action` call succeeded or was attempted for
    pub fn executed(&self, action: PowerAction) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|call| call.action == action && !call.dry_run)
            .map(|call| call.instance_id.clone())
            .collect()
    }

    fn record(&self, action: PowerAction, instance_id: &str, dry_run: bool) {
        lock(&self.calls).push(PowerCall {
            action,
            instance_id: instance_id.to_string(),
            dry_run,
        });
    }

    fn not_found(instance_id: &str) -> ProviderError {
        ProviderError::InstanceNotFound {
            instance_id: instance_id.to_string(),
        }
    }
}

#[async_trait]
impl Inventory for MemoryFleet {
    async fn list_instances(&self) -> Result<Vec<String>, ProviderError> {
        Ok(lock(&self.instances).keys().cloned().collect())
    }

    async fn health_status(&self, instance_id: &str) -> Result<Option<String>, ProviderError> {
        if lock(&self.faults).failing_status.contains(instance_id) {
            return Err(ProviderError::Api {
                operation: "describe-instance-status".to_string(),
                code: "InternalError".to_string(),
                message: format!("status unavailable for {}", instance_id),
            });
        }
        lock(&self.instances)
            .get(instance_id)
            .map(|instance| instance.status_code.clone())
            .ok_or_else(|| Self::not_found(instance_id))
    }

    async fn runtime_state(&self, instance_id: &str) -> Result<InstanceState, ProviderError> {
        if lock(&self.faults).failing_state.contains(instance_id) {
            return Err(ProviderError::Api {
                operation: "describe-instances".to_string(),
                code: "InternalError".to_string(),
                message: format!("state unavailable for {}", instance_id),
            });
        }
        self.state_of(instance_id)
            .ok_or_else(|| Self::not_found(instance_id))
    }
}

#[async_trait]
impl PowerControl for MemoryFleet {
    async fn dry_run(&self, action: PowerAction, instance_id: &str) -> Result<(), ProviderError> {
        self.record(action, instance_id, true);
        if lock(&self.faults).denied.contains(&action) {
            return Err(ProviderError::DryRunDenied {
                action,
                instance_id: instance_id.to_string(),
                reason: "UnauthorizedOperation".to_string(),
            });
        }
        if !lock(&self.instances).contains_key(instance_id) {
            return Err(Self::not_found(instance_id));
        }
        Ok(())
    }

    async fn execute(&self, action: PowerAction, instance_id: &str) -> Result<(), ProviderError> {
        self.record(action, instance_id, false);

        {
            let mut faults = lock(&self.faults);
            if let Some(remaining) = faults.failing_executions.get_mut(&action) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ProviderError::Api {
                        operation: format!("{}-instances", action),
                        code: "IncorrectInstanceState".to_string(),
                        message: format!("cannot {} {} right now", action, instance_id),
                    });
                }
            }
        }

        let mut instances = lock(&self.instances);
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| Self::not_found(instance_id))?;

        match action {
            PowerAction::Stop => {
                if !matches!(
                    instance.state,
                    InstanceState::Stopped | InstanceState::Stopping
                ) {
                    instance.state = InstanceState::Stopping;
                }
                // Stopping moves the instance off the retiring host
                instance.status_code = None;
            }
            PowerAction::Start => {
                if instance.state.is_stopped() {
                    instance.state = InstanceState::Pending;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: HashMap<String, String>,
    visible_at: DateTime<Utc>,
    receipt_handle: Option<String>,
    receive_count: u32,
}

/// Snapshot of a queued message, including ones that are currently invisible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedItem {
    pub message_id: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
    pub visible_at: DateTime<Utc>,
    pub receive_count: u32,
}

#[derive(Debug, Default)]
struct QueueFaults {
    failing_sends: u32,
    failing_deletes: u32,
    failing_receives: u32,
}

/// Visibility-delayed queues keyed by queue name
pub struct MemoryQueue {
    clock: Arc<dyn Clock>,
    queues: Mutex<HashMap<String, VecDeque<StoredMessage>>>,
    faults: Mutex<QueueFaults>,
}

impl MemoryQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            queues: Mutex::new(HashMap::new()),
            faults: Mutex::new(QueueFaults::default()),
        }
    }

    pub fn items(&self, queue: &str) -> Vec<QueuedItem> {
        lock(&self.queues)
            .get(queue)
            .map(|messages| {
                messages
                    .iter()
                    .map(|m| QueuedItem {
                        message_id: m.message_id.clone(),
                        body: m.body.clone(),
                        attributes: m.attributes.clone(),
                        visible_at: m.visible_at,
                        receive_count: m.receive_count,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, queue: &str) -> usize {
        lock(&self.queues).get(queue).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    pub fn fail_next_sends(&self, times: u32) {
        lock(&self.faults).failing_sends = times;
    }

    pub fn fail_next_deletes(&self, times: u32) {
        lock(&self.faults).failing_deletes = times;
    }

    pub fn fail_next_receives(&self, times: u32) {
        lock(&self.faults).failing_receives = times;
    }

}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn send(
        &self,
        queue: &str,
        body: &str,
        attributes: &HashMap<String, String>,
        delay_seconds: u32,
    ) -> Result<String, ProviderError> {
        take_fault(&mut lock(&self.faults).failing_sends, "send-message", "queue service")?;

        let message_id = Uuid::new_v4().to_string();
        lock(&self.queues)
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                message_id: message_id.clone(),
                body: body.to_string(),
                attributes: attributes.clone(),
                visible_at: self.clock.now() + Duration::seconds(i64::from(delay_seconds)),
                receipt_handle: None,
                receive_count: 0,
            });
        Ok(message_id)
    }

    async fn receive_one(
        &self,
        queue: &str,
        _wait_seconds: u32,
        visibility_timeout: u32,
    ) -> Result<Option<QueueMessage>, ProviderError> {
        take_fault(&mut lock(&self.faults).failing_receives, "receive-message", "queue service")?;

        let now = self.clock.now();
        let mut queues = lock(&self.queues);
        let Some(messages) = queues.get_mut(queue) else {
            return Ok(None);
        };

        let Some(message) = messages.iter_mut().find(|m| m.visible_at <= now) else {
            return Ok(None);
        };

        let receipt_handle = Uuid::new_v4().to_string();
        message.receipt_handle = Some(receipt_handle.clone());
        message.visible_at = now + Duration::seconds(i64::from(visibility_timeout));
        message.receive_count += 1;

        Ok(Some(QueueMessage {
            message_id: message.message_id.clone(),
            receipt_handle,
            body: message.body.clone(),
            attributes: message.attributes.clone(),
        }))
    }

    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<(), ProviderError> {
        take_fault(&mut lock(&self.faults).failing_deletes, "delete-message", "queue service")?;

        if let Some(messages) = lock(&self.queues).get_mut(queue) {
            messages.retain(|m| m.receipt_handle.as_deref() != Some(receipt_handle));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TriggerFaults {
    failing_enables: u32,
    failing_disables: u32,
}

/// Trigger flags with a history of every successful toggle
#[derive(Debug, Default)]
pub struct MemoryTriggers {
    flags: Mutex<HashMap<String, bool>>,
    history: Mutex<Vec<(String, bool)>>,
    faults: Mutex<TriggerFaults>,
}

impl MemoryTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self, trigger: &str) -> bool {
        lock(&self.flags).get(trigger).copied().unwrap_or(false)
    }

    /// Every enable (`true`) / disable (`false`) call in order
    pub fn history(&self) -> Vec<(String, bool)> {
        lock(&self.history).clone()
    }

    /// The next `times` enable calls fail and leave the flag untouched
    pub fn fail_next_enables(&self, times: u32) {
        lock(&self.faults).failing_enables = times;
    }

    pub fn fail_next_disables(&self, times: u32) {
        lock(&self.faults).failing_disables = times;
    }

    fn set(&self, trigger: &str, enabled: bool) {
        lock(&self.flags).insert(trigger.to_string(), enabled);
        lock(&self.history).push((trigger.to_string(), enabled));
    }
}

#[async_trait]
impl TriggerControl for MemoryTriggers {
    async fn enable(&self, trigger: &str) -> Result<(), ProviderError> {
        take_fault(&mut lock(&self.faults).failing_enables, "enable-rule", "trigger service")?;
        self.set(trigger, true);
        Ok(())
    }

    async fn disable(&self, trigger: &str) -> Result<(), ProviderError> {
        take_fault(&mut lock(&self.faults).failing_disables, "disable-rule", "trigger service")?;
        self.set(trigger, false);
        Ok(())
    }

    async fn is_enabled(&self, trigger: &str) -> Result<bool, ProviderError> {
        Ok(self.enabled(trigger))
    }
}
