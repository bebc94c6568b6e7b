//! The three retirement stages
//!
//! Each stage is a short, sequential, stateless invocation. Stages never call each other:
//!
//! - **Detector** finds one instance carrying a retirement signal and either stops it now
//!   (window open) or queues a stop item and enables the stop trigger.
//! - **StopWorker** drains one stop item per invocation and stops the instance once the
//!   window is open, then queues a start item and swaps the triggers.
//! - **StartWorker** drains one start item per invocation and starts the instance once the
//!   provider reports it stopped, then disables its own trigger.
//!
//! Only an authorization failure on a dry-run check fails an invocation. Every other problem
//! is logged and either left to queue redelivery or to the next scheduled scan.

pub mod detector;
pub mod start_worker;
pub mod stop_worker;
pub mod work_item;

pub use detector::Detector;
pub use start_worker::StartWorker;
pub use stop_worker::StopWorker;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, warn};

use crate::clock::Clock;
use crate::config::RetirementSettings;
use crate::errors::{CoordinatorError, PowerAction, ProviderError, Result};
use crate::provider::{Inventory, PowerControl, TriggerControl, WorkQueue};
use crate::retirement_ledger::{RetirementLedger, RetirementStage};
use work_item::StartWorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Detector,
    StopWorker,
    StartWorker,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Detector, Stage::StopWorker, Stage::StartWorker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Detector => "detector",
            Stage::StopWorker => "stop-worker",
            Stage::StartWorker => "start-worker",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

/// What an invocation ended up doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    NoRetirementFound,
    InventoryUnavailable,
    StoppedImmediately { instance_id: String },
    ImmediateStopFailed { instance_id: String },
    StopDeferred { instance_id: String },
    DeferFailed { instance_id: String },
    QueueIdle,
    QueueUnavailable,
    DiscardedMalformed { message_id: String },
    /// Stop item for an instance the ledger already shows as stopped or restarted
    StaleItemDropped { instance_id: String },
    OutsideWindow { instance_id: String },
    Stopped { instance_id: String },
    StopFailed { instance_id: String },
    StateUnavailable { instance_id: String },
    NotYetStopped { instance_id: String, state: String },
    Started { instance_id: String },
    StartFailed { instance_id: String },
    /// The power action succeeded but queue or trigger bookkeeping after it did not
    FollowUpFailed { instance_id: String, step: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InvocationReport {
    pub stage: Stage,
    pub outcome: Outcome,
    pub message: String,
}

impl InvocationReport {
    pub fn new(stage: Stage, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            stage,
            outcome,
            message: message.into(),
        }
    }
}

/// Response envelope returned to whatever invoked the stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl From<&InvocationReport> for InvocationResponse {
    fn from(report: &InvocationReport) -> Self {
        Self {
            status_code: 200,
            body: report.message.clone(),
        }
    }
}

/// Collaborators and settings shared by all stages
#[derive(Clone)]
pub struct StageContext {
    pub inventory: Arc<dyn Inventory>,
    pub power: Arc<dyn PowerControl>,
    pub queue: Arc<dyn WorkQueue>,
    pub triggers: Arc<dyn TriggerControl>,
    pub clock: Arc<dyn Clock>,
    pub ledger: RetirementLedger,
    pub settings: Arc<RetirementSettings>,
}

impl StageContext {
    /// Dry-run permission check; anything but a confirmation is fatal
    pub(crate) async fn authorize(&self, action: PowerAction, instance_id: &str) -> Result<()> {
        self.power
            .dry_run(action, instance_id)
            .await
            .map_err(|source| {
                error!(
                    "You do not have permission to {} instances ({}): {}",
                    action, instance_id, source
                );
                CoordinatorError::Authorization {
                    action,
                    instance_id: instance_id.to_string(),
                    source,
                }
            })
    }

    /// Queue the start item for a stopped instance and enable the start trigger
    pub(crate) async fn hand_off_to_start(
        &self,
        from: Stage,
        instance_id: &str,
        delay_seconds: u32,
    ) -> std::result::Result<(), (&'static str, ProviderError)> {
        let item = StartWorkItem {
            instance_id: instance_id.to_string(),
        };
        self.queue
            .send(
                &self.settings.start_queue,
                &item.body(from),
                &item.attributes(),
                delay_seconds,
            )
            .await
            .map_err(|e| ("send start item", e))?;
        tracing::info!("Message sent to the start queue for {}", instance_id);

        self.triggers
            .enable(&self.settings.start_trigger)
            .await
            .map_err(|e| ("enable start trigger", e))?;
        tracing::info!("{} has been enabled", self.settings.start_trigger);
        Ok(())
    }

    /// Hand an in-flight instance back to the Detector after a broken hand-off
    pub(crate) async fn release(&self, instance_id: &str) {
        if let Some(from) = self.ledger.release(instance_id, self.clock.now()).await {
            warn!("{} left {}; the next scan will pick it up again", instance_id, from);
        }
    }

    /// Record a ledger transition; rejections are logged, never fatal
    pub(crate) async fn advance(&self, instance_id: &str, to: RetirementStage) {
        if let Err(e) = self
            .ledger
            .transition(instance_id, to, self.clock.now())
            .await
        {
            warn!("{}", e);
        }
    }
}

/// Runs any stage by name; shared by the scheduler, the CLI and the invocation API
#[derive(Clone)]
pub struct StageRunner {
    detector: Arc<Detector>,
    stop_worker: Arc<StopWorker>,
    start_worker: Arc<StartWorker>,
    context: StageContext,
}

impl StageRunner {
    pub fn new(context: StageContext) -> Self {
        Self {
            detector: Arc::new(Detector::new(context.clone())),
            stop_worker: Arc::new(StopWorker::new(context.clone())),
            start_worker: Arc::new(StartWorker::new(context.clone())),
            context,
        }
    }

    pub fn context(&self) -> &StageContext {
        &self.context
    }

    pub async fn invoke(&self, stage: Stage) -> Result<InvocationReport> {
        match stage {
            Stage::Detector => self.detector.run().await,
            Stage::StopWorker => self.stop_worker.run().await,
            Stage::StartWorker => self.start_worker.run().await,
        }
    }
}
