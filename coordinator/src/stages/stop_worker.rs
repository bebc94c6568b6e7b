// File: coordinator/src/stages/stop_worker.rs
use tracing::{error, info, instrument, warn};

use super::work_item::StopWorkItem;
use super::{InvocationReport, Outcome, Stage, StageContext};
use crate::constants::queue;
use crate::errors::{PowerAction, ProviderError, Result};
use crate::provider::QueueMessage;
use crate::retirement_ledger::RetirementStage;
use crate::window::TimeOfDay;

/// Drains the stop queue, one item per invocation, stopping instances once their window opens
pub struct StopWorker {
    ctx: StageContext,
}

impl StopWorker {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self), name = "stop_worker")]
    pub async fn run(&self) -> Result<InvocationReport> {
        let settings = &self.ctx.settings;
        let message = match self
            .ctx
            .queue
            .receive_one(
                &settings.stop_queue,
                settings.delays.receive_wait_seconds,
                queue::RECEIVE_VISIBILITY_TIMEOUT_SECONDS,
            )
            .await
        {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!("No messages found in the stop queue");
                return Ok(self.report(Outcome::QueueIdle, "Stop queue is empty"));
            }
            Err(e) => {
                warn!("Unable to receive from {}: {}", settings.stop_queue, e);
                return Ok(self.report(
                    Outcome::QueueUnavailable,
                    format!("Stop queue unavailable: {}", e),
                ));
            }
        };
        info!(
            "Received message from the stop queue. Receipt handle: {}",
            message.receipt_handle
        );

        let item = match StopWorkItem::from_message(&message) {
            Ok(item) => item,
            Err(reason) => return Ok(self.discard(&message, &reason).await),
        };

        // A leftover item from a re-queued deferral; the instance was already stopped
        if let Some(stage) = self.ctx.ledger.stage_of(&item.instance_id).await {
            if matches!(stage, RetirementStage::PendingStart | RetirementStage::Started) {
                return Ok(self.drop_stale(&message, &item.instance_id, stage).await);
            }
        }

        let current = TimeOfDay::of(self.ctx.clock.now());
        if !item.window.contains(current) {
            info!(
                "Not within the timeframe ({} outside {}), not stopping {}",
                current, item.window, item.instance_id
            );
            return Ok(self.report(
                Outcome::OutsideWindow {
                    instance_id: item.instance_id.clone(),
                },
                format!("Waiting for window {} to stop {}", item.window, item.instance_id),
            ));
        }

        info!("Within the timeframe, attempting to stop instance {}", item.instance_id);
        self.ctx
            .authorize(PowerAction::Stop, &item.instance_id)
            .await?;

        if let Err(e) = self
            .ctx
            .power
            .execute(PowerAction::Stop, &item.instance_id)
            .await
        {
            warn!("Error stopping {}, leaving message queued: {}", item.instance_id, e);
            return Ok(self.report(
                Outcome::StopFailed {
                    instance_id: item.instance_id.clone(),
                },
                format!("Stop of {} failed: {}", item.instance_id, e),
            ));
        }
        info!("Instance {} is stopping", item.instance_id);

        if let Err((step, e)) = self.follow_up(&message, &item.instance_id).await {
            error!("Instance {} stopped but {} failed: {}", item.instance_id, step, e);
            self.ctx.release(&item.instance_id).await;
            return Ok(self.report(
                Outcome::FollowUpFailed {
                    instance_id: item.instance_id.clone(),
                    step: step.to_string(),
                },
                format!("Instance {} stopped; {} failed: {}", item.instance_id, step, e),
            ));
        }
        self.ctx
            .advance(&item.instance_id, RetirementStage::PendingStart)
            .await;

        Ok(self.report(
            Outcome::Stopped {
                instance_id: item.instance_id.clone(),
            },
            format!("Instance {} stopped; start scheduled", item.instance_id),
        ))
    }

    /// Delete the item, park this worker, and hand the instance to the start worker
    async fn follow_up(
        &self,
        message: &QueueMessage,
        instance_id: &str,
    ) -> std::result::Result<(), (&'static str, ProviderError)> {
        let settings = &self.ctx.settings;

        self.ctx
            .queue
            .delete(&settings.stop_queue, &message.receipt_handle)
            .await
            .map_err(|e| ("delete stop item", e))?;
        info!("Deleted message: {}", message.receipt_handle);

        self.ctx
            .triggers
            .disable(&settings.stop_trigger)
            .await
            .map_err(|e| ("disable stop trigger", e))?;
        info!("{} has been disabled", settings.stop_trigger);

        self.ctx
            .hand_off_to_start(
                Stage::StopWorker,
                instance_id,
                settings.delays.stop_worker_start_delay_seconds,
            )
            .await
    }

    async fn discard(&self, message: &QueueMessage, reason: &str) -> InvocationReport {
        error!(
            "Discarding malformed stop item {}: {}",
            message.message_id, reason
        );
        if let Err(e) = self
            .ctx
            .queue
            .delete(&self.ctx.settings.stop_queue, &message.receipt_handle)
            .await
        {
            warn!("Unable to delete malformed item {}: {}", message.message_id, e);
        }
        self.report(
            Outcome::DiscardedMalformed {
                message_id: message.message_id.clone(),
            },
            format!("Discarded malformed stop item: {}", reason),
        )
    }

    async fn drop_stale(
        &self,
        message: &QueueMessage,
        instance_id: &str,
        stage: RetirementStage,
    ) -> InvocationReport {
        warn!(
            "Dropping stop item {} for {}: instance is already {}",
            message.message_id, instance_id, stage
        );
        if let Err(e) = self
            .ctx
            .queue
            .delete(&self.ctx.settings.stop_queue, &message.receipt_handle)
            .await
        {
            warn!("Unable to delete stale item {}: {}", message.message_id, e);
        }
        self.report(
            Outcome::StaleItemDropped {
                instance_id: instance_id.to_string(),
            },
            format!("Instance {} is already {}, stop item dropped", instance_id, stage),
        )
    }

    fn report(&self, outcome: Outcome, message: impl Into<String>) -> InvocationReport {
        InvocationReport::new(Stage::StopWorker, outcome, message)
    }
}
