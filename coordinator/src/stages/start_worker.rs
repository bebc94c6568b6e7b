// File: coordinator/src/stages/start_worker.rs
use tracing::{error, info, instrument, warn};

use super::work_item::StartWorkItem;
use super::{InvocationReport, Outcome, Stage, StageContext};
use crate::constants::queue;
use crate::errors::{PowerAction, ProviderError, Result};
use crate::provider::QueueMessage;
use crate::retirement_ledger::RetirementStage;

/// Drains the start queue and restarts instances the provider reports as stopped
pub struct StartWorker {
    ctx: StageContext,
}

impl StartWorker {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self), name = "start_worker")]
    pub async fn run(&self) -> Result<InvocationReport> {
        let settings = &self.ctx.settings;
        let message = match self
            .ctx
            .queue
            .receive_one(
                &settings.start_queue,
                settings.delays.receive_wait_seconds,
                queue::RECEIVE_VISIBILITY_TIMEOUT_SECONDS,
            )
            .await
        {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!("No messages found in the start queue");
                return Ok(self.report(Outcome::QueueIdle, "Start queue is empty"));
            }
            Err(e) => {
                warn!("Unable to receive from {}: {}", settings.start_queue, e);
                return Ok(self.report(
                    Outcome::QueueUnavailable,
                    format!("Start queue unavailable: {}", e),
                ));
            }
        };
        info!(
            "Received message from the start queue. Receipt handle: {}",
            message.receipt_handle
        );

        let instance_id = match StartWorkItem::from_message(&message) {
            Ok(item) => item.instance_id,
            Err(reason) => return Ok(self.discard(&message, &reason).await),
        };

        let state = match self.ctx.inventory.runtime_state(&instance_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Unable to read state of {}: {}", instance_id, e);
                return Ok(self.report(
                    Outcome::StateUnavailable {
                        instance_id: instance_id.clone(),
                    },
                    format!("State of {} unavailable: {}", instance_id, e),
                ));
            }
        };

        if !state.is_stopped() {
            info!("Instance {} is not stopped yet ({})", instance_id, state);
            return Ok(self.report(
                Outcome::NotYetStopped {
                    instance_id: instance_id.clone(),
                    state: state.to_string(),
                },
                format!("Instance {} is {}, start postponed", instance_id, state),
            ));
        }

        info!("The instance is stopped, attempting to start instance {}", instance_id);
        self.ctx.authorize(PowerAction::Start, &instance_id).await?;

        if let Err(e) = self.ctx.power.execute(PowerAction::Start, &instance_id).await {
            warn!("Error starting {}, leaving message queued: {}", instance_id, e);
            return Ok(self.report(
                Outcome::StartFailed {
                    instance_id: instance_id.clone(),
                },
                format!("Start of {} failed: {}", instance_id, e),
            ));
        }
        info!("Instance {} has been started", instance_id);
        self.ctx
            .advance(&instance_id, RetirementStage::Started)
            .await;

        if let Err((step, e)) = self.finish(&message).await {
            error!("Instance {} started but {} failed: {}", instance_id, step, e);
            return Ok(self.report(
                Outcome::FollowUpFailed {
                    instance_id: instance_id.clone(),
                    step: step.to_string(),
                },
                format!("Instance {} started; {} failed: {}", instance_id, step, e),
            ));
        }

        Ok(self.report(
            Outcome::Started {
                instance_id: instance_id.clone(),
            },
            format!("Instance {} started", instance_id),
        ))
    }

    async fn finish(
        &self,
        message: &QueueMessage,
    ) -> std::result::Result<(), (&'static str, ProviderError)> {
        let settings = &self.ctx.settings;

        self.ctx
            .queue
            .delete(&settings.start_queue, &message.receipt_handle)
            .await
            .map_err(|e| ("delete start item", e))?;
        info!("Deleted message: {}", message.receipt_handle);

        self.ctx
            .triggers
            .disable(&settings.start_trigger)
            .await
            .map_err(|e| ("disable start trigger", e))?;
        info!("{} has been disabled", settings.start_trigger);
        Ok(())
    }

    async fn discard(&self, message: &QueueMessage, reason: &str) -> InvocationReport {
        error!(
            "Discarding malformed start item {}: {}",
            message.message_id, reason
        );
        if let Err(e) = self
            .ctx
            .queue
            .delete(&self.ctx.settings.start_queue, &message.receipt_handle)
            .await
        {
            warn!("Unable to delete malformed item {}: {}", message.message_id, e);
        }
        self.report(
            Outcome::DiscardedMalformed {
                message_id: message.message_id.clone(),
            },
            format!("Discarded malformed start item: {}", reason),
        )
    }

    fn report(&self, outcome: Outcome, message: impl Into<String>) -> InvocationReport {
        InvocationReport::new(Stage::StartWorker, outcome, message)
    }
}
