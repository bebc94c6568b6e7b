// File: coordinator/src/stages/detector.rs
use tracing::{debug, error, info, instrument, warn};

use super::work_item::StopWorkItem;
use super::{InvocationReport, Outcome, Stage, StageContext};
use crate::constants::signals;
use crate::errors::{PowerAction, ProviderError, Result};
use crate::retirement_ledger::RetirementStage;
use crate::window::TimeOfDay;

/// Finds the first instance carrying a retirement signal and schedules its power cycle
pub struct Detector {
    ctx: StageContext,
}

impl Detector {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self), name = "detector")]
    pub async fn run(&self) -> Result<InvocationReport> {
        let instance_id = match self.find_retiring_instance().await {
            Ok(Some(id)) => id,
            Ok(None) => {
                info!("No instances found with event code = {}", signals::INSTANCE_RETIREMENT);
                return Ok(self.report(
                    Outcome::NoRetirementFound,
                    "No instances scheduled for retirement",
                ));
            }
            Err(e) => {
                warn!("Unable to list instances: {}", e);
                return Ok(self.report(
                    Outcome::InventoryUnavailable,
                    format!("Inventory unavailable: {}", e),
                ));
            }
        };

        info!("Instance {} is scheduled for retirement", instance_id);
        self.ctx
            .advance(&instance_id, RetirementStage::Detected)
            .await;

        let now = self.ctx.clock.now();
        let window = self.ctx.settings.windows.resolve(now);
        let current = TimeOfDay::of(now);

        if window.contains(current) {
            info!(
                "Within the timeframe ({} in {}), attempting to stop instance {}",
                current, window, instance_id
            );
            self.stop_now(instance_id).await
        } else {
            info!(
                "Not within the timeframe ({} outside {}), sending {} to the stop queue",
                current, window, instance_id
            );
            Ok(self.defer_stop(StopWorkItem {
                instance_id,
                window,
            })
            .await)
        }
    }

    /// First flagged instance that is not already being cycled
    async fn find_retiring_instance(&self) -> std::result::Result<Option<String>, ProviderError> {
        let instances = self.ctx.inventory.list_instances().await?;
        debug!("Scanning {} instances for retirement events", instances.len());

        for instance_id in instances {
            let status = match self.ctx.inventory.health_status(&instance_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Skipping {}: status lookup failed: {}", instance_id, e);
                    continue;
                }
            };

            if status.as_deref() != Some(signals::INSTANCE_RETIREMENT) {
                continue;
            }
            if self.ctx.ledger.is_in_flight(&instance_id).await {
                debug!("Instance {} already has a retirement in flight", instance_id);
                continue;
            }
            return Ok(Some(instance_id));
        }
        Ok(None)
    }

    async fn stop_now(&self, instance_id: String) -> Result<InvocationReport> {
        self.ctx.authorize(PowerAction::Stop, &instance_id).await?;

        if let Err(e) = self.ctx.power.execute(PowerAction::Stop, &instance_id).await {
            warn!("Error stopping {}: {}", instance_id, e);
            return Ok(self.report(
                Outcome::ImmediateStopFailed {
                    instance_id: instance_id.clone(),
                },
                format!("Stop of {} failed: {}", instance_id, e),
            ));
        }
        info!("Stopping instance {}", instance_id);

        // Until the start item and trigger are in place the entry stays Detected, so a
        // broken hand-off is retried by the next scan
        let delay = self.ctx.settings.delays.detector_start_delay_seconds;
        if let Err((step, e)) = self
            .ctx
            .hand_off_to_start(Stage::Detector, &instance_id, delay)
            .await
        {
            error!("Instance {} stopped but {} failed: {}", instance_id, step, e);
            return Ok(self.report(
                Outcome::FollowUpFailed {
                    instance_id: instance_id.clone(),
                    step: step.to_string(),
                },
                format!("Instance {} stopped; {} failed: {}", instance_id, step, e),
            ));
        }
        self.ctx
            .advance(&instance_id, RetirementStage::PendingStart)
            .await;

        Ok(self.report(
            Outcome::StoppedImmediately {
                instance_id: instance_id.clone(),
            },
            format!("Instance {} stopped; start scheduled", instance_id),
        ))
    }

    async fn defer_stop(&self, item: StopWorkItem) -> InvocationReport {
        let settings = &self.ctx.settings;
        let instance_id = item.instance_id.clone();

        if let Err(e) = self
            .ctx
            .queue
            .send(
                &settings.stop_queue,
                &item.body(Stage::Detector),
                &item.attributes(),
                settings.delays.stop_delay_seconds,
            )
            .await
        {
            warn!("Unable to queue stop for {}: {}", instance_id, e);
            return self.report(
                Outcome::DeferFailed {
                    instance_id: instance_id.clone(),
                },
                format!("Could not queue stop for {}: {}", instance_id, e),
            );
        }
        info!("Message sent to the stop queue");

        if let Err(e) = self.ctx.triggers.enable(&settings.stop_trigger).await {
            error!(
                "Stop for {} queued but {} could not be enabled: {}",
                instance_id, settings.stop_trigger, e
            );
            return self.report(
                Outcome::FollowUpFailed {
                    instance_id: instance_id.clone(),
                    step: "enable stop trigger".to_string(),
                },
                format!("Stop for {} queued; enabling {} failed", instance_id, settings.stop_trigger),
            );
        }
        info!("{} has been enabled", settings.stop_trigger);
        self.ctx
            .advance(&instance_id, RetirementStage::PendingStop)
            .await;

        self.report(
            Outcome::StopDeferred {
                instance_id: instance_id.clone(),
            },
            format!("Stop for {} queued until {}", instance_id, item.window),
        )
    }

    fn report(&self, outcome: Outcome, message: impl Into<String>) -> InvocationReport {
        InvocationReport::new(Stage::Detector, outcome, message)
    }
}
