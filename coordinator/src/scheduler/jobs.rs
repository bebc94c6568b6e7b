// File: coordinator/src/scheduler/jobs.rs
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ScheduleConfig;
use crate::provider::TriggerControl;
use crate::stages::{InvocationReport, Stage, StageRunner};

use super::validate_6_field_cron;

pub struct StageScheduler {
    runner: StageRunner,
    schedule: ScheduleConfig,
    scheduler: JobScheduler,
}

impl StageScheduler {
    pub async fn new(runner: StageRunner, schedule: ScheduleConfig) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        Ok(Self {
            runner,
            schedule,
            scheduler,
        })
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        info!("Starting stage scheduler with 6-field cron format (sec min hour day month dow)");

        let jobs = [
            (Stage::Detector, self.schedule.detector.clone()),
            (Stage::StopWorker, self.schedule.stop_worker.clone()),
            (Stage::StartWorker, self.schedule.start_worker.clone()),
        ];
        for (stage, schedule) in &jobs {
            self.schedule_stage(*stage, schedule.clone())
                .await
                .map_err(|e| anyhow!("Failed to schedule {} ({}): {}", stage, schedule, e))?;
            info!("✓ Scheduled {}: {}", stage, schedule);
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {}", e))?;
        info!("✓ Stage scheduler started with {} jobs", jobs.len());
        Ok(())
    }

    async fn schedule_stage(&self, stage: Stage, schedule: String) -> Result<()> {
        validate_6_field_cron(&schedule)?;

        let runner = self.runner.clone();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _scheduler| {
            let runner = runner.clone();
            Box::pin(async move {
                run_tick(&runner, stage).await;
            })
        })
        .map_err(|e| anyhow!("Failed to create {} job for '{}': {}", stage, schedule, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add {} job to scheduler: {}", stage, e))?;
        Ok(())
    }
}

/// The trigger a worker is gated on; the Detector always runs
fn gating_trigger(runner: &StageRunner, stage: Stage) -> Option<&str> {
    let settings = &runner.context().settings;
    match stage {
        Stage::Detector => None,
        Stage::StopWorker => Some(settings.stop_trigger.as_str()),
        Stage::StartWorker => Some(settings.start_trigger.as_str()),
    }
}

async fn trigger_enabled(triggers: &Arc<dyn TriggerControl>, trigger: &str) -> bool {
    match triggers.is_enabled(trigger).await {
        Ok(enabled) => enabled,
        Err(e) => {
            warn!("Unable to read trigger {}: {}", trigger, e);
            false
        }
    }
}

/// One scheduled tick: invoke `stage` unless its trigger is disabled
pub async fn run_tick(runner: &StageRunner, stage: Stage) -> Option<InvocationReport> {
    if let Some(trigger) = gating_trigger(runner, stage) {
        if !trigger_enabled(&runner.context().triggers, trigger).await {
            debug!("{} is disabled, skipping {} tick", trigger, stage);
            return None;
        }
    }

    match runner.invoke(stage).await {
        Ok(report) => {
            info!("{} finished: {}", stage, report.message);
            Some(report)
        }
        Err(e) => {
            error!("✗ Scheduled {} invocation failed: {}", stage, e);
            None
        }
    }
}
