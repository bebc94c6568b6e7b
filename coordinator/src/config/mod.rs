// File: coordinator/src/config/mod.rs
pub mod manager;

use serde::{Deserialize, Serialize};
pub use manager::ConfigManager;

use crate::constants::{defaults, env, queue};
use crate::errors::ConfigError;
use crate::scheduler::validate_6_field_cron;
use crate::window::{parse_time_zone, MaintenanceWindow, WindowSchedule};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    // Window, queue and trigger settings may come entirely from the environment
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub triggers: TriggerConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub delays: DelayConfig,
}

fn default_host() -> String {
    defaults::HOST.to_string()
}

fn default_port() -> u16 {
    defaults::PORT
}

fn default_database_path() -> String {
    defaults::DATABASE_PATH.to_string()
}

/// Raw window bounds as written in config or the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default)]
    pub time_zone: String,
    #[serde(default)]
    pub dst_start: String,
    #[serde(default)]
    pub dst_end: String,
    #[serde(default)]
    pub standard_start: String,
    #[serde(default)]
    pub standard_end: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub stop: String,
    #[serde(default)]
    pub start: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub stop: String,
    #[serde(default)]
    pub start: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    defaults::COMPUTE_REQUEST_TIMEOUT.as_secs()
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: String::new(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// 6-field cron expressions (sec min hour day month dow)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_detector_schedule")]
    pub detector: String,
    #[serde(default = "default_worker_schedule")]
    pub stop_worker: String,
    #[serde(default = "default_worker_schedule")]
    pub start_worker: String,
}

fn default_detector_schedule() -> String {
    defaults::DETECTOR_SCHEDULE.to_string()
}

fn default_worker_schedule() -> String {
    defaults::WORKER_SCHEDULE.to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            detector: default_detector_schedule(),
            stop_worker: default_worker_schedule(),
            start_worker: default_worker_schedule(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub detector_start_delay_seconds: u32,
    pub stop_delay_seconds: u32,
    pub stop_worker_start_delay_seconds: u32,
    pub receive_wait_seconds: u32,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            detector_start_delay_seconds: queue::DETECTOR_START_DELAY_SECONDS,
            stop_delay_seconds: queue::STOP_DELAY_SECONDS,
            stop_worker_start_delay_seconds: queue::STOP_WORKER_START_DELAY_SECONDS,
            receive_wait_seconds: queue::RECEIVE_WAIT_SECONDS,
        }
    }
}

/// Validated settings every stage reads
#[derive(Debug, Clone, PartialEq)]
pub struct RetirementSettings {
    pub windows: WindowSchedule,
    pub stop_queue: String,
    pub start_queue: String,
    pub stop_trigger: String,
    pub start_trigger: String,
    pub delays: DelayConfig,
}

impl Config {
    /// Overlay environment-provided values on top of the file contents
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides: [(&str, &mut String); 9] = [
            (env::TIME_ZONE, &mut self.window.time_zone),
            (env::DST_START, &mut self.window.dst_start),
            (env::DST_END, &mut self.window.dst_end),
            (env::STANDARD_START, &mut self.window.standard_start),
            (env::STANDARD_END, &mut self.window.standard_end),
            (env::STOP_QUEUE, &mut self.queues.stop),
            (env::START_QUEUE, &mut self.queues.start),
            (env::STOP_TRIGGER, &mut self.triggers.stop),
            (env::START_TRIGGER, &mut self.triggers.start),
        ];

        for (key, slot) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = value.trim().to_string();
            }
        }
    }

    pub fn retirement_settings(&self) -> Result<RetirementSettings, ConfigError> {
        let time_zone = parse_time_zone(&self.window.time_zone)
            .map_err(|e| invalid("window.time_zone", e))?;
        let dst = MaintenanceWindow::parse(&self.window.dst_start, &self.window.dst_end)
            .map_err(|e| invalid("window.dst", e))?;
        let standard =
            MaintenanceWindow::parse(&self.window.standard_start, &self.window.standard_end)
                .map_err(|e| invalid("window.standard", e))?;

        Ok(RetirementSettings {
            windows: WindowSchedule::new(time_zone, dst, standard),
            stop_queue: required("queues.stop", &self.queues.stop)?,
            start_queue: required("queues.start", &self.queues.start)?,
            stop_trigger: required("triggers.stop", &self.triggers.stop)?,
            start_trigger: required("triggers.start", &self.triggers.start)?,
            delays: self.delays,
        })
    }

    /// Full validation, including the parts only the service needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retirement_settings()?;
        required("compute.base_url", &self.compute.base_url)?;
        validate_6_field_cron(&self.schedule.detector)?;
        validate_6_field_cron(&self.schedule.stop_worker)?;
        validate_6_field_cron(&self.schedule.start_worker)?;
        Ok(())
    }
}

fn invalid(field: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn required(field: &str, value: &str) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(value.trim().to_string())
}
