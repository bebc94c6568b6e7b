//! Cron-based scheduling of the retirement stages
//!
//! - **Detector**: runs on its own cron, always
//! - **StopWorker / StartWorker**: poll on their cron, but a tick only invokes the worker while
//!   its trigger is enabled. The stages flip those triggers themselves, so an idle system does
//!   not touch the queues at all.
//!
//! All schedules use 6-field cron expressions (sec min hour day month dow):
//!
//! ```toml
//! [schedule]
//! detector = "0 0 * * * *"      # hourly scan
//! stop_worker = "0 * * * * *"   # every minute while enabled
//! start_worker = "0 * * * * *"
//! ```

pub mod jobs;
pub use jobs::StageScheduler;

use crate::errors::ConfigError;

fn cron_error(schedule: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: format!("schedule '{}'", schedule),
        reason,
    }
}

/// Reject anything tokio-cron-scheduler would not accept as a 6-field expression
pub fn validate_6_field_cron(schedule: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = schedule.split_whitespace().collect();

    if parts.len() != 6 {
        return Err(cron_error(
            schedule,
            format!(
                "tokio-cron-scheduler requires exactly 6 fields: second minute hour day month dayofweek. Got {} fields",
                parts.len()
            ),
        ));
    }

    let fields = [
        ("second", 0, 59),
        ("minute", 0, 59),
        ("hour", 0, 23),
        ("day", 1, 31),
        ("month", 1, 12),
        ("dayofweek", 0, 7),
    ];
    for (part, (name, min, max)) in parts.iter().zip(fields) {
        validate_cron_field(part, name, min, max).map_err(|reason| cron_error(schedule, reason))?;
    }
    Ok(())
}

fn validate_cron_field(field: &str, name: &str, min: u32, max: u32) -> Result<(), String> {
    if field == "*" || field == "?" {
        return Ok(());
    }

    let in_range = |value: u32| {
        if value < min || value > max {
            Err(format!(
                "{} value {} is outside valid range {}-{}",
                name, value, min, max
            ))
        } else {
            Ok(())
        }
    };
    let number = |text: &str, what: &str| {
        text.parse::<u32>()
            .map_err(|_| format!("Invalid {} {}: {}", name, what, text))
    };

    if let Some(step) = field.strip_prefix("*/") {
        if number(step, "step value")? == 0 {
            return Err(format!("{} step value cannot be 0", name));
        }
        return Ok(());
    }

    if field.contains(',') {
        for part in field.split(',') {
            in_range(number(part, "value in list")?)?;
        }
        return Ok(());
    }

    if let Some((start, end)) = field.split_once('-') {
        in_range(number(start, "range start")?)?;
        in_range(number(end, "range end")?)?;
        return Ok(());
    }

    in_range(number(field, "value")?)
}
