//! Central repository for queue timings, attribute names and configuration defaults
//!
//! Constants are grouped by category so the stage modules, the queue adapters and the
//! config loader share a single source of truth.

use std::time::Duration;

/// Retirement signal vocabulary
pub mod signals {
    /// Health-event status code the provider uses for an involuntary retirement
    pub const INSTANCE_RETIREMENT: &str = "instance-retirement";

    /// Provider error code returned when a dry-run would have succeeded
    pub const DRY_RUN_OPERATION: &str = "DryRunOperation";
}

/// Queue message attribute names shared by producers and consumers
pub mod attributes {
    pub const INSTANCE_ID: &str = "InstanceId";
    pub const WINDOW_START: &str = "MaintWindowStartTime";
    pub const WINDOW_END: &str = "MaintWindowEndTime";
}

/// Queue timing constants (seconds)
pub mod queue {
    use super::Duration;

    /// Delay on a start item sent by the detector right after an immediate stop
    pub const DETECTOR_START_DELAY_SECONDS: u32 = 5;

    /// Delay on a stop item sent by the detector when the window is closed
    pub const STOP_DELAY_SECONDS: u32 = 10;

    /// Delay on a start item sent by the stop worker after a deferred stop
    pub const STOP_WORKER_START_DELAY_SECONDS: u32 = 10;

    /// Long-poll wait for a worker receive
    pub const RECEIVE_WAIT_SECONDS: u32 = 5;

    /// Received messages stay visible so a failed attempt redelivers on the next tick
    pub const RECEIVE_VISIBILITY_TIMEOUT_SECONDS: u32 = 0;

    /// Interval between claim attempts while long-polling the SQLite queue
    pub const LONG_POLL_INTERVAL: Duration = Duration::from_millis(250);
}

/// Ledger cleanup constants
pub mod cleanup {
    /// Hours after which an in-flight ledger entry is considered abandoned
    pub const LEDGER_STALE_HOURS: i64 = 48;

    /// Ledger cleanup interval in seconds
    pub const CLEANUP_INTERVAL_SECONDS: u64 = 3600; // 1 hour
}

/// Default configuration values
pub mod defaults {
    use super::Duration;

    /// Default invocation API bind host
    pub const HOST: &str = "0.0.0.0";

    /// Default invocation API port
    pub const PORT: u16 = 8096;

    /// Default SQLite file holding queues and triggers
    pub const DATABASE_PATH: &str = "data/coordinator.db";

    /// Detector runs at the top of every hour
    pub const DETECTOR_SCHEDULE: &str = "0 0 * * * *";

    /// Workers tick every minute while their trigger is enabled
    pub const WORKER_SCHEDULE: &str = "0 * * * * *";

    /// Timeout for compute API requests
    pub const COMPUTE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Environment variable names that override `config/main.toml`
pub mod env {
    pub const TIME_ZONE: &str = "TimeZone";
    pub const DST_START: &str = "MaintWindowStart_DST";
    pub const DST_END: &str = "MaintWindowEnd_DST";
    pub const STANDARD_START: &str = "MaintWindowStart_ST";
    pub const STANDARD_END: &str = "MaintWindowEnd_ST";
    pub const STOP_QUEUE: &str = "StopQueue";
    pub const START_QUEUE: &str = "StartQueue";
    pub const STOP_TRIGGER: &str = "StopTrigger";
    pub const START_TRIGGER: &str = "StartTrigger";
}
