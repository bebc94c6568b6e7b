//! In-memory fleet wired into a stage runner, with a manual clock

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use coordinator::clock::{Clock, ManualClock};
use coordinator::config::{DelayConfig, RetirementSettings};
use coordinator::provider::memory::{MemoryFleet, MemoryQueue, MemoryTriggers};
use coordinator::{
    InvocationReport, MaintenanceWindow, RetirementLedger, Stage, StageContext, StageRunner,
    WindowSchedule,
};

pub const STOP_QUEUE: &str = "retirement-stop";
pub const START_QUEUE: &str = "retirement-start";
pub const STOP_TRIGGER: &str = "retirement-stop-poller";
pub const START_TRIGGER: &str = "retirement-start-poller";

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .unwrap()
}

pub struct TestFleet {
    pub clock: Arc<ManualClock>,
    pub fleet: Arc<MemoryFleet>,
    pub queue: Arc<MemoryQueue>,
    pub triggers: Arc<MemoryTriggers>,
    pub ledger: RetirementLedger,
    pub runner: StageRunner,
}

impl TestFleet {
    /// UTC zone with the same 02:00:00-04:00:00 window all year
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_windows(now, chrono_tz::UTC, ("02:00:00", "04:00:00"), ("02:00:00", "04:00:00"))
    }

    pub fn with_windows(
        now: DateTime<Utc>,
        time_zone: Tz,
        dst: (&str, &str),
        standard: (&str, &str),
    ) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let fleet = Arc::new(MemoryFleet::new());
        let queue = Arc::new(MemoryQueue::new(clock.clone()));
        let triggers = Arc::new(MemoryTriggers::new());
        let ledger = RetirementLedger::new();

        let settings = RetirementSettings {
            windows: WindowSchedule::new(
                time_zone,
                MaintenanceWindow::parse(dst.0, dst.1).unwrap(),
                MaintenanceWindow::parse(standard.0, standard.1).unwrap(),
            ),
            stop_queue: STOP_QUEUE.to_string(),
            start_queue: START_QUEUE.to_string(),
            stop_trigger: STOP_TRIGGER.to_string(),
            start_trigger: START_TRIGGER.to_string(),
            delays: DelayConfig::default(),
        };

        let runner = StageRunner::new(StageContext {
            inventory: fleet.clone(),
            power: fleet.clone(),
            queue: queue.clone(),
            triggers: triggers.clone(),
            clock: clock.clone(),
            ledger: ledger.clone(),
            settings: Arc::new(settings),
        });

        Self {
            clock,
            fleet,
            queue,
            triggers,
            ledger,
            runner,
        }
    }

    pub async fn run(&self, stage: Stage) -> InvocationReport {
        self.runner
            .invoke(stage)
            .await
            .unwrap_or_else(|e| panic!("{} failed: {}", stage, e))
    }

    pub fn advance(&self, seconds: i64) {
        self.clock.advance(Duration::seconds(seconds));
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
