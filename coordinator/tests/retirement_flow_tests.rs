//! End-to-end retirement cycles across all three stages

mod common;

use common::fixtures::test_fleet::{START_QUEUE, START_TRIGGER, STOP_QUEUE, STOP_TRIGGER};
use common::fixtures::{utc, TestFleet};
use coordinator::provider::InstanceState;
use coordinator::scheduler::jobs::run_tick;
use coordinator::{CoordinatorError, Outcome, PowerAction, RetirementStage, Stage};

const RETIRING: &str = "instance-retirement";

fn retiring_fleet(fleet: &TestFleet, instance_id: &str) {
    fleet
        .fleet
        .add_instance(instance_id, InstanceState::Running, Some(RETIRING));
}

#[tokio::test]
async fn open_window_stops_now_and_restarts_after_delay() {
    let t = TestFleet::new(utc(2024, 3, 4, 2, 30, 0));
    retiring_fleet(&t, "i-1");

    let detected = t.run(Stage::Detector).await;
    assert_eq!(
        detected.outcome,
        Outcome::StoppedImmediately {
            instance_id: "i-1".to_string()
        }
    );
    assert!(t.queue.is_empty(STOP_QUEUE));
    assert!(!t.triggers.enabled(STOP_TRIGGER));
    assert!(t.triggers.enabled(START_TRIGGER));

    let start_items = t.queue.items(START_QUEUE);
    assert_eq!(start_items.len(), 1);
    assert_eq!(start_items[0].attributes["InstanceId"], "i-1");
    assert_eq!(start_items[0].visible_at, t.now() + chrono::Duration::seconds(5));

    // Not visible yet
    let idle = t.run(Stage::StartWorker).await;
    assert_eq!(idle.outcome, Outcome::QueueIdle);

    t.advance(5);
    t.fleet.settle();
    let started = t.run(Stage::StartWorker).await;
    assert_eq!(
        started.outcome,
        Outcome::Started {
            instance_id: "i-1".to_string()
        }
    );
    assert!(t.queue.is_empty(START_QUEUE));
    assert!(!t.triggers.enabled(START_TRIGGER));

    let entry = t.ledger.entry("i-1").await.unwrap();
    assert_eq!(entry.stage, RetirementStage::Started);
    assert_eq!((entry.stops, entry.starts), (1, 1));
    assert_eq!(t.fleet.executed(PowerAction::Stop), vec!["i-1"]);
    assert_eq!(t.fleet.executed(PowerAction::Start), vec!["i-1"]);
}

#[tokio::test]
async fn closed_window_defers_stop_until_window_opens() {
    let t = TestFleet::new(utc(2024, 3, 4, 10, 0, 0));
    retiring_fleet(&t, "i-2");

    let detected = t.run(Stage::Detector).await;
    assert_eq!(
        detected.outcome,
        Outcome::StopDeferred {
            instance_id: "i-2".to_string()
        }
    );
    assert!(t.fleet.executed(PowerAction::Stop).is_empty());
    assert!(t.triggers.enabled(STOP_TRIGGER));

    let stop_items = t.queue.items(STOP_QUEUE);
    assert_eq!(stop_items.len(), 1);
    assert_eq!(stop_items[0].attributes["MaintWindowStartTime"], "02:00:00");
    assert_eq!(stop_items[0].attributes["MaintWindowEndTime"], "04:00:00");
    assert_eq!(
        t.ledger.stage_of("i-2").await,
        Some(RetirementStage::PendingStop)
    );

    // Worker ticks until the window opens leave the item queued
    t.advance(10);
    for _ in 0..3 {
        let waiting = t.run(Stage::StopWorker).await;
        assert!(matches!(waiting.outcome, Outcome::OutsideWindow { .. }));
        t.advance(60);
    }
    assert_eq!(t.queue.len(STOP_QUEUE), 1);
    assert!(t.fleet.executed(PowerAction::Stop).is_empty());

    t.clock.set(utc(2024, 3, 5, 2, 15, 0));
    let stopped = t.run(Stage::StopWorker).await;
    assert_eq!(
        stopped.outcome,
        Outcome::Stopped {
            instance_id: "i-2".to_string()
        }
    );
    assert!(t.queue.is_empty(STOP_QUEUE));
    assert!(!t.triggers.enabled(STOP_TRIGGER));
    assert!(t.triggers.enabled(START_TRIGGER));

    t.advance(10);
    let too_early = t.run(Stage::StartWorker).await;
    assert_eq!(
        too_early.outcome,
        Outcome::NotYetStopped {
            instance_id: "i-2".to_string(),
            state: "stopping".to_string()
        }
    );
    assert_eq!(t.queue.len(START_QUEUE), 1);

    t.fleet.settle();
    let started = t.run(Stage::StartWorker).await;
    assert!(matches!(started.outcome, Outcome::Started { .. }));
    assert!(!t.triggers.enabled(START_TRIGGER));
    assert_eq!(t.ledger.stage_of("i-2").await, Some(RetirementStage::Started));
}

#[tokio::test]
async fn healthy_fleet_is_left_alone() {
    let t = TestFleet::new(utc(2024, 3, 4, 2, 30, 0));
    t.fleet.add_instance("i-1", InstanceState::Running, None);
    t.fleet
        .add_instance("i-2", InstanceState::Running, Some("system-reboot"));

    let report = t.run(Stage::Detector).await;
    assert_eq!(report.outcome, Outcome::NoRetirementFound);
    assert!(t.fleet.calls().is_empty());
    assert!(t.triggers.history().is_empty());
    assert!(t.ledger.entries().await.is_empty());
}

#[tokio::test]
async fn denied_stop_fails_the_invocation_without_side_effects() {
    let t = TestFleet::new(utc(2024, 3, 4, 2, 30, 0));
    retiring_fleet(&t, "i-1");
    t.fleet.deny(PowerAction::Stop);

    let err = t.runner.invoke(Stage::Detector).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Authorization {
            action: PowerAction::Stop,
            ..
        }
    ));
    assert!(t.fleet.executed(PowerAction::Stop).is_empty());
    assert!(t.queue.is_empty(START_QUEUE));
    assert!(!t.triggers.enabled(START_TRIGGER));
}

#[tokio::test]
async fn window_follows_daylight_saving_in_zone() {
    let (dst, standard) = (("06:00:00", "08:00:00"), ("07:00:00", "09:00:00"));

    // July: New York observes DST, 06:30 falls in 06:00-08:00
    let summer = TestFleet::with_windows(
        utc(2024, 7, 15, 6, 30, 0),
        chrono_tz::America::New_York,
        dst,
        standard,
    );
    retiring_fleet(&summer, "i-1");
    let report = summer.run(Stage::Detector).await;
    assert!(matches!(report.outcome, Outcome::StoppedImmediately { .. }));

    // January: standard window 07:00-09:00 is still closed at 06:30
    let winter = TestFleet::with_windows(
        utc(2024, 1, 15, 6, 30, 0),
        chrono_tz::America::New_York,
        dst,
        standard,
    );
    retiring_fleet(&winter, "i-1");
    let report = winter.run(Stage::Detector).await;
    assert!(matches!(report.outcome, Outcome::StopDeferred { .. }));
    let items = winter.queue.items(STOP_QUEUE);
    assert_eq!(items[0].attributes["MaintWindowStartTime"], "07:00:00");
    assert_eq!(items[0].attributes["MaintWindowEndTime"], "09:00:00");
}

#[tokio::test]
async fn repeated_detection_does_not_queue_twice() {
    let t = TestFleet::new(utc(2024, 3, 4, 12, 0, 0));
    retiring_fleet(&t, "i-1");

    let first = t.run(Stage::Detector).await;
    assert!(matches!(first.outcome, Outcome::StopDeferred { .. }));

    t.advance(3600);
    let second = t.run(Stage::Detector).await;
    assert_eq!(second.outcome, Outcome::NoRetirementFound);
    assert_eq!(t.queue.len(STOP_QUEUE), 1);
}

#[tokio::test]
async fn in_flight_instance_does_not_hide_other_retirements() {
    let t = TestFleet::new(utc(2024, 3, 4, 12, 0, 0));
    retiring_fleet(&t, "i-1");
    retiring_fleet(&t, "i-2");

    let first = t.run(Stage::Detector).await;
    let second = t.run(Stage::Detector).await;
    assert_eq!(
        first.outcome,
        Outcome::StopDeferred {
            instance_id: "i-1".to_string()
        }
    );
    assert_eq!(
        second.outcome,
        Outcome::StopDeferred {
            instance_id: "i-2".to_string()
        }
    );
    assert_eq!(t.queue.len(STOP_QUEUE), 2);
}

#[tokio::test]
async fn completed_stop_is_not_redelivered() {
    let t = TestFleet::new(utc(2024, 3, 4, 1, 0, 0));
    retiring_fleet(&t, "i-1");
    t.run(Stage::Detector).await;

    t.clock.set(utc(2024, 3, 4, 2, 30, 0));
    let stopped = t.run(Stage::StopWorker).await;
    assert!(matches!(stopped.outcome, Outcome::Stopped { .. }));

    t.advance(60);
    let again = t.run(Stage::StopWorker).await;
    assert_eq!(again.outcome, Outcome::QueueIdle);
    assert_eq!(t.fleet.executed(PowerAction::Stop), vec!["i-1"]);
    assert_eq!(t.queue.len(START_QUEUE), 1);
}

#[tokio::test]
async fn transient_stop_failure_is_retried_on_next_tick() {
    let t = TestFleet::new(utc(2024, 3, 4, 1, 0, 0));
    retiring_fleet(&t, "i-1");
    t.run(Stage::Detector).await;

    t.clock.set(utc(2024, 3, 4, 2, 30, 0));
    t.fleet.fail_next(PowerAction::Stop, 1);

    let failed = t.run(Stage::StopWorker).await;
    assert!(matches!(failed.outcome, Outcome::StopFailed { .. }));
    assert_eq!(t.queue.len(STOP_QUEUE), 1);
    assert!(t.triggers.enabled(STOP_TRIGGER));

    t.advance(60);
    let stopped = t.run(Stage::StopWorker).await;
    assert!(matches!(stopped.outcome, Outcome::Stopped { .. }));
    assert_eq!(t.fleet.executed(PowerAction::Stop), vec!["i-1", "i-1"]);
    assert_eq!(t.queue.items(STOP_QUEUE).len(), 0);
}

#[tokio::test]
async fn failed_start_hand_off_is_recovered_by_next_scan() {
    let t = TestFleet::new(utc(2024, 3, 4, 2, 30, 0));
    retiring_fleet(&t, "i-1");
    t.queue.fail_next_sends(1);

    let broken = t.run(Stage::Detector).await;
    assert_eq!(
        broken.outcome,
        Outcome::FollowUpFailed {
            instance_id: "i-1".to_string(),
            step: "send start item".to_string()
        }
    );
    assert!(t.queue.is_empty(START_QUEUE));
    assert_eq!(t.ledger.stage_of("i-1").await, Some(RetirementStage::Detected));

    // The provider keeps reporting the retirement until the instance is restarted
    t.fleet.set_status_code("i-1", Some(RETIRING));
    t.advance(3600);
    t.fleet.settle();

    let recovered = t.run(Stage::Detector).await;
    assert!(matches!(recovered.outcome, Outcome::StoppedImmediately { .. }));
    assert_eq!(t.queue.len(START_QUEUE), 1);
    assert!(t.triggers.enabled(START_TRIGGER));

    t.advance(5);
    let started = t.run(Stage::StartWorker).await;
    assert!(matches!(started.outcome, Outcome::Started { .. }));
    assert_eq!(t.fleet.state_of("i-1"), Some(InstanceState::Pending));
    assert_eq!(t.fleet.executed(PowerAction::Start), vec!["i-1"]);
}

#[tokio::test]
async fn requeued_deferral_stops_the_instance_once() {
    let t = TestFleet::new(utc(2024, 3, 4, 10, 0, 0));
    retiring_fleet(&t, "i-1");
    t.triggers.fail_next_enables(1);

    let broken = t.run(Stage::Detector).await;
    assert_eq!(
        broken.outcome,
        Outcome::FollowUpFailed {
            instance_id: "i-1".to_string(),
            step: "enable stop trigger".to_string()
        }
    );
    assert!(!t.triggers.enabled(STOP_TRIGGER));

    let requeued = t.run(Stage::Detector).await;
    assert!(matches!(requeued.outcome, Outcome::StopDeferred { .. }));
    assert!(t.triggers.enabled(STOP_TRIGGER));
    assert_eq!(t.queue.len(STOP_QUEUE), 2);

    t.clock.set(utc(2024, 3, 5, 2, 30, 0));
    let stopped = t.run(Stage::StopWorker).await;
    assert!(matches!(stopped.outcome, Outcome::Stopped { .. }));

    let leftover = t.run(Stage::StopWorker).await;
    assert_eq!(
        leftover.outcome,
        Outcome::StaleItemDropped {
            instance_id: "i-1".to_string()
        }
    );
    assert!(t.queue.is_empty(STOP_QUEUE));
    assert_eq!(t.queue.len(START_QUEUE), 1);
    assert_eq!(t.fleet.executed(PowerAction::Stop), vec!["i-1"]);
}

#[tokio::test]
async fn denied_start_keeps_item_for_later() {
    let t = TestFleet::new(utc(2024, 3, 4, 2, 30, 0));
    retiring_fleet(&t, "i-1");
    t.run(Stage::Detector).await;

    t.advance(5);
    t.fleet.settle();
    t.fleet.deny(PowerAction::Start);

    let err = t.runner.invoke(Stage::StartWorker).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Authorization {
            action: PowerAction::Start,
            ..
        }
    ));
    assert_eq!(t.queue.len(START_QUEUE), 1);
    assert!(t.triggers.enabled(START_TRIGGER));
    assert_eq!(t.fleet.state_of("i-1"), Some(InstanceState::Stopped));
}

#[tokio::test]
async fn scheduled_ticks_only_run_enabled_workers() {
    let t = TestFleet::new(utc(2024, 3, 4, 10, 0, 0));
    retiring_fleet(&t, "i-1");

    // Both workers parked before anything is detected
    assert!(run_tick(&t.runner, Stage::StopWorker).await.is_none());
    assert!(run_tick(&t.runner, Stage::StartWorker).await.is_none());

    let detected = run_tick(&t.runner, Stage::Detector).await.unwrap();
    assert!(matches!(detected.outcome, Outcome::StopDeferred { .. }));

    t.advance(10);
    let waiting = run_tick(&t.runner, Stage::StopWorker).await.unwrap();
    assert!(matches!(waiting.outcome, Outcome::OutsideWindow { .. }));
    assert!(run_tick(&t.runner, Stage::StartWorker).await.is_none());

    t.clock.set(utc(2024, 3, 5, 3, 0, 0));
    let stopped = run_tick(&t.runner, Stage::StopWorker).await.unwrap();
    assert!(matches!(stopped.outcome, Outcome::Stopped { .. }));
    assert!(run_tick(&t.runner, Stage::StopWorker).await.is_none());

    t.advance(10);
    t.fleet.settle();
    let started = run_tick(&t.runner, Stage::StartWorker).await.unwrap();
    assert!(matches!(started.outcome, Outcome::Started { .. }));
    assert!(run_tick(&t.runner, Stage::StartWorker).await.is_none());

    assert_eq!(
        t.triggers.history(),
        vec![
            (STOP_TRIGGER.to_string(), true),
            (STOP_TRIGGER.to_string(), false),
            (START_TRIGGER.to_string(), true),
            (START_TRIGGER.to_string(), false),
        ]
    );
}

#[tokio::test]
async fn invocation_response_envelope_is_always_200() {
    let t = TestFleet::new(utc(2024, 3, 4, 2, 30, 0));

    let report = t.run(Stage::StartWorker).await;
    let response = coordinator::InvocationResponse::from(&report);
    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, "Start queue is empty");

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["statusCode"], 200);
}
