//! End-to-end engine tests.
//!
//! All timing tests run on a paused tokio clock, so the quiet periods
//! elapse instantly and deterministically.
//!
//! Run with: `cargo test --test integration`

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::time::Instant;

use roaming_sync::{
    AdmissionFilter, EngineState, EnqueueResult, EntityOperation, Family, Feature, FlushOutcome,
    PropertyChange, PushOutcome, SyncEngine, SyncEngineConfig, SyncError, SyncEvent, Transmission,
};

use common::{admin, advance_ms, fast_config, started, status, Admin, Call, Evse, RecordingUploader, Status};

fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Debounce
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_burst_into_one_round() {
    let h = started(fast_config()).await;

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    advance_ms(30).await;
    h.engine.enqueue_add(Evse::new("E2")).unwrap();
    advance_ms(30).await;
    h.engine.enqueue_add(Evse::new("E3")).unwrap();

    // 40ms after the last enqueue: still quiet
    advance_ms(40).await;
    assert_eq!(h.uploader.call_count(), 0);
    assert!(h.engine.is_armed(Family::Data));

    advance_ms(20).await;
    assert_eq!(
        h.uploader.calls(),
        vec![Call::Entities(EntityOperation::Add, ids(&["E1", "E2", "E3"]))]
    );
    assert_eq!(h.engine.run_count(Family::Data), 1);
    assert!(!h.engine.is_armed(Family::Data));
}

#[tokio::test(start_paused = true)]
async fn test_families_flush_on_their_own_intervals() {
    let h = started(fast_config()).await;
    let t0 = Instant::now();

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    h.engine.enqueue_status(vec![status("E9", Status::Available, Status::Charging)]).unwrap();
    h.engine.enqueue_charge_records(vec![1, 2]).unwrap();

    advance_ms(100).await;

    let timed = h.uploader.timed_calls();
    let at = |step: &str| {
        timed
            .iter()
            .find(|(_, call)| call.step() == step)
            .map(|(t, _)| t.duration_since(t0))
            .expect("step ran")
    };
    assert!(at("status") >= Duration::from_millis(20) && at("status") < Duration::from_millis(25));
    assert!(at("charge_records") >= Duration::from_millis(30) && at("charge_records") < Duration::from_millis(35));
    assert!(at("add") >= Duration::from_millis(50) && at("add") < Duration::from_millis(55));

    for family in Family::ALL {
        assert_eq!(h.engine.run_count(family), 1, "{family}");
    }
}

// =============================================================================
// Ordering policy
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_end_to_end_latest_status_wins() {
    let h = started(fast_config()).await;
    let t0 = Instant::now();

    h.engine.enqueue_add(Evse::new("EVSE1")).unwrap();
    advance_ms(10).await;
    h.engine.enqueue_status(vec![status("EVSE1", Status::Available, Status::Charging)]).unwrap();
    advance_ms(10).await;
    h.engine.enqueue_status(vec![status("EVSE1", Status::Charging, Status::Available)]).unwrap();

    let pending = h.engine.pending();
    assert_eq!(pending.delayed_status, 2);
    assert_eq!(pending.fast_status, 0);

    advance_ms(45).await;
    assert_eq!(h.uploader.call_count(), 0, "debounced from the last enqueue");

    advance_ms(30).await;
    let timed = h.uploader.timed_calls();
    assert_eq!(timed.len(), 2);
    let elapsed = timed[0].0.duration_since(t0);
    assert!(elapsed >= Duration::from_millis(70) && elapsed < Duration::from_millis(75));

    assert_eq!(timed[0].1, Call::Entities(EntityOperation::Add, ids(&["EVSE1"])));
    assert_eq!(
        timed[1].1,
        Call::Status(vec![("EVSE1".to_string(), Status::Available, Status::Available)])
    );
    assert_eq!(h.engine.run_count(Family::Data), 1);
    assert_eq!(h.engine.run_count(Family::FastStatus), 0);
}

#[tokio::test(start_paused = true)]
async fn test_added_entity_asserts_its_latest_status() {
    let h = started(fast_config()).await;

    // Status reported after the entity data supersedes it
    h.engine.enqueue_add(Evse::new("E1").with_status(Status::Available)).unwrap();
    h.engine.enqueue_status(vec![status("E1", Status::Available, Status::Charging)]).unwrap();

    let outcome = h.engine.flush_now(Family::Data).await;
    let report = outcome.report().expect("round ran");
    assert_eq!((report.added, report.status), (1, 1));
    assert_eq!(
        h.uploader.calls(),
        vec![
            Call::Entities(EntityOperation::Add, ids(&["E1"])),
            Call::Status(vec![("E1".to_string(), Status::Charging, Status::Charging)]),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_readded_entity_data_supersedes_older_status() {
    let h = started(fast_config()).await;

    h.engine.enqueue_add(Evse::new("E1").with_status(Status::Available)).unwrap();
    h.engine.enqueue_status(vec![status("E1", Status::Available, Status::Charging)]).unwrap();
    h.engine.enqueue_add(Evse::new("E1").with_status(Status::OutOfOrder)).unwrap();
    assert_eq!(h.engine.pending().to_add, 1);

    h.engine.flush_now(Family::Data).await;
    assert_eq!(
        h.uploader.calls()[1],
        Call::Status(vec![("E1".to_string(), Status::OutOfOrder, Status::OutOfOrder)])
    );
}

#[tokio::test(start_paused = true)]
async fn test_status_for_known_entity_takes_fast_path() {
    let h = started(fast_config()).await;

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    h.engine.flush_now(Family::Data).await;

    let result = h
        .engine
        .enqueue_status(vec![status("E1", Status::Available, Status::Charging)])
        .unwrap();
    assert_eq!(result, EnqueueResult::Enqueued { items: 1 });
    assert_eq!(h.engine.pending().fast_status, 1);
    assert!(h.engine.is_armed(Family::FastStatus));
    assert!(!h.engine.is_armed(Family::Data));

    advance_ms(25).await;
    assert_eq!(
        h.uploader.calls().last(),
        Some(&Call::Status(vec![("E1".to_string(), Status::Available, Status::Charging)]))
    );
    assert_eq!(h.engine.run_count(Family::FastStatus), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fast_status_keeps_every_transition_in_order() {
    let h = started(fast_config()).await;

    h.engine
        .enqueue_status(vec![
            status("E1", Status::Available, Status::Charging),
            status("E2", Status::Available, Status::OutOfOrder),
        ])
        .unwrap();
    h.engine.enqueue_status(vec![status("E1", Status::Charging, Status::Available)]).unwrap();
    h.engine.enqueue_admin_status(vec![admin("E2", Admin::Operative, Admin::Inoperative)]).unwrap();

    advance_ms(25).await;
    assert_eq!(
        h.uploader.calls(),
        vec![
            Call::AdminStatus(vec![("E2".to_string(), Admin::Operative, Admin::Inoperative)]),
            Call::Status(vec![
                ("E1".to_string(), Status::Available, Status::Charging),
                ("E2".to_string(), Status::Available, Status::OutOfOrder),
                ("E1".to_string(), Status::Charging, Status::Available),
            ]),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_data_round_step_order() {
    let h = started(fast_config()).await;

    h.engine.enqueue_remove(Evse::new("E3")).unwrap();
    h.engine.enqueue_status(vec![status("E1", Status::Available, Status::Charging)]).unwrap();
    h.engine
        .enqueue_update(
            Evse::new("E2"),
            Some(PropertyChange::new("max_power", json!(11), json!(22))),
        )
        .unwrap();
    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    h.engine.enqueue_admin_status(vec![admin("E1", Admin::Inoperative, Admin::Operative)]).unwrap();

    let outcome = h.engine.flush_now(Family::Data).await;
    assert_eq!(h.uploader.steps(), vec!["add", "update", "admin_status", "status", "remove"]);

    let report = outcome.report().expect("round ran").clone();
    assert_eq!(report.added, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.admin_status, 1);
    assert_eq!(report.status, 1);
    assert_eq!(report.audited_entities, 1);
    assert_eq!(report.property_changes, 1);
    assert!(!report.failed);

    // Nothing was left behind for the fast path
    advance_ms(25).await;
    assert_eq!(h.uploader.call_count(), 5);
    assert_eq!(h.engine.run_count(Family::FastStatus), 0);
}

#[tokio::test(start_paused = true)]
async fn test_status_queued_before_add_waits_for_the_entity() {
    let h = started(fast_config()).await;

    h.engine.enqueue_status(vec![status("E1", Status::Available, Status::Charging)]).unwrap();
    h.engine.enqueue_add(Evse::new("E1")).unwrap();

    let pending = h.engine.pending();
    assert_eq!((pending.to_add, pending.fast_status, pending.delayed_status), (1, 0, 1));

    advance_ms(100).await;
    assert_eq!(h.uploader.steps(), vec!["add", "status"]);
    assert_eq!(
        h.uploader.calls()[1],
        Call::Status(vec![("E1".to_string(), Status::Charging, Status::Charging)])
    );
}

#[tokio::test(start_paused = true)]
async fn test_data_round_pushes_status_before_removals() {
    let h = started(fast_config()).await;

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    h.engine.enqueue_status(vec![status("E1", Status::Available, Status::Charging)]).unwrap();
    h.engine.enqueue_remove(Evse::new("E7")).unwrap();

    h.engine.flush_now(Family::Data).await;
    assert_eq!(h.uploader.steps(), vec!["add", "status", "remove"]);
}

// =============================================================================
// Snapshot isolation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_cross_contamination_between_rounds() {
    let h = started(fast_config()).await;
    h.uploader.block();

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    advance_ms(55).await;
    assert_eq!(h.uploader.call_count(), 1, "first round is in flight");

    // Arrives after the snapshot was taken
    h.engine.enqueue_add(Evse::new("E2")).unwrap();
    advance_ms(5).await;
    h.uploader.unblock();
    advance_ms(1).await;
    assert_eq!(h.engine.run_count(Family::Data), 1);

    advance_ms(60).await;
    assert_eq!(
        h.uploader.calls(),
        vec![
            Call::Entities(EntityOperation::Add, ids(&["E1"])),
            Call::Entities(EntityOperation::Add, ids(&["E2"])),
        ]
    );
    assert_eq!(h.engine.run_count(Family::Data), 2);
}

#[tokio::test(start_paused = true)]
async fn test_idempotent_add() {
    let h = started(fast_config()).await;

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    assert_eq!(h.engine.pending().to_add, 1);

    advance_ms(60).await;
    assert_eq!(h.uploader.calls(), vec![Call::Entities(EntityOperation::Add, ids(&["E1"]))]);
}

// =============================================================================
// Guard
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_guard_drops_ticks_while_round_in_flight() {
    let h = started(fast_config()).await;
    let mut events = h.engine.subscribe();
    h.uploader.block();

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    advance_ms(55).await;
    assert_eq!(h.uploader.call_count(), 1);

    h.engine.enqueue_add(Evse::new("E2")).unwrap();
    advance_ms(100).await;
    assert_eq!(h.uploader.call_count(), 1, "second tick produced no upload");
    assert_eq!(h.engine.flush_now(Family::Data).await, FlushOutcome::Busy);

    let skipped = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SyncEvent::TickSkipped { family: Family::Data }))
        .count();
    assert_eq!(skipped, 1);

    h.uploader.unblock();
    advance_ms(1).await;
    assert_eq!(h.engine.run_count(Family::Data), 1);
    // Dropped tick means E2 waits for the next trigger
    assert_eq!(h.engine.pending().to_add, 1);

    let outcome = h.engine.flush_now(Family::Data).await;
    assert_eq!(outcome.report().map(|r| r.added), Some(1));
    assert_eq!(h.engine.run_count(Family::Data), 2);
}

#[tokio::test(start_paused = true)]
async fn test_busy_family_does_not_hold_up_others() {
    let h = started(fast_config()).await;
    h.uploader.block_step("add");

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    advance_ms(55).await;

    h.engine.enqueue_status(vec![status("E9", Status::Available, Status::Charging)]).unwrap();
    h.engine.enqueue_charge_records(vec![5]).unwrap();
    advance_ms(40).await;

    assert_eq!(h.engine.run_count(Family::Data), 0);
    assert_eq!(h.engine.run_count(Family::FastStatus), 1);
    assert_eq!(h.engine.run_count(Family::ChargeRecords), 1);

    h.uploader.unblock();
    advance_ms(1).await;
    assert_eq!(h.engine.run_count(Family::Data), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_now_on_empty_queues_is_idle() {
    let h = started(fast_config()).await;
    for family in Family::ALL {
        assert_eq!(h.engine.flush_now(family).await, FlushOutcome::Idle);
        assert_eq!(h.engine.run_count(family), 0);
    }
    assert_eq!(h.uploader.call_count(), 0);
}

// =============================================================================
// Admission and feature flags
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_disabled_status_feature() {
    let h = started(fast_config()).await;
    h.engine.set_feature_disabled(Feature::Status, true);

    let result = h
        .engine
        .enqueue_status(vec![status("E1", Status::Available, Status::Charging)])
        .unwrap();
    assert_eq!(result, EnqueueResult::AdminDown(Feature::Status));
    let result = h
        .engine
        .enqueue_admin_status(vec![admin("E1", Admin::Operative, Admin::Inoperative)])
        .unwrap();
    assert_eq!(result, EnqueueResult::AdminDown(Feature::Status));

    assert!(!h.engine.is_armed(Family::FastStatus));
    assert!(!h.engine.is_armed(Family::Data));
    assert_eq!(h.engine.pending().total(), 0);

    // Re-enabling does not resurrect what was refused
    h.engine.set_feature_disabled(Feature::Status, false);
    advance_ms(100).await;
    assert_eq!(h.uploader.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_data_and_cdr_features() {
    let h = started(fast_config()).await;
    h.engine.set_feature_disabled(Feature::Data, true);
    h.engine.set_feature_disabled(Feature::ChargeRecords, true);

    assert_eq!(h.engine.enqueue_add(Evse::new("E1")).unwrap(), EnqueueResult::AdminDown(Feature::Data));
    assert_eq!(
        h.engine.enqueue_update(Evse::new("E1"), None).unwrap(),
        EnqueueResult::AdminDown(Feature::Data)
    );
    assert_eq!(h.engine.enqueue_remove(Evse::new("E1")).unwrap(), EnqueueResult::AdminDown(Feature::Data));
    assert_eq!(
        h.engine.enqueue_charge_records(vec![1]).unwrap(),
        EnqueueResult::AdminDown(Feature::ChargeRecords)
    );
    assert_eq!(
        h.engine.send_charge_records(vec![1], Transmission::Direct).await.unwrap(),
        PushOutcome::AdminDown
    );

    advance_ms(100).await;
    assert_eq!(h.uploader.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_admission_filter_rejects_foreign_entities() {
    let h = started(fast_config()).await;
    h.engine.set_admission_filter(
        AdmissionFilter::<Evse>::new()
            .with_entities(|e: &Evse| e.id.starts_with("DE*"))
            .with_status(|u| u.new_status != Status::OutOfOrder),
    );

    assert_eq!(h.engine.enqueue_add(Evse::new("NL*X*E1")).unwrap(), EnqueueResult::NoOperation);
    assert!(!h.engine.is_armed(Family::Data));

    let result = h
        .engine
        .enqueue_status(vec![
            status("NL*X*E1", Status::Available, Status::Charging),
            status("DE*GEF*E1", Status::Available, Status::OutOfOrder),
        ])
        .unwrap();
    assert_eq!(result, EnqueueResult::NoOperation);

    let result = h
        .engine
        .enqueue_status(vec![
            status("NL*X*E1", Status::Available, Status::Charging),
            status("DE*GEF*E2", Status::Available, Status::Charging),
        ])
        .unwrap();
    assert_eq!(result, EnqueueResult::Enqueued { items: 1 });

    advance_ms(100).await;
    assert_eq!(
        h.uploader.calls(),
        vec![Call::Status(vec![("DE*GEF*E2".to_string(), Status::Available, Status::Charging)])]
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_batches_are_no_operation() {
    let h = started(fast_config()).await;
    assert_eq!(h.engine.enqueue_status(vec![]).unwrap(), EnqueueResult::NoOperation);
    assert_eq!(h.engine.enqueue_admin_status(vec![]).unwrap(), EnqueueResult::NoOperation);
    assert_eq!(h.engine.enqueue_charge_records(vec![]).unwrap(), EnqueueResult::NoOperation);
    for family in Family::ALL {
        assert!(!h.engine.is_armed(family));
    }
}

#[tokio::test(start_paused = true)]
async fn test_unnamed_property_change_fails_fast() {
    let h = started(fast_config()).await;
    let result = h
        .engine
        .enqueue_update(Evse::new("E1"), Some(PropertyChange::new("  ", json!(1), json!(2))));
    assert!(matches!(result, Err(SyncError::InvalidArgument(_))));
    assert_eq!(h.engine.pending().to_update, 0);
}

// =============================================================================
// Charge detail records
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_charge_records_are_batched() {
    let h = started(fast_config()).await;

    assert_eq!(
        h.engine.enqueue_charge_records(vec![1, 2]).unwrap(),
        EnqueueResult::Enqueued { items: 2 }
    );
    advance_ms(10).await;
    assert_eq!(
        h.engine.send_charge_records(vec![3], Transmission::Enqueue).await.unwrap(),
        PushOutcome::Enqueued
    );
    assert_eq!(h.engine.pending().charge_records, 3);

    advance_ms(35).await;
    assert_eq!(h.uploader.calls(), vec![Call::ChargeRecords(vec![1, 2, 3])]);
    assert_eq!(h.engine.pending().charge_records, 0);
}

#[tokio::test(start_paused = true)]
async fn test_direct_charge_records_bypass_the_queue() {
    let h = started(fast_config()).await;

    let outcome = h.engine.send_charge_records(vec![7, 8], Transmission::Direct).await.unwrap();
    assert_eq!(outcome, PushOutcome::Success { accepted: 2 });
    assert_eq!(h.uploader.calls(), vec![Call::ChargeRecords(vec![7, 8])]);
    assert_eq!(h.engine.run_count(Family::ChargeRecords), 0);
    assert!(!h.engine.is_armed(Family::ChargeRecords));

    assert_eq!(
        h.engine.send_charge_records(vec![], Transmission::Direct).await.unwrap(),
        PushOutcome::NoOperation
    );
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_round_lifecycle_events() {
    let h = started(fast_config()).await;
    let mut events = h.engine.subscribe();

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    advance_ms(60).await;
    h.engine.enqueue_add(Evse::new("E2")).unwrap();
    advance_ms(60).await;

    let events = drain(&mut events);
    assert_eq!(events.len(), 4);
    match (&events[0], &events[1]) {
        (
            SyncEvent::RoundStarted { family: Family::Data, run: 0, interval, started_at },
            SyncEvent::RoundFinished { run: 0, failed: false, started_at: finished_start, .. },
        ) => {
            assert_eq!(*interval, Duration::from_millis(50));
            assert_eq!(started_at, finished_start);
        }
        other => panic!("unexpected events: {other:?}"),
    }
    assert!(matches!(events[2], SyncEvent::RoundStarted { run: 1, .. }));
    assert!(matches!(events[3], SyncEvent::RoundFinished { run: 1, .. }));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_work_queued_before_start_is_flushed_after() {
    let uploader = RecordingUploader::new();
    let config = fast_config();
    let (_tx, rx) = watch::channel(config.clone());
    let engine = SyncEngine::new(config, rx, Arc::clone(&uploader)).unwrap();

    engine.enqueue_add(Evse::new("E1")).unwrap();
    advance_ms(100).await;
    assert_eq!(uploader.call_count(), 0);

    engine.start().await.unwrap();
    advance_ms(1).await;
    assert_eq!(uploader.calls(), vec![Call::Entities(EntityOperation::Add, ids(&["E1"]))]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_pending_work() {
    let h = started(fast_config()).await;

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    h.engine.enqueue_status(vec![status("E9", Status::Available, Status::Charging)]).unwrap();
    h.engine.enqueue_charge_records(vec![4]).unwrap();

    h.engine.shutdown().await;
    assert_eq!(h.engine.state(), EngineState::Stopped);
    assert_eq!(h.uploader.steps(), vec!["add", "status", "charge_records"]);
    assert_eq!(h.engine.pending().total(), 0);

    assert!(matches!(h.engine.enqueue_add(Evse::new("E2")), Err(SyncError::ShutDown)));
    assert!(matches!(
        h.engine.send_charge_records(vec![1], Transmission::Direct).await,
        Err(SyncError::ShutDown)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_in_flight_round() {
    let h = started(fast_config()).await;
    h.uploader.block();
    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    advance_ms(55).await;

    let engine = h.engine.clone();
    let shutdown = tokio::spawn(async move { engine.shutdown().await });
    advance_ms(10).await;
    assert_eq!(h.engine.state(), EngineState::ShuttingDown);

    h.uploader.unblock();
    shutdown.await.unwrap();
    assert_eq!(h.engine.state(), EngineState::Stopped);
    assert_eq!(h.engine.run_count(Family::Data), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_without_final_flush_leaves_queues() {
    let h = started(SyncEngineConfig { flush_on_shutdown: false, ..fast_config() }).await;

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    h.engine.shutdown().await;
    assert_eq!(h.uploader.call_count(), 0);
    assert_eq!(h.engine.pending().to_add, 1);
}

#[tokio::test(start_paused = true)]
async fn test_config_update_applies_to_next_arm() {
    let h = started(fast_config()).await;
    h.config_tx.send_replace(SyncEngineConfig { data_flush_ms: 10, ..fast_config() });
    advance_ms(1).await;

    h.engine.enqueue_add(Evse::new("E1")).unwrap();
    advance_ms(15).await;
    assert_eq!(h.engine.run_count(Family::Data), 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_lose_nothing() {
    let uploader = RecordingUploader::new();
    let config = SyncEngineConfig::default();
    let (_tx, rx) = watch::channel(config.clone());
    let engine = SyncEngine::new(config, rx, Arc::clone(&uploader)).unwrap();
    engine.start().await.unwrap();

    let mut producers = Vec::new();
    for p in 0..8 {
        let engine = engine.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..50 {
                engine.enqueue_add(Evse::new(&format!("P{p}-E{i}"))).unwrap();
                engine
                    .enqueue_status(vec![status(&format!("P{p}-E{i}"), Status::Available, Status::Charging)])
                    .unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let report = added_and_status(engine.flush_now(Family::Data).await);
    assert_eq!(report.0, 400);
    assert_eq!(report.1, 400);

    let pushed: HashSet<String> = uploader
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Entities(EntityOperation::Add, ids) => Some(ids),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(pushed.len(), 400);
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_work_accepted_during_shutdown_race_is_flushed() {
    let uploader = RecordingUploader::new();
    let config = SyncEngineConfig::default();
    let (_tx, rx) = watch::channel(config.clone());
    let engine = SyncEngine::new(config, rx, Arc::clone(&uploader)).unwrap();
    engine.start().await.unwrap();

    let mut producers = Vec::new();
    for p in 0..4 {
        let engine = engine.clone();
        producers.push(tokio::spawn(async move {
            let mut accepted = Vec::new();
            for i in 0..20_000 {
                let id = format!("P{p}-E{i}");
                match engine.enqueue_add(Evse::new(&id)) {
                    Ok(EnqueueResult::Enqueued { .. }) => accepted.push(id),
                    Ok(other) => panic!("unexpected acknowledgement {other:?}"),
                    Err(SyncError::ShutDown) => break,
                    Err(e) => panic!("unexpected error {e}"),
                }
                if i % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            accepted
        }));
    }

    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.shutdown().await;

    let mut accepted = HashSet::new();
    for producer in producers {
        accepted.extend(producer.await.unwrap());
    }
    let pushed: HashSet<String> = uploader
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Entities(EntityOperation::Add, ids) => Some(ids),
            _ => None,
        })
        .flatten()
        .collect();
    assert!(!accepted.is_empty());
    assert_eq!(pushed, accepted);
    assert_eq!(engine.pending().total(), 0);
}

fn added_and_status(outcome: FlushOutcome) -> (usize, usize) {
    let report = outcome.report().expect("round ran");
    (report.added, report.status)
}
