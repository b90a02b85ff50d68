// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic roaming-sync usage example.
//!
//! Demonstrates:
//! 1. Plugging in an uploader (here: one that just logs)
//! 2. Adding EVSEs and reporting their status before they are uploaded
//! 3. Watching round notifications
//! 4. Sending charge detail records, queued and direct
//! 5. Displaying metrics (OTEL-compatible)
//! 6. Clean shutdown with a final flush
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=roaming_sync=debug cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use roaming_sync::{
    EngineState, EntityOperation, Family, OperationalUpdate, PushOutcome, StatusUpdate, SyncEngine,
    SyncEngineConfig, SyncEntity, SyncEvent, Transmission, UploadError, Uploader,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Evse {
    id: String,
}

impl SyncEntity for Evse {
    type Status = &'static str;
    type AdminStatus = &'static str;
}

#[derive(Debug, Clone)]
struct ChargeRecord {
    session: u32,
    kwh: f64,
}

/// Stands in for a real protocol adapter.
struct PrintingUploader;

#[async_trait]
impl Uploader for PrintingUploader {
    type Entity = Evse;
    type ChargeRecord = ChargeRecord;

    async fn push_entities(&self, operation: EntityOperation, entities: &[Evse]) -> Result<PushOutcome, UploadError> {
        let ids: Vec<_> = entities.iter().map(|e| e.id.as_str()).collect();
        println!("   ⇢ push {operation}: {ids:?}");
        Ok(PushOutcome::Success { accepted: entities.len() })
    }

    async fn push_status(&self, updates: &[OperationalUpdate<Evse>]) -> Result<PushOutcome, UploadError> {
        for u in updates {
            println!("   ⇢ status {}: {} → {}", u.entity.id, u.old_status, u.new_status);
        }
        Ok(PushOutcome::Success { accepted: updates.len() })
    }

    async fn push_charge_records(&self, records: &[ChargeRecord]) -> Result<PushOutcome, UploadError> {
        for r in records {
            println!("   ⇢ cdr session={} kwh={:.1}", r.session, r.kwh);
        }
        Ok(PushOutcome::Success { accepted: records.len() })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           roaming-sync: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start the engine
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring roaming-sync...");

    // Short quiet periods so the demo finishes quickly
    let config = SyncEngineConfig {
        data_flush_ms: 500,
        fast_status_flush_ms: 200,
        cdr_flush_ms: 300,
        ..Default::default()
    };
    let (_config_tx, config_rx) = watch::channel(config.clone());
    let engine = SyncEngine::new(config, config_rx, Arc::new(PrintingUploader))?;

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::RoundFinished { family, run, elapsed, failed, .. } => {
                    println!("   ✓ {family} round #{run} finished in {elapsed:?} (failed: {failed})");
                }
                SyncEvent::RoundFailed { family, causes, .. } => {
                    println!("   ✗ {family} round failed: {}", causes.join(" ← "));
                }
                _ => {}
            }
        }
    });

    engine.start().await?;
    assert_eq!(engine.state(), EngineState::Running);
    println!("   └─ Engine running\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 2. New EVSEs plus status changes that arrive before their upload
    // ─────────────────────────────────────────────────────────────────────────
    println!("🔌 Adding 3 EVSEs and reporting status...");
    for n in 1..=3 {
        let evse = Evse { id: format!("DE*GEF*E{n}") };
        engine.enqueue_add(evse.clone())?;
        engine.enqueue_status(vec![StatusUpdate::new(evse.clone(), "Unknown", "Charging")])?;
        engine.enqueue_status(vec![StatusUpdate::new(evse, "Charging", "Available")])?;
    }
    let pending = engine.pending();
    println!(
        "   └─ Queued: {} to add, {} delayed status updates",
        pending.to_add, pending.delayed_status
    );

    tokio::time::sleep(Duration::from_millis(700)).await;
    println!();

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Status for known EVSEs takes the fast path
    // ─────────────────────────────────────────────────────────────────────────
    println!("⚡ Fast status update...");
    engine.enqueue_status(vec![StatusUpdate::new(
        Evse { id: "DE*GEF*E2".into() },
        "Available",
        "Charging",
    )])?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!();

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Charge detail records
    // ─────────────────────────────────────────────────────────────────────────
    println!("🧾 Charge detail records...");
    engine.enqueue_charge_records(vec![
        ChargeRecord { session: 1001, kwh: 21.4 },
        ChargeRecord { session: 1002, kwh: 7.9 },
    ])?;
    let outcome = engine
        .send_charge_records(vec![ChargeRecord { session: 1003, kwh: 48.0 }], Transmission::Direct)
        .await?;
    println!("   └─ Direct send: {outcome:?}");
    tokio::time::sleep(Duration::from_millis(400)).await;
    println!();

    for family in Family::ALL {
        println!("   {family}: {} round(s)", engine.run_count(family));
    }
    println!();

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("📊 Metrics:");
    dump_metrics(&snapshotter);
    println!();

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("🛑 Shutting down...");
    engine.enqueue_remove(Evse { id: "DE*GEF*E3".into() })?;
    engine.shutdown().await;
    println!("   └─ State: {}\n", engine.state());

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, label_str, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }

    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.0}", name, labels, value);
        }
    }

    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, sum) in &histograms {
            let avg = if *count > 0 { sum / *count as f64 } else { 0.0 };
            println!("      └─ {}{} count={} avg={:.4}", name, labels, count, avg);
        }
    }

    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
