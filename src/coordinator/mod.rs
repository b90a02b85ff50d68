// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine coordinator.
//!
//! The [`SyncEngine`] ties together all components:
//! - Admission filter and per-feature kill switches
//! - The entity queue store (with delayed status routing) and the CDR queue
//! - One debouncer, guard and run counter per flush family
//! - Flush executors that hand snapshots to the [`Uploader`]
//!
//! # Lifecycle
//!
//! ```text
//! Created → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use roaming_sync::{SyncEngine, SyncEngineConfig, EngineState, Uploader};
//! # use tokio::sync::watch;
//! # async fn example<U: Uploader>(uploader: Arc<U>, evse: U::Entity) {
//! let config = SyncEngineConfig::default();
//! let (_tx, rx) = watch::channel(config.clone());
//! let engine = SyncEngine::new(config, rx, uploader).expect("valid config");
//!
//! assert_eq!(engine.state(), EngineState::Created);
//! engine.start().await.expect("start");
//!
//! engine.enqueue_add(evse).expect("accepted");
//! // ... one data round fires after the quiet period
//!
//! engine.shutdown().await;
//! # }
//! ```

mod api;
mod flush;
mod lifecycle;
mod types;

pub use types::{EngineState, FlushOutcome, RoundReport, Transmission};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::admission::AdmissionFilter;
use crate::config::SyncEngineConfig;
use crate::error::SyncError;
use crate::events::{EventBus, SyncEvent};
use crate::model::{Family, Feature};
use crate::queue::{PendingBatch, QueueStats, QueueStore};
use crate::scheduler::{Debouncer, FlushGuard};
use crate::uploader::Uploader;

/// Per-family scheduling state.
#[derive(Debug)]
pub(crate) struct FamilySlot {
    pub(crate) debouncer: Debouncer,
    pub(crate) guard: FlushGuard,
    /// Completed rounds
    pub(crate) runs: AtomicU64,
}

impl FamilySlot {
    fn new() -> Self {
        Self {
            debouncer: Debouncer::new(),
            guard: FlushGuard::new(),
            runs: AtomicU64::new(0),
        }
    }
}

pub(crate) struct EngineInner<U: Uploader> {
    /// Configuration (can be updated at runtime via watch channel)
    pub(crate) config: RwLock<SyncEngineConfig>,

    /// Runtime config updates, handed to the watcher task on start
    pub(crate) config_rx: Mutex<Option<watch::Receiver<SyncEngineConfig>>>,

    pub(crate) filter: RwLock<AdmissionFilter<U::Entity>>,

    /// Held shared by enqueue calls from the state check through the
    /// append; shutdown takes it exclusively to close intake
    pub(crate) intake: RwLock<()>,

    /// Entity data + both status planes
    pub(crate) store: QueueStore<U::Entity>,

    /// Charge detail records
    pub(crate) records: Mutex<PendingBatch<U::ChargeRecord>>,

    /// Indexed by [`Family::index`]
    pub(crate) families: [Arc<FamilySlot>; 3],

    pub(crate) uploader: Arc<U>,

    pub(crate) events: EventBus,

    /// Engine state (broadcast to watchers)
    pub(crate) state: watch::Sender<EngineState>,
    pub(crate) state_rx: watch::Receiver<EngineState>,

    /// Flipped to true to stop the background loops
    pub(crate) shutdown: watch::Sender<bool>,

    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Outbound synchronization engine.
///
/// Cheap to clone; clones share the same queues and loops.
///
/// # Thread Safety
///
/// Enqueue calls may come from any thread or task. They only hold the
/// queue lock long enough to append; uploads happen outside any lock, so a
/// slow backend never blocks producers.
pub struct SyncEngine<U: Uploader> {
    pub(crate) inner: Arc<EngineInner<U>>,
}

impl<U: Uploader> Clone for SyncEngine<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U: Uploader> SyncEngine<U> {
    /// Create a new sync engine.
    ///
    /// The engine starts in `Created` state with empty queues. Call
    /// [`start()`](Self::start) to spawn the flush loops.
    pub fn new(
        config: SyncEngineConfig,
        config_rx: watch::Receiver<SyncEngineConfig>,
        uploader: Arc<U>,
    ) -> Result<Self, SyncError> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let (shutdown_tx, _) = watch::channel(false);
        let events = EventBus::new(config.event_capacity);

        info!(
            data_flush_ms = config.data_flush_ms,
            fast_status_flush_ms = config.fast_status_flush_ms,
            cdr_flush_ms = config.cdr_flush_ms,
            "Sync engine created"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config: RwLock::new(config),
                config_rx: Mutex::new(Some(config_rx)),
                filter: RwLock::new(AdmissionFilter::new()),
                intake: RwLock::new(()),
                store: QueueStore::new(),
                records: Mutex::new(PendingBatch::new()),
                families: [
                    Arc::new(FamilySlot::new()),
                    Arc::new(FamilySlot::new()),
                    Arc::new(FamilySlot::new()),
                ],
                uploader,
                events,
                state: state_tx,
                state_rx,
                shutdown: shutdown_tx,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Replace the admission rules. Applies to subsequent enqueues only.
    pub fn set_admission_filter(&self, filter: AdmissionFilter<U::Entity>) {
        *self.inner.filter.write() = filter;
    }

    /// Get current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.inner.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.inner.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Lifecycle notifications (round started/finished/failed, skipped ticks).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> SyncEngineConfig {
        self.inner.config.read().clone()
    }

    #[must_use]
    pub fn is_disabled(&self, feature: Feature) -> bool {
        self.inner.config.read().features.is_disabled(feature)
    }

    /// Flip an administrative kill switch. Takes effect for the next call.
    pub fn set_feature_disabled(&self, feature: Feature, disabled: bool) {
        self.inner.config.write().features.set(feature, disabled);
        info!(%feature, disabled, "Feature flag changed");
    }

    /// Number of completed rounds of a family.
    #[must_use]
    pub fn run_count(&self, family: Family) -> u64 {
        self.slot(family).runs.load(Ordering::Acquire)
    }

    /// True while the family's debounce timer is armed.
    #[must_use]
    pub fn is_armed(&self, family: Family) -> bool {
        self.slot(family).debouncer.is_armed()
    }

    /// Current queue depths.
    #[must_use]
    pub fn pending(&self) -> QueueStats {
        let mut stats = self.inner.store.stats();
        stats.charge_records = self.inner.records.lock().len();
        stats
    }

    #[must_use]
    pub fn uploader(&self) -> &Arc<U> {
        &self.inner.uploader
    }

    pub(crate) fn slot(&self, family: Family) -> &Arc<FamilySlot> {
        &self.inner.families[family.index()]
    }

    /// (Re)start the family's quiet period.
    pub(crate) fn arm(&self, family: Family) {
        let quiet = self.inner.config.read().flush_interval(family);
        self.slot(family).debouncer.arm(quiet);
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        self.inner.state.send_replace(state);
        crate::metrics::set_engine_state(&state.to_string());
    }
}
