//! # Roaming Sync
//!
//! Outbound synchronization engine for EV charging infrastructure.
//!
//! Collects entity data (locations, EVSEs, connectors), operational and
//! administrative status changes and charge detail records from a
//! charging-station backend, and pushes them in batches to roaming
//! partners through a protocol adapter that implements [`Uploader`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Enqueue API                          │
//! │  • Feature kill switches → AdminDown                       │
//! │  • Admission filter → NoOperation                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Queue Store                          │
//! │  • to-add / to-update / to-remove + property audit log     │
//! │  • status routed fast, or delayed while the entity is      │
//! │    still waiting for its first upload                      │
//! │  • flat charge record list                                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              (per-family debounce → skip-if-busy guard)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Flush Executors                        │
//! │  • data: add, update, admin status, status, remove         │
//! │  • fast status: admin status, status                       │
//! │  • charge records                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                     Uploader (protocol adapter)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roaming_sync::{SyncEngine, SyncEngineConfig, Uploader};
//! use tokio::sync::watch;
//!
//! async fn run<U: Uploader>(uploader: Arc<U>, evse: U::Entity) {
//!     let config = SyncEngineConfig::default();
//!     let (_tx, rx) = watch::channel(config.clone());
//!     let engine = SyncEngine::new(config, rx, uploader).expect("valid config");
//!
//!     let mut events = engine.subscribe();
//!     engine.start().await.expect("Failed to start");
//!
//!     // Acknowledged immediately; pushed once the data family goes quiet
//!     engine.enqueue_add(evse).expect("Failed to enqueue");
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     engine.shutdown().await;
//! }
//! ```
//!
//! ## Delivery
//!
//! A batch swapped out for a round is never re-queued. Failures are
//! logged and reported as [`SyncEvent::RoundFailed`]; callers that need
//! delivery guarantees re-submit when they see one.
//!
//! ## Modules
//!
//! - [`coordinator`]: The main [`SyncEngine`] orchestrating all components
//! - [`queue`]: Pending work and flush snapshots
//! - [`scheduler`]: Debounce timers and flush guards
//! - [`admission`]: Entity and status admission rules
//! - [`uploader`]: The protocol adapter contract
//! - [`events`]: Lifecycle notifications

pub mod admission;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod metrics;
pub mod model;
pub mod queue;
pub mod scheduler;
pub mod uploader;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use admission::AdmissionFilter;
pub use config::{FeatureFlags, SyncEngineConfig};
pub use coordinator::{EngineState, FlushOutcome, RoundReport, SyncEngine, Transmission};
pub use error::{SyncError, UploadError};
pub use events::{EventBus, SyncEvent};
pub use metrics::LatencyTimer;
pub use model::{
    AdminUpdate, EnqueueResult, Family, Feature, OperationalUpdate, PropertyChange, StatusUpdate,
    SyncEntity,
};
pub use queue::QueueStats;
pub use scheduler::{Debouncer, FlushGuard};
pub use uploader::{EntityOperation, PushOutcome, Uploader};
