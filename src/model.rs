// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Values that flow through the sync engine.
//!
//! The engine never looks inside an entity beyond [`SyncEntity`]: identity
//! comes from `Eq + Hash`, and the current status accessors are only used to
//! synthesize a status assertion for freshly added entities whose data is
//! newer than their last reported status.
//!
//! # Example
//!
//! ```
//! use roaming_sync::{StatusUpdate, SyncEntity};
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! struct Evse(&'static str);
//!
//! impl SyncEntity for Evse {
//!     type Status = &'static str;
//!     type AdminStatus = &'static str;
//! }
//!
//! let update = StatusUpdate::new(Evse("DE*GEF*E1"), "Available", "Charging");
//! assert_eq!(update.entity, Evse("DE*GEF*E1"));
//! assert!(update.is_change());
//! ```

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A syncable object (charge point, EVSE, station...).
///
/// Two values are the same entity when they compare equal; the queue store
/// relies on this for set semantics.
pub trait SyncEntity: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Operational status plane (available, charging, out of service...).
    type Status: Clone + Debug + PartialEq + Send + Sync + 'static;
    /// Administrative status plane (operational, blocked, planned...).
    type AdminStatus: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Current operational status, if the entity tracks one.
    fn status(&self) -> Option<Self::Status> {
        None
    }

    /// Current administrative status, if the entity tracks one.
    fn admin_status(&self) -> Option<Self::AdminStatus> {
        None
    }
}

/// A status transition for one entity on one status plane.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate<E, S> {
    pub entity: E,
    pub old_status: S,
    pub new_status: S,
    /// When the transition was observed (epoch millis)
    pub timestamp: i64,
}

impl<E, S: PartialEq> StatusUpdate<E, S> {
    pub fn new(entity: E, old_status: S, new_status: S) -> Self {
        Self {
            entity,
            old_status,
            new_status,
            timestamp: now_millis(),
        }
    }

    #[must_use]
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// False for assertions where old and new status are equal.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.old_status != self.new_status
    }
}

/// Operational status update for entity type `E`.
pub type OperationalUpdate<E> = StatusUpdate<E, <E as SyncEntity>::Status>;

/// Administrative status update for entity type `E`.
pub type AdminUpdate<E> = StatusUpdate<E, <E as SyncEntity>::AdminStatus>;

/// One entry of the per-entity property audit log.
///
/// Diagnostics only: nothing in the flush path depends on these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: String,
    pub old_value: Value,
    pub new_value: Value,
}

impl PropertyChange {
    pub fn new(property: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self {
            property: property.into(),
            old_value,
            new_value,
        }
    }
}

/// A flush family: one debounce timer, one guard, one run counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Entity additions/updates/removals plus delayed status
    Data,
    /// Status updates for entities already known to the backend
    FastStatus,
    /// Charge detail records
    ChargeRecords,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Data, Family::FastStatus, Family::ChargeRecords];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Data => 0,
            Self::FastStatus => 1,
            Self::ChargeRecords => 2,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::FastStatus => "fast_status",
            Self::ChargeRecords => "charge_records",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administratively switchable feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Data,
    Status,
    ChargeRecords,
    Authentication,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Status => write!(f, "status"),
            Self::ChargeRecords => write!(f, "charge_records"),
            Self::Authentication => write!(f, "authentication"),
        }
    }
}

/// Immediate acknowledgement of an enqueue call.
///
/// This is never the backend's answer; that arrives later through
/// [`crate::SyncEvent`] notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Accepted into the queue store; the owning timer was re-armed
    Enqueued { items: usize },
    /// Empty batch, or everything was filtered out
    NoOperation,
    /// The feature is administratively disabled; nothing was queued
    AdminDown(Feature),
}

impl EnqueueResult {
    #[must_use]
    pub fn is_enqueued(&self) -> bool {
        matches!(self, Self::Enqueued { .. })
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::NoOperation => "no_operation",
            Self::AdminDown(_) => "admin_down",
        }
    }
}

/// Wall clock in epoch millis.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
