// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Admission rules for entities and status updates.
//!
//! Predicates decide what is eligible for synchronization at all; an
//! entity or update that is not admitted is dropped at enqueue time and the
//! call reports [`crate::EnqueueResult::NoOperation`].
//!
//! # Example
//!
//! ```
//! use roaming_sync::{AdmissionFilter, StatusUpdate, SyncEntity};
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! struct Evse(String);
//!
//! impl SyncEntity for Evse {
//!     type Status = String;
//!     type AdminStatus = String;
//! }
//!
//! let filter = AdmissionFilter::<Evse>::new()
//!     .with_entities(|evse| evse.0.starts_with("DE*GEF"));
//!
//! assert!(filter.admit_entity(&Evse("DE*GEF*E1".into())));
//! assert!(!filter.admit_entity(&Evse("NL*ABC*E9".into())));
//! ```

use std::sync::Arc;

use crate::model::{AdminUpdate, OperationalUpdate, SyncEntity};

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Caller supplied inclusion rules. The default admits everything.
pub struct AdmissionFilter<E: SyncEntity> {
    entity: Predicate<E>,
    status: Predicate<OperationalUpdate<E>>,
    admin_status: Predicate<AdminUpdate<E>>,
}

impl<E: SyncEntity> AdmissionFilter<E> {
    pub fn new() -> Self {
        Self {
            entity: Arc::new(|_| true),
            status: Arc::new(|_| true),
            admin_status: Arc::new(|_| true),
        }
    }

    #[must_use]
    pub fn with_entities<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.entity = Arc::new(predicate);
        self
    }

    #[must_use]
    pub fn with_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&OperationalUpdate<E>) -> bool + Send + Sync + 'static,
    {
        self.status = Arc::new(predicate);
        self
    }

    #[must_use]
    pub fn with_admin_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AdminUpdate<E>) -> bool + Send + Sync + 'static,
    {
        self.admin_status = Arc::new(predicate);
        self
    }

    #[must_use]
    pub fn admit_entity(&self, entity: &E) -> bool {
        (self.entity)(entity)
    }

    /// Status updates must pass both the update rule and the entity rule.
    #[must_use]
    pub fn admit_status(&self, update: &OperationalUpdate<E>) -> bool {
        (self.entity)(&update.entity) && (self.status)(update)
    }

    #[must_use]
    pub fn admit_admin_status(&self, update: &AdminUpdate<E>) -> bool {
        (self.entity)(&update.entity) && (self.admin_status)(update)
    }
}

impl<E: SyncEntity> Default for AdmissionFilter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SyncEntity> Clone for AdmissionFilter<E> {
    fn clone(&self) -> Self {
        Self {
            entity: Arc::clone(&self.entity),
            status: Arc::clone(&self.status),
            admin_status: Arc::clone(&self.admin_status),
        }
    }
}

impl<E: SyncEntity> std::fmt::Debug for AdmissionFilter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionFilter").finish_non_exhaustive()
    }
}
