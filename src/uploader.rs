// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The backend-specific uploader the engine hands its batches to.
//!
//! The engine does not speak any roaming protocol. A protocol adapter
//! implements [`Uploader`] and translates each batch into whatever its
//! backend expects. Results are logged and, on failure, surfaced through
//! the event channel; the engine never retries or re-queues.

use async_trait::async_trait;

use crate::error::UploadError;
use crate::model::{AdminUpdate, OperationalUpdate, SyncEntity};

/// Which entity batch a [`Uploader::push_entities`] call carries.
///
/// A data round calls the uploader once per non-empty operation, in the
/// order `Add`, `Update`, then status, then `Remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityOperation {
    Add,
    Update,
    Remove,
}

impl EntityOperation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

impl std::fmt::Display for EntityOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend answer to one push. Opaque to the engine beyond logging;
/// [`PushOutcome::Failure`] is reported like an [`UploadError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Success { accepted: usize },
    Enqueued,
    NoOperation,
    AdminDown,
    Failure(String),
}

impl PushOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Enqueued => "enqueued",
            Self::NoOperation => "no_operation",
            Self::AdminDown => "admin_down",
            Self::Failure(_) => "failure",
        }
    }
}

#[async_trait]
pub trait Uploader: Send + Sync + 'static {
    type Entity: SyncEntity;
    type ChargeRecord: Clone + std::fmt::Debug + Send + Sync + 'static;

    async fn push_entities(
        &self,
        operation: EntityOperation,
        entities: &[Self::Entity],
    ) -> Result<PushOutcome, UploadError>;

    async fn push_status(
        &self,
        updates: &[OperationalUpdate<Self::Entity>],
    ) -> Result<PushOutcome, UploadError>;

    /// Backends without an administrative status plane can keep the
    /// default, which accepts and drops the batch.
    async fn push_admin_status(
        &self,
        updates: &[AdminUpdate<Self::Entity>],
    ) -> Result<PushOutcome, UploadError> {
        let _ = updates;
        Ok(PushOutcome::NoOperation)
    }

    async fn push_charge_records(
        &self,
        records: &[Self::ChargeRecord],
    ) -> Result<PushOutcome, UploadError>;
}
