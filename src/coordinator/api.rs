//! Enqueue API.
//!
//! Every call returns an immediate acknowledgement ([`EnqueueResult`]),
//! never the backend's answer. In order, each call:
//! 1. refuses with [`SyncError::ShutDown`] once shutdown has begun; the
//!    check and the append happen under a shared intake lock, so work
//!    accepted here is always seen by the final shutdown rounds
//! 2. returns `AdminDown` if its feature is disabled (no side effects)
//! 3. applies the admission filter (`NoOperation` if nothing is left)
//! 4. appends under the queue lock and re-arms the owning family's timer

use tracing::{debug, warn};

use crate::error::SyncError;
use crate::model::{AdminUpdate, EnqueueResult, Family, Feature, OperationalUpdate, PropertyChange};
use crate::queue::Routed;
use crate::uploader::{PushOutcome, Uploader};

use super::{EngineState, SyncEngine, Transmission};

impl<U: Uploader> SyncEngine<U> {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Entity data
    // ═══════════════════════════════════════════════════════════════════════════

    /// Queue an entity for addition.
    ///
    /// Adding the same entity twice before a flush is a no-op for the queue,
    /// though the data timer is still pushed back.
    pub fn enqueue_add(&self, entity: U::Entity) -> Result<EnqueueResult, SyncError> {
        let _intake = self.inner.intake.read();
        if let Some(result) = self.gate(Feature::Data, Family::Data)? {
            return Ok(result);
        }
        if !self.inner.filter.read().admit_entity(&entity) {
            return Ok(self.acknowledge(Family::Data, EnqueueResult::NoOperation));
        }

        debug!(entity = ?entity, "Entity queued for addition");
        let added = self.inner.store.add(entity);
        if added.held_back > 0 {
            debug!(held_back = added.held_back, "Fast status moved behind the pending addition");
        }
        self.arm(Family::Data);
        Ok(self.acknowledge(Family::Data, EnqueueResult::Enqueued { items: 1 }))
    }

    /// Queue an entity for a data update, optionally recording which
    /// property changed in the audit log.
    pub fn enqueue_update(
        &self,
        entity: U::Entity,
        change: Option<PropertyChange>,
    ) -> Result<EnqueueResult, SyncError> {
        if let Some(change) = &change {
            if change.property.trim().is_empty() {
                return Err(SyncError::InvalidArgument(
                    "property change must name the property".to_string(),
                ));
            }
        }
        let _intake = self.inner.intake.read();
        if let Some(result) = self.gate(Feature::Data, Family::Data)? {
            return Ok(result);
        }
        if !self.inner.filter.read().admit_entity(&entity) {
            return Ok(self.acknowledge(Family::Data, EnqueueResult::NoOperation));
        }

        debug!(
            entity = ?entity,
            property = change.as_ref().map(|c| c.property.as_str()),
            "Entity queued for update"
        );
        self.inner.store.update(entity, change);
        self.arm(Family::Data);
        Ok(self.acknowledge(Family::Data, EnqueueResult::Enqueued { items: 1 }))
    }

    /// Queue an entity for removal.
    pub fn enqueue_remove(&self, entity: U::Entity) -> Result<EnqueueResult, SyncError> {
        let _intake = self.inner.intake.read();
        if let Some(result) = self.gate(Feature::Data, Family::Data)? {
            return Ok(result);
        }
        if !self.inner.filter.read().admit_entity(&entity) {
            return Ok(self.acknowledge(Family::Data, EnqueueResult::NoOperation));
        }

        debug!(entity = ?entity, "Entity queued for removal");
        self.inner.store.remove(entity);
        self.arm(Family::Data);
        Ok(self.acknowledge(Family::Data, EnqueueResult::Enqueued { items: 1 }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Status
    // ═══════════════════════════════════════════════════════════════════════════

    /// Queue operational status changes.
    ///
    /// Updates for entities still waiting for their first data upload go to
    /// the delayed queue (flushed with the data round), the rest to the fast
    /// queue.
    pub fn enqueue_status(
        &self,
        updates: Vec<OperationalUpdate<U::Entity>>,
    ) -> Result<EnqueueResult, SyncError> {
        let _intake = self.inner.intake.read();
        if let Some(result) = self.gate(Feature::Status, Family::FastStatus)? {
            return Ok(result);
        }
        let admitted: Vec<_> = {
            let filter = self.inner.filter.read();
            updates.into_iter().filter(|u| filter.admit_status(u)).collect()
        };
        if admitted.is_empty() {
            return Ok(self.acknowledge(Family::FastStatus, EnqueueResult::NoOperation));
        }

        let routed = self.inner.store.push_status(admitted);
        debug!(fast = routed.fast, delayed = routed.delayed, "Status updates queued");
        self.arm_routed(routed);
        Ok(self.acknowledge(Family::FastStatus, EnqueueResult::Enqueued { items: routed.total() }))
    }

    /// Queue administrative status changes. Same routing as
    /// [`enqueue_status`](Self::enqueue_status) on an independent plane.
    pub fn enqueue_admin_status(
        &self,
        updates: Vec<AdminUpdate<U::Entity>>,
    ) -> Result<EnqueueResult, SyncError> {
        let _intake = self.inner.intake.read();
        if let Some(result) = self.gate(Feature::Status, Family::FastStatus)? {
            return Ok(result);
        }
        let admitted: Vec<_> = {
            let filter = self.inner.filter.read();
            updates.into_iter().filter(|u| filter.admit_admin_status(u)).collect()
        };
        if admitted.is_empty() {
            return Ok(self.acknowledge(Family::FastStatus, EnqueueResult::NoOperation));
        }

        let routed = self.inner.store.push_admin_status(admitted);
        debug!(fast = routed.fast, delayed = routed.delayed, "Admin status updates queued");
        self.arm_routed(routed);
        Ok(self.acknowledge(Family::FastStatus, EnqueueResult::Enqueued { items: routed.total() }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Charge detail records
    // ═══════════════════════════════════════════════════════════════════════════

    /// Append charge detail records to the flat CDR queue.
    pub fn enqueue_charge_records(
        &self,
        records: Vec<U::ChargeRecord>,
    ) -> Result<EnqueueResult, SyncError> {
        let _intake = self.inner.intake.read();
        if let Some(result) = self.gate(Feature::ChargeRecords, Family::ChargeRecords)? {
            return Ok(result);
        }
        if records.is_empty() {
            return Ok(self.acknowledge(Family::ChargeRecords, EnqueueResult::NoOperation));
        }

        let items = records.len();
        self.inner.records.lock().extend(records);
        debug!(items, "Charge records queued");
        self.arm(Family::ChargeRecords);
        Ok(self.acknowledge(Family::ChargeRecords, EnqueueResult::Enqueued { items }))
    }

    /// Send charge detail records either through the queue or straight to
    /// the uploader.
    ///
    /// With [`Transmission::Direct`] the call awaits the backend and returns
    /// its outcome; upload errors come back as [`PushOutcome::Failure`].
    /// Direct sends are not flush rounds: they take no guard and do not
    /// advance the run counter.
    pub async fn send_charge_records(
        &self,
        records: Vec<U::ChargeRecord>,
        transmission: Transmission,
    ) -> Result<PushOutcome, SyncError> {
        if transmission == Transmission::Enqueue {
            return Ok(match self.enqueue_charge_records(records)? {
                EnqueueResult::Enqueued { .. } => PushOutcome::Enqueued,
                EnqueueResult::NoOperation => PushOutcome::NoOperation,
                EnqueueResult::AdminDown(_) => PushOutcome::AdminDown,
            });
        }

        if let Some(result) = self.gate(Feature::ChargeRecords, Family::ChargeRecords)? {
            return Ok(match result {
                EnqueueResult::AdminDown(_) => PushOutcome::AdminDown,
                _ => PushOutcome::NoOperation,
            });
        }
        if records.is_empty() {
            return Ok(PushOutcome::NoOperation);
        }

        let timeout = self.inner.config.read().upload_timeout();
        let call = self.inner.uploader.push_charge_records(&records);
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(crate::error::UploadError::Timeout(limit))),
            None => call.await,
        };

        Ok(match result {
            Ok(outcome) if outcome.is_failure() => {
                warn!(items = records.len(), outcome = ?outcome, "Direct charge record send rejected");
                crate::metrics::record_upload_failure(Family::ChargeRecords, "direct", "rejected");
                outcome
            }
            Ok(outcome) => {
                debug!(items = records.len(), outcome = outcome.label(), "Charge records sent directly");
                outcome
            }
            Err(e) => {
                warn!(items = records.len(), error = %e, "Direct charge record send failed");
                crate::metrics::record_upload_failure(Family::ChargeRecords, "direct", e.kind());
                PushOutcome::Failure(e.causes().join(": "))
            }
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════════

    /// Shutdown and feature-flag checks shared by every enqueue call.
    fn gate(&self, feature: Feature, family: Family) -> Result<Option<EnqueueResult>, SyncError> {
        if matches!(self.state(), EngineState::ShuttingDown | EngineState::Stopped) {
            return Err(SyncError::ShutDown);
        }
        if self.is_disabled(feature) {
            debug!(%feature, "Feature administratively disabled, nothing queued");
            return Ok(Some(self.acknowledge(family, EnqueueResult::AdminDown(feature))));
        }
        Ok(None)
    }

    fn acknowledge(&self, family: Family, result: EnqueueResult) -> EnqueueResult {
        let items = match result {
            EnqueueResult::Enqueued { items } => items,
            _ => 0,
        };
        crate::metrics::record_enqueue(family, result.label(), items);
        result
    }

    /// Delayed status belongs to the data round, fast status to its own.
    fn arm_routed(&self, routed: Routed) {
        if routed.fast > 0 {
            self.arm(Family::FastStatus);
        }
        if routed.delayed > 0 {
            self.arm(Family::Data);
        }
    }
}
