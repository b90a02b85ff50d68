// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Flush rounds.
//!
//! A round holds the family's guard for its whole duration, swaps the
//! family's queues for empty ones and hands the snapshot to the uploader.
//! Once swapped out, a batch is never re-queued: a failed step is logged,
//! reported as [`SyncEvent::RoundFailed`] and ends the round.

use std::future::Future;
use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::events::SyncEvent;
use crate::metrics::{self, LatencyTimer};
use crate::model::{now_millis, Family};
use crate::scheduler::FlushPermit;
use crate::uploader::{EntityOperation, PushOutcome, Uploader};

use super::{FlushOutcome, RoundReport, SyncEngine};

impl<U: Uploader> SyncEngine<U> {
    /// Run one round of `family` right away.
    ///
    /// Goes through the same guard as the timer, so it returns
    /// [`FlushOutcome::Busy`] instead of waiting when a round is in flight.
    pub async fn flush_now(&self, family: Family) -> FlushOutcome {
        let Some(permit) = self.slot(family).guard.try_enter() else {
            debug!(%family, "Manual flush skipped, round in flight");
            return FlushOutcome::Busy;
        };
        self.slot(family).debouncer.disarm();
        self.run_round(family, permit).await
    }

    /// Debounce deadline reached. Never waits for the guard.
    pub(crate) fn on_tick(&self, family: Family) {
        match self.slot(family).guard.try_enter() {
            Some(permit) => {
                let engine = self.clone();
                tokio::spawn(async move {
                    engine.run_round(family, permit).await;
                });
            }
            None => {
                debug!(%family, "Tick skipped, previous round still running");
                metrics::record_tick_skipped(family);
                self.inner.events.emit(SyncEvent::TickSkipped { family });
            }
        }
    }

    fn has_work(&self, family: Family) -> bool {
        match family {
            Family::Data => self.inner.store.has_data_work(),
            Family::FastStatus => self.inner.store.has_fast_status_work(),
            Family::ChargeRecords => !self.inner.records.lock().is_empty(),
        }
    }

    /// Execute a round while holding `permit`. The permit is released when
    /// this returns, including on the idle path.
    pub(crate) async fn run_round(&self, family: Family, permit: FlushPermit) -> FlushOutcome {
        let _permit = permit;
        if !self.has_work(family) {
            debug!(%family, "Nothing to flush");
            return FlushOutcome::Idle;
        }

        let slot = self.slot(family);
        let run = slot.runs.load(Ordering::Acquire);
        let interval = self.inner.config.read().flush_interval(family);
        let started_at = now_millis();
        let started = tokio::time::Instant::now();

        self.inner.events.emit(SyncEvent::RoundStarted {
            family,
            run,
            started_at,
            interval,
        });

        let mut report = match family {
            Family::Data => self.flush_data(run).await,
            Family::FastStatus => self.flush_fast_status(run).await,
            Family::ChargeRecords => self.flush_charge_records(run).await,
        };
        report.run = run;
        report.elapsed = started.elapsed();

        slot.runs.fetch_add(1, Ordering::AcqRel);
        self.inner.events.emit(SyncEvent::RoundFinished {
            family,
            run,
            started_at,
            finished_at: now_millis(),
            elapsed: report.elapsed,
            interval,
            failed: report.failed,
        });
        metrics::record_round(family, report.failed, report.elapsed);
        metrics::set_queue_depths(&self.pending());

        info!(
            %family,
            run,
            items = report.items(),
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Flush round finished"
        );
        FlushOutcome::Completed(report)
    }

    /// Data round: additions, updates, admin status, status, removals.
    #[tracing::instrument(skip(self), fields(family = "data"))]
    async fn flush_data(&self, run: u64) -> RoundReport {
        let snapshot = self.inner.store.take_data();
        let admin_status = snapshot.effective_admin_status();
        let status = snapshot.effective_status();

        let mut report = RoundReport {
            audited_entities: snapshot.property_changes.len(),
            property_changes: snapshot.property_change_count(),
            ..Default::default()
        };
        for (entity, changes) in &snapshot.property_changes {
            for change in changes {
                debug!(
                    entity = ?entity,
                    property = %change.property,
                    old = %change.old_value,
                    new = %change.new_value,
                    "Property changed"
                );
            }
        }

        let added = snapshot.added.into_vec();
        let uploader = &self.inner.uploader;
        let family = Family::Data;

        if !added.is_empty() {
            if !self
                .upload(family, run, "add", added.len(), uploader.push_entities(EntityOperation::Add, &added))
                .await
            {
                report.failed = true;
                return report;
            }
            report.added = added.len();
        }

        if !snapshot.updated.is_empty() {
            let updated = &snapshot.updated;
            if !self
                .upload(family, run, "update", updated.len(), uploader.push_entities(EntityOperation::Update, updated))
                .await
            {
                report.failed = true;
                return report;
            }
            report.updated = updated.len();
        }

        if !admin_status.is_empty() {
            if !self
                .upload(family, run, "admin_status", admin_status.len(), uploader.push_admin_status(&admin_status))
                .await
            {
                report.failed = true;
                return report;
            }
            report.admin_status = admin_status.len();
        }

        if !status.is_empty() {
            if !self
                .upload(family, run, "status", status.len(), uploader.push_status(&status))
                .await
            {
                report.failed = true;
                return report;
            }
            report.status = status.len();
        }

        if !snapshot.removed.is_empty() {
            let removed = &snapshot.removed;
            if !self
                .upload(family, run, "remove", removed.len(), uploader.push_entities(EntityOperation::Remove, removed))
                .await
            {
                report.failed = true;
                return report;
            }
            report.removed = removed.len();
        }

        report
    }

    #[tracing::instrument(skip(self), fields(family = "fast_status"))]
    async fn flush_fast_status(&self, run: u64) -> RoundReport {
        let snapshot = self.inner.store.take_fast_status();
        let uploader = &self.inner.uploader;
        let family = Family::FastStatus;
        let mut report = RoundReport::default();

        if !snapshot.admin_status.is_empty() {
            let updates = &snapshot.admin_status;
            if !self
                .upload(family, run, "admin_status", updates.len(), uploader.push_admin_status(updates))
                .await
            {
                report.failed = true;
                return report;
            }
            report.admin_status = updates.len();
        }

        if !snapshot.status.is_empty() {
            let updates = &snapshot.status;
            if !self
                .upload(family, run, "status", updates.len(), uploader.push_status(updates))
                .await
            {
                report.failed = true;
                return report;
            }
            report.status = updates.len();
        }

        report
    }

    #[tracing::instrument(skip(self), fields(family = "charge_records"))]
    async fn flush_charge_records(&self, run: u64) -> RoundReport {
        let (records, waited) = {
            let mut pending = self.inner.records.lock();
            let waited = pending.age();
            (pending.take(), waited)
        };
        debug!(items = records.len(), waited_ms = waited.as_millis() as u64, "Charge records swapped out");

        let mut report = RoundReport::default();
        if records.is_empty() {
            return report;
        }
        let ok = self
            .upload(
                Family::ChargeRecords,
                run,
                "charge_records",
                records.len(),
                self.inner.uploader.push_charge_records(&records),
            )
            .await;
        if ok {
            report.charge_records = records.len();
        } else {
            report.failed = true;
        }
        report
    }

    /// Await one uploader call under the configured timeout. Returns false
    /// if the step failed; the failure has already been logged and emitted.
    async fn upload<F>(&self, family: Family, run: u64, step: &'static str, items: usize, call: F) -> bool
    where
        F: Future<Output = Result<PushOutcome, UploadError>>,
    {
        metrics::record_batch_size(family, step, items);
        let timeout = self.inner.config.read().upload_timeout();

        let result = {
            let _timer = LatencyTimer::new(family, step);
            match timeout {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .unwrap_or(Err(UploadError::Timeout(limit))),
                None => call.await,
            }
        };

        let error = match result {
            Ok(PushOutcome::Failure(reason)) => UploadError::Rejected(reason),
            Ok(outcome) => {
                debug!(%family, run, step, items, outcome = outcome.label(), "Upload step done");
                return true;
            }
            Err(e) => e,
        };

        warn!(
            %family,
            run,
            step,
            items,
            error = %error,
            root_cause = %error.root_cause(),
            "Upload failed, batch dropped"
        );
        metrics::record_upload_failure(family, step, error.kind());
        self.inner.events.emit(SyncEvent::RoundFailed {
            family,
            run,
            step,
            causes: error.causes(),
        });
        false
    }
}
