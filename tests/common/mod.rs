//! Shared fixtures for the engine tests.
//!
//! [`RecordingUploader`] records every call with the (paused) tokio clock,
//! and can be told to block or fail specific steps.

#![allow(dead_code)]

use std::hash::{Hash, Hasher};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;

use roaming_sync::{
    AdminUpdate, EntityOperation, OperationalUpdate, PushOutcome, StatusUpdate, SyncEngine,
    SyncEngineConfig, SyncEntity, UploadError, Uploader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Available,
    Charging,
    OutOfOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admin {
    Operative,
    Inoperative,
}

/// An EVSE identified by its id. The status fields are its current state
/// and do not take part in identity.
#[derive(Debug, Clone)]
pub struct Evse {
    pub id: String,
    pub status: Option<Status>,
    pub admin: Option<Admin>,
}

impl Evse {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string(), status: None, admin: None }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }
}

impl PartialEq for Evse {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Evse {}

impl Hash for Evse {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl SyncEntity for Evse {
    type Status = Status;
    type AdminStatus = Admin;

    fn status(&self) -> Option<Status> {
        self.status
    }

    fn admin_status(&self) -> Option<Admin> {
        self.admin
    }
}

pub fn status(id: &str, old: Status, new: Status) -> OperationalUpdate<Evse> {
    StatusUpdate::new(Evse::new(id), old, new)
}

pub fn admin(id: &str, old: Admin, new: Admin) -> AdminUpdate<Evse> {
    StatusUpdate::new(Evse::new(id), old, new)
}

/// One uploader invocation, reduced to ids and statuses.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Entities(EntityOperation, Vec<String>),
    Status(Vec<(String, Status, Status)>),
    AdminStatus(Vec<(String, Admin, Admin)>),
    ChargeRecords(Vec<u32>),
}

impl Call {
    pub fn step(&self) -> &'static str {
        match self {
            Call::Entities(op, _) => op.as_str(),
            Call::Status(_) => "status",
            Call::AdminStatus(_) => "admin_status",
            Call::ChargeRecords(_) => "charge_records",
        }
    }
}

#[derive(Default)]
pub struct RecordingUploader {
    calls: Mutex<Vec<(Instant, Call)>>,
    /// Optional step filter plus the semaphore blocked calls wait on
    gate: Mutex<Option<(Option<&'static str>, Arc<Semaphore>)>>,
    failing: Mutex<Vec<&'static str>>,
    rejecting: Mutex<Vec<&'static str>>,
}

impl RecordingUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following call wait for a permit on the returned
    /// semaphore. The call is recorded before it blocks.
    pub fn block(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some((None, Arc::clone(&gate)));
        gate
    }

    /// Like [`block`](Self::block), for one step only.
    pub fn block_step(&self, step: &'static str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some((Some(step), Arc::clone(&gate)));
        gate
    }

    pub fn unblock(&self) {
        if let Some((_, gate)) = self.gate.lock().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Calls for `step` fail with a transport error wrapping an io error.
    pub fn fail_step(&self, step: &'static str) {
        self.failing.lock().push(step);
    }

    /// Calls for `step` return `PushOutcome::Failure`.
    pub fn reject_step(&self, step: &'static str) {
        self.rejecting.lock().push(step);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
        self.rejecting.lock().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn steps(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(|(_, call)| call.step()).collect()
    }

    async fn record(&self, call: Call, accepted: usize) -> Result<PushOutcome, UploadError> {
        let step = call.step();
        self.calls.lock().push((Instant::now(), call));

        let gate = match &*self.gate.lock() {
            Some((filter, gate)) if filter.map_or(true, |only| only == step) => Some(Arc::clone(gate)),
            _ => None,
        };
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if self.failing.lock().contains(&step) {
            return Err(UploadError::transport_with(
                "connection to partner lost",
                io::Error::new(io::ErrorKind::ConnectionReset, "peer reset the connection"),
            ));
        }
        if self.rejecting.lock().contains(&step) {
            return Ok(PushOutcome::Failure("HTTP 400: unknown location".to_string()));
        }
        Ok(PushOutcome::Success { accepted })
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    type Entity = Evse;
    type ChargeRecord = u32;

    async fn push_entities(
        &self,
        operation: EntityOperation,
        entities: &[Evse],
    ) -> Result<PushOutcome, UploadError> {
        let ids = entities.iter().map(|e| e.id.clone()).collect();
        self.record(Call::Entities(operation, ids), entities.len()).await
    }

    async fn push_status(&self, updates: &[OperationalUpdate<Evse>]) -> Result<PushOutcome, UploadError> {
        let rows = updates
            .iter()
            .map(|u| (u.entity.id.clone(), u.old_status, u.new_status))
            .collect();
        self.record(Call::Status(rows), updates.len()).await
    }

    async fn push_admin_status(&self, updates: &[AdminUpdate<Evse>]) -> Result<PushOutcome, UploadError> {
        let rows = updates
            .iter()
            .map(|u| (u.entity.id.clone(), u.old_status, u.new_status))
            .collect();
        self.record(Call::AdminStatus(rows), updates.len()).await
    }

    async fn push_charge_records(&self, records: &[u32]) -> Result<PushOutcome, UploadError> {
        self.record(Call::ChargeRecords(records.to_vec()), records.len()).await
    }
}

/// 50ms data, 20ms fast status, 30ms CDR quiet periods.
pub fn fast_config() -> SyncEngineConfig {
    SyncEngineConfig {
        data_flush_ms: 50,
        fast_status_flush_ms: 20,
        cdr_flush_ms: 30,
        upload_timeout_ms: 1_000,
        ..Default::default()
    }
}

pub struct Harness {
    pub engine: SyncEngine<RecordingUploader>,
    pub uploader: Arc<RecordingUploader>,
    pub config_tx: watch::Sender<SyncEngineConfig>,
}

pub async fn started(config: SyncEngineConfig) -> Harness {
    let uploader = RecordingUploader::new();
    let (config_tx, rx) = watch::channel(config.clone());
    let engine = SyncEngine::new(config, rx, Arc::clone(&uploader)).expect("valid config");
    engine.start().await.expect("engine starts");
    Harness { engine, uploader, config_tx }
}

pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
