//! Public types for the sync engine coordinator.

use std::time::Duration;

/// Engine lifecycle state.
///
/// Use [`super::SyncEngine::state()`] to check the current state or
/// [`super::SyncEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created; enqueues are accepted but nothing flushes yet
    Created,
    /// Family loops are running
    Running,
    /// Loops stopped, final rounds in progress
    ShuttingDown,
    /// Shut down; enqueues are refused
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// What one flush round pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub run: u64,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub admin_status: usize,
    pub status: usize,
    pub charge_records: usize,
    /// Entities with audited property changes in this round
    pub audited_entities: usize,
    pub property_changes: usize,
    /// The round stopped at a failed upload step
    pub failed: bool,
    pub elapsed: Duration,
}

impl RoundReport {
    #[must_use]
    pub fn items(&self) -> usize {
        self.added + self.updated + self.removed + self.admin_status + self.status + self.charge_records
    }
}

/// Result of asking for a flush round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A round ran (successfully or not, see [`RoundReport::failed`])
    Completed(RoundReport),
    /// The family's previous round is still in flight; nothing was done
    Busy,
    /// All of the family's queues were empty
    Idle,
}

impl FlushOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&RoundReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// How [`super::SyncEngine::send_charge_records`] delivers records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transmission {
    /// Queue and let the charge record family flush them
    #[default]
    Enqueue,
    /// Push right away, bypassing the queue
    Direct,
}
