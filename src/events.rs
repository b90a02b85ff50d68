// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lifecycle notifications.
//!
//! Observers subscribe through [`crate::SyncEngine::subscribe`]. Nobody has
//! to listen: with no receivers, events are simply dropped. Slow receivers
//! lag and lose the oldest events rather than block a flush round.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::trace;

use crate::model::Family;

/// Something that happened to a flush round.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    RoundStarted {
        family: Family,
        run: u64,
        /// Epoch millis
        started_at: i64,
        interval: Duration,
    },
    RoundFinished {
        family: Family,
        run: u64,
        started_at: i64,
        finished_at: i64,
        elapsed: Duration,
        interval: Duration,
        /// Whether an upload step failed during the round
        failed: bool,
    },
    /// An uploader call failed; `causes` is the flattened error chain,
    /// outermost first.
    RoundFailed {
        family: Family,
        run: u64,
        step: &'static str,
        causes: Vec<String>,
    },
    /// A timer fired while the family's previous round was still running.
    TickSkipped { family: Family },
}

impl SyncEvent {
    #[must_use]
    pub fn family(&self) -> Family {
        match self {
            Self::RoundStarted { family, .. }
            | Self::RoundFinished { family, .. }
            | Self::RoundFailed { family, .. }
            | Self::TickSkipped { family } => *family,
        }
    }
}

/// Fan-out of [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: SyncEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}
