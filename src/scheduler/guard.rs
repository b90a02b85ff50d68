// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-family execution guard.
//!
//! A single-permit semaphore used with `try_acquire`: a tick that finds the
//! guard held is dropped, never queued. The permit is released when the
//! [`FlushPermit`] drops, whatever way the round ends.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct FlushGuard {
    permits: Arc<Semaphore>,
}

/// Proof that the holder runs the family's only round.
#[derive(Debug)]
pub struct FlushPermit {
    _permit: OwnedSemaphorePermit,
}

impl FlushGuard {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Non-blocking acquire. `None` means a round is in flight.
    #[must_use]
    pub fn try_enter(&self) -> Option<FlushPermit> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| FlushPermit { _permit: permit })
    }

    /// Wait for the in-flight round (if any) to finish, then hold the guard.
    pub async fn enter(&self) -> Option<FlushPermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .ok()
            .map(|permit| FlushPermit { _permit: permit })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }
}

impl Default for FlushGuard {
    fn default() -> Self {
        Self::new()
    }
}
