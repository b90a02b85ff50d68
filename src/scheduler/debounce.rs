// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Coalescing debounce timer.
//!
//! State machine: `Idle → Armed → Idle`. [`Debouncer::arm`] (re)sets the
//! deadline to `now + quiet` and wakes the waiter, so a family under
//! continuous load fires only once it has been quiet for the whole window.
//! This is not a fixed-rate timer.
//!
//! One long-lived task per family awaits [`Debouncer::fired`]:
//!
//! ```text
//!   arm ──► deadline = now + quiet ──► notify
//!                                        │
//!   fired(): sleep_until(deadline) ◄─────┘ (woken early: re-read deadline)
//!            deadline passed? → disarm, return
//! ```

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Single-shot, re-armable deadline.
#[derive(Debug, Default)]
pub struct Debouncer {
    deadline: Mutex<Option<Instant>>,
    wake: Notify,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the deadline to `now + quiet`. Works from Idle and Armed alike.
    pub fn arm(&self, quiet: Duration) {
        *self.deadline.lock() = Some(Instant::now() + quiet);
        self.wake.notify_one();
    }

    pub fn disarm(&self) {
        *self.deadline.lock() = None;
        self.wake.notify_one();
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.lock().is_some()
    }

    /// Resolves once the current deadline passes without being pushed back,
    /// leaving the debouncer Idle. Cancel safe.
    pub async fn fired(&self) {
        loop {
            let deadline = *self.deadline.lock();
            match deadline {
                None => self.wake.notified().await,
                Some(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => {
                            let mut slot = self.deadline.lock();
                            if matches!(*slot, Some(current) if current <= Instant::now()) {
                                *slot = None;
                                return;
                            }
                        }
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }
    }
}
