// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory pending work.
//!
//! Everything here is drained by swapping with an empty container at the
//! start of a flush round, so a failed upload never re-queues its batch.

pub mod pending;
pub mod store;

pub use pending::{PendingBatch, PendingSet};
pub use store::{Added, DataSnapshot, FastStatusSnapshot, QueueStats, QueueStore, Routed};
