// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The entity queue store and its ordering policy.
//!
//! Entity additions, updates, removals, the property audit log and both
//! status planes live behind one short-held mutex. Status routing needs to
//! look at the to-add set, and the data round swaps the to-add set together
//! with the delayed status queues, so one lock keeps the two consistent:
//!
//! ```text
//! push_status(E, s):  E ∈ to_add ? delayed.push(s) : fast.push(s)
//! add(E):             to_add.insert(E); fast[E] → delayed
//! take_data():        swap(to_add, to_update, to_remove, audit, delayed) → DataSnapshot
//! take_fast_status(): swap(fast) → FastStatusSnapshot
//! ```
//!
//! While an entity sits in to-add, none of its status updates are in a
//! fast queue.
//!
//! No network work ever happens while the lock is held.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::model::{AdminUpdate, OperationalUpdate, PropertyChange, StatusUpdate, SyncEntity};

use super::pending::PendingSet;

/// Fast and delayed sub-queues of one status plane.
#[derive(Debug)]
struct StatusQueues<E, S> {
    fast: Vec<StatusUpdate<E, S>>,
    delayed: Vec<StatusUpdate<E, S>>,
    /// Pending additions whose entity data arrived after their latest
    /// delayed record on this plane
    refreshed: HashSet<E>,
}

impl<E, S> Default for StatusQueues<E, S> {
    fn default() -> Self {
        Self {
            fast: Vec::new(),
            delayed: Vec::new(),
            refreshed: HashSet::new(),
        }
    }
}

impl<E: SyncEntity, S> StatusQueues<E, S> {
    /// A status change for an entity still awaiting its first data upload
    /// is held back until the data round that carries the entity.
    fn route(&mut self, awaiting_upload: &PendingSet<E>, update: StatusUpdate<E, S>, routed: &mut Routed) {
        if awaiting_upload.contains(&update.entity) {
            self.refreshed.remove(&update.entity);
            self.delayed.push(update);
            routed.delayed += 1;
        } else {
            self.fast.push(update);
            routed.fast += 1;
        }
    }

    /// Move fast updates for `entity` to the delayed queue, keeping their
    /// order. Returns how many moved.
    fn hold_back(&mut self, entity: &E) -> usize {
        let (held, fast): (Vec<_>, Vec<_>) = std::mem::take(&mut self.fast)
            .into_iter()
            .partition(|update| &update.entity == entity);
        self.fast = fast;
        let moved = held.len();
        self.delayed.extend(held);
        moved
    }

    /// The entity's own data is now newer than any of its delayed records.
    fn refresh(&mut self, entity: &E) {
        self.refreshed.insert(entity.clone());
    }
}

#[derive(Debug)]
struct EntityQueues<E: SyncEntity> {
    to_add: PendingSet<E>,
    to_update: PendingSet<E>,
    to_remove: PendingSet<E>,
    property_changes: HashMap<E, Vec<PropertyChange>>,
    status: StatusQueues<E, E::Status>,
    admin_status: StatusQueues<E, E::AdminStatus>,
}

impl<E: SyncEntity> Default for EntityQueues<E> {
    fn default() -> Self {
        Self {
            to_add: PendingSet::new(),
            to_update: PendingSet::new(),
            to_remove: PendingSet::new(),
            property_changes: HashMap::new(),
            status: StatusQueues::default(),
            admin_status: StatusQueues::default(),
        }
    }
}

/// Result of [`QueueStore::add`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Added {
    /// False when the entity was already waiting to be added
    pub fresh: bool,
    /// Fast status updates moved to the delayed queues
    pub held_back: usize,
}

/// Where a batch of status updates ended up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Routed {
    pub fast: usize,
    pub delayed: usize,
}

impl Routed {
    #[must_use]
    pub fn total(&self) -> usize {
        self.fast + self.delayed
    }
}

/// Queue depths, for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub to_add: usize,
    pub to_update: usize,
    pub to_remove: usize,
    /// Entities with at least one audited property change
    pub audited_entities: usize,
    pub fast_status: usize,
    pub delayed_status: usize,
    pub fast_admin_status: usize,
    pub delayed_admin_status: usize,
    pub charge_records: usize,
}

impl QueueStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.to_add
            + self.to_update
            + self.to_remove
            + self.fast_status
            + self.delayed_status
            + self.fast_admin_status
            + self.delayed_admin_status
            + self.charge_records
    }
}

/// Private copy of everything a data round works on.
#[derive(Debug)]
pub struct DataSnapshot<E: SyncEntity> {
    pub added: PendingSet<E>,
    pub updated: Vec<E>,
    pub removed: Vec<E>,
    pub property_changes: HashMap<E, Vec<PropertyChange>>,
    pub delayed_status: Vec<OperationalUpdate<E>>,
    pub delayed_admin_status: Vec<AdminUpdate<E>>,
    /// Added entities whose data is newer than their latest delayed
    /// operational status record
    pub status_refreshed: HashSet<E>,
    /// Same, for the administrative plane
    pub admin_status_refreshed: HashSet<E>,
}

impl<E: SyncEntity> DataSnapshot<E> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.delayed_status.is_empty()
            && self.delayed_admin_status.is_empty()
    }

    /// Status batch for this round: one assertion per delayed entity.
    ///
    /// Entities that are part of this round's additions are asserted with
    /// their latest known status (old == new). That is the newest delayed
    /// record, unless the entity's data was enqueued after it and reports a
    /// status of its own. The delayed history itself is not replayed.
    #[must_use]
    pub fn effective_status(&self) -> Vec<OperationalUpdate<E>> {
        synthesize(&self.delayed_status, &self.added, &self.status_refreshed, E::status)
    }

    #[must_use]
    pub fn effective_admin_status(&self) -> Vec<AdminUpdate<E>> {
        synthesize(
            &self.delayed_admin_status,
            &self.added,
            &self.admin_status_refreshed,
            E::admin_status,
        )
    }

    #[must_use]
    pub fn property_change_count(&self) -> usize {
        self.property_changes.values().map(Vec::len).sum()
    }
}

fn synthesize<E, S>(
    delayed: &[StatusUpdate<E, S>],
    added: &PendingSet<E>,
    refreshed: &HashSet<E>,
    current: impl Fn(&E) -> Option<S>,
) -> Vec<StatusUpdate<E, S>>
where
    E: SyncEntity,
    S: Clone,
{
    let mut order: Vec<&E> = Vec::new();
    let mut latest: HashMap<&E, &StatusUpdate<E, S>> = HashMap::new();
    for update in delayed {
        if latest.insert(&update.entity, update).is_none() {
            order.push(&update.entity);
        }
    }

    order
        .into_iter()
        .filter_map(|entity| latest.get(entity).copied())
        .map(|last| {
            if let Some(entity) = added.get(&last.entity) {
                let status = refreshed
                    .contains(entity)
                    .then(|| current(entity))
                    .flatten()
                    .unwrap_or_else(|| last.new_status.clone());
                StatusUpdate {
                    entity: entity.clone(),
                    old_status: status.clone(),
                    new_status: status,
                    timestamp: last.timestamp,
                }
            } else {
                last.clone()
            }
        })
        .collect()
}

/// Private copy of the fast status queues.
#[derive(Debug)]
pub struct FastStatusSnapshot<E: SyncEntity> {
    pub admin_status: Vec<AdminUpdate<E>>,
    pub status: Vec<OperationalUpdate<E>>,
}

impl<E: SyncEntity> FastStatusSnapshot<E> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.admin_status.is_empty() && self.status.is_empty()
    }
}

/// Lock-guarded pending entity work.
#[derive(Debug)]
pub struct QueueStore<E: SyncEntity> {
    queues: Mutex<EntityQueues<E>>,
}

impl<E: SyncEntity> QueueStore<E> {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(EntityQueues::default()),
        }
    }

    /// Returns false if the entity was already waiting to be added; its
    /// stored data is replaced either way.
    ///
    /// Status updates already sitting in a fast queue for this entity are
    /// moved to the delayed queues, so they cannot reach the backend before
    /// the entity does.
    pub fn add(&self, entity: E) -> Added {
        let mut queues = self.queues.lock();
        let EntityQueues { to_add, status, admin_status, .. } = &mut *queues;

        let fresh = to_add.insert(entity.clone());
        let held_back = if fresh {
            status.hold_back(&entity) + admin_status.hold_back(&entity)
        } else {
            0
        };
        status.refresh(&entity);
        admin_status.refresh(&entity);
        Added { fresh, held_back }
    }

    /// Queue a data update. An entity still waiting to be added also gets
    /// its pending addition refreshed with this data.
    pub fn update(&self, entity: E, change: Option<PropertyChange>) -> bool {
        let mut queues = self.queues.lock();
        if let Some(change) = change {
            queues.property_changes.entry(entity.clone()).or_default().push(change);
        }
        let EntityQueues { to_add, to_update, status, admin_status, .. } = &mut *queues;
        if to_add.contains(&entity) {
            to_add.insert(entity.clone());
            status.refresh(&entity);
            admin_status.refresh(&entity);
        }
        to_update.insert(entity)
    }

    pub fn remove(&self, entity: E) -> bool {
        self.queues.lock().to_remove.insert(entity)
    }

    pub fn push_status(&self, updates: Vec<OperationalUpdate<E>>) -> Routed {
        let mut routed = Routed::default();
        let mut queues = self.queues.lock();
        let EntityQueues { to_add, status, .. } = &mut *queues;
        for update in updates {
            status.route(to_add, update, &mut routed);
        }
        routed
    }

    pub fn push_admin_status(&self, updates: Vec<AdminUpdate<E>>) -> Routed {
        let mut routed = Routed::default();
        let mut queues = self.queues.lock();
        let EntityQueues { to_add, admin_status, .. } = &mut *queues;
        for update in updates {
            admin_status.route(to_add, update, &mut routed);
        }
        routed
    }

    #[must_use]
    pub fn has_data_work(&self) -> bool {
        let queues = self.queues.lock();
        !queues.to_add.is_empty()
            || !queues.to_update.is_empty()
            || !queues.to_remove.is_empty()
            || !queues.status.delayed.is_empty()
            || !queues.admin_status.delayed.is_empty()
    }

    #[must_use]
    pub fn has_fast_status_work(&self) -> bool {
        let queues = self.queues.lock();
        !queues.status.fast.is_empty() || !queues.admin_status.fast.is_empty()
    }

    /// Swap everything the data round consumes for empty containers.
    pub fn take_data(&self) -> DataSnapshot<E> {
        let mut queues = self.queues.lock();
        DataSnapshot {
            added: queues.to_add.take(),
            updated: queues.to_update.take().into_vec(),
            removed: queues.to_remove.take().into_vec(),
            property_changes: std::mem::take(&mut queues.property_changes),
            delayed_status: std::mem::take(&mut queues.status.delayed),
            delayed_admin_status: std::mem::take(&mut queues.admin_status.delayed),
            status_refreshed: std::mem::take(&mut queues.status.refreshed),
            admin_status_refreshed: std::mem::take(&mut queues.admin_status.refreshed),
        }
    }

    pub fn take_fast_status(&self) -> FastStatusSnapshot<E> {
        let mut queues = self.queues.lock();
        FastStatusSnapshot {
            admin_status: std::mem::take(&mut queues.admin_status.fast),
            status: std::mem::take(&mut queues.status.fast),
        }
    }

    /// Queue depths. `charge_records` is left at zero; the CDR queue lives
    /// outside this store.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let queues = self.queues.lock();
        QueueStats {
            to_add: queues.to_add.len(),
            to_update: queues.to_update.len(),
            to_remove: queues.to_remove.len(),
            audited_entities: queues.property_changes.len(),
            fast_status: queues.status.fast.len(),
            delayed_status: queues.status.delayed.len(),
            fast_admin_status: queues.admin_status.fast.len(),
            delayed_admin_status: queues.admin_status.delayed.len(),
            charge_records: 0,
        }
    }
}

impl<E: SyncEntity> Default for QueueStore<E> {
    fn default() -> Self {
        Self::new()
    }
}
