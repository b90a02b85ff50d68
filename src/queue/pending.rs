// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pending collections that are drained by swapping with an empty one.
//!
//! [`PendingSet`] keeps first-insertion order but holds every entity once;
//! re-inserting an equal entity replaces the stored value in place.
//! [`PendingBatch`] is a flat append-only list with an age, used for charge
//! detail records which have no ordering dependency on anything else.
//!
//! # Example
//!
//! ```
//! use roaming_sync::queue::PendingSet;
//!
//! let mut set = PendingSet::new();
//! assert!(set.insert("EVSE-1"));
//! assert!(!set.insert("EVSE-1"));
//! assert!(set.insert("EVSE-2"));
//!
//! let drained = set.take();
//! assert_eq!(drained.into_vec(), vec!["EVSE-1", "EVSE-2"]);
//! assert!(set.is_empty());
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Insertion-ordered set with swap-out draining.
#[derive(Debug, Clone)]
pub struct PendingSet<T> {
    order: Vec<T>,
    /// Position of each member in `order`
    index: HashMap<T, usize>,
}

impl<T: Clone + Eq + Hash> PendingSet<T> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns false if the item was already pending. In that case the
    /// stored value is replaced by `item` and keeps its position.
    pub fn insert(&mut self, item: T) -> bool {
        if let Some(&at) = self.index.get(&item) {
            self.order[at] = item;
            return false;
        }
        self.index.insert(item.clone(), self.order.len());
        self.order.push(item);
        true
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.index.contains_key(item)
    }

    /// The latest stored value equal to `item`.
    #[must_use]
    pub fn get(&self, item: &T) -> Option<&T> {
        self.index.get(item).map(|&at| &self.order[at])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.order.iter()
    }

    /// Swap the contents for an empty set and return the old contents.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.order
    }
}

impl<T: Clone + Eq + Hash> Default for PendingSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Flat list of pending items.
#[derive(Debug)]
pub struct PendingBatch<T> {
    items: Vec<T>,
    oldest: Option<Instant>,
}

impl<T> PendingBatch<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            oldest: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// How long the oldest pending item has been waiting.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.oldest.map(|t| t.elapsed()).unwrap_or_default()
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        let before = self.items.len();
        self.items.extend(items);
        if self.oldest.is_none() && self.items.len() > before {
            self.oldest = Some(Instant::now());
        }
    }

    pub fn take(&mut self) -> Vec<T> {
        self.oldest = None;
        std::mem::take(&mut self.items)
    }
}

impl<T> Default for PendingBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}
