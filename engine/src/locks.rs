//! Per-slot lock registry.
//!
//! Two lock tiers guard the engine: the global document mutex (owned by
//! [`crate::Engine`]) and one mutex per slot, created on first use and
//! retained until the slot's day is purged. Every code path that holds
//! multiple slot locks takes them in ascending key order, and no code path
//! acquires a slot lock while holding the global lock.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use common::keys::{DayKey, SlotKey};

#[derive(Default)]
pub struct LockRegistry {
    slots: DashMap<SlotKey, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: SlotKey) -> Arc<Mutex<()>> {
        self.slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock one slot.
    pub async fn acquire(&self, key: SlotKey) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    /// Lock a set of slots in canonical (ascending) key order.
    ///
    /// Duplicates are collapsed; locking the same mutex twice from one task
    /// would deadlock.
    pub async fn acquire_sorted(&self, keys: &BTreeSet<SlotKey>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.slot(*key).lock_owned().await);
        }
        guards
    }

    /// Drop the mutexes of every slot belonging to `day`. Called when the
    /// day reaches its terminal status.
    pub fn purge_day(&self, day: DayKey) {
        self.slots.retain(|key, _| key.day != day);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.len()
    }
}
