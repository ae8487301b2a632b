// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared epic store.
//!
//! An observable map of epic id → [`EpicRecord`] plus a bounded activity
//! feed. Readers get owned snapshots; only the dispatcher writes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use armada_core::EpicRecord;
use serde_json::Value;

use crate::sync::{Bus, Subscription};

const CHANGE_CHANNEL: &str = "change";

/// What changed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// An epic was created or replaced.
    Epic(String),
    /// A new activity entry was recorded.
    Activity,
}

struct Contents {
    epics: HashMap<String, EpicRecord>,
    activity: VecDeque<Value>,
}

struct Inner {
    contents: RwLock<Contents>,
    activity_capacity: usize,
    changes: Bus<StoreChange>,
}

/// Handle to the store. Clones share the same data.
#[derive(Clone)]
pub struct EpicStore {
    inner: Arc<Inner>,
}

impl EpicStore {
    pub fn new(activity_capacity: usize) -> Self {
        EpicStore {
            inner: Arc::new(Inner {
                contents: RwLock::new(Contents {
                    epics: HashMap::new(),
                    activity: VecDeque::new(),
                }),
                activity_capacity,
                changes: Bus::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Contents> {
        self.inner.contents.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Contents> {
        self.inner.contents.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_epic(&self, id: &str) -> Option<EpicRecord> {
        self.read().epics.get(id).cloned()
    }

    /// All epics, ordered by id.
    pub fn all_epics(&self) -> Vec<EpicRecord> {
        let mut epics: Vec<EpicRecord> = self.read().epics.values().cloned().collect();
        epics.sort_by(|a, b| a.id.cmp(&b.id));
        epics
    }

    pub fn len(&self) -> usize {
        self.read().epics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Activity entries, newest first.
    pub fn recent_activity(&self) -> Vec<Value> {
        self.read().activity.iter().cloned().collect()
    }

    /// Registers a listener called after every change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        self.inner.changes.subscribe(CHANGE_CHANNEL, listener)
    }

    /// Inserts or replaces a record.
    pub(crate) fn put(&self, record: EpicRecord) {
        let id = record.id.clone();
        self.write().epics.insert(id.clone(), record);
        self.inner
            .changes
            .publish(CHANGE_CHANNEL, &StoreChange::Epic(id));
    }

    /// Records an activity entry, evicting the oldest past capacity.
    pub(crate) fn push_activity(&self, entry: Value) {
        {
            let mut contents = self.write();
            contents.activity.push_front(entry);
            contents.activity.truncate(self.inner.activity_capacity);
        }
        self.inner
            .changes
            .publish(CHANGE_CHANNEL, &StoreChange::Activity);
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
