//! Read-recording observers.
//!
//! # Responsibility
//! - Record which fields and state keys an observer read through its `View`.
//! - Queue the observer once when any recorded read changes.
//! - Keep per-field watcher counts so the computation engine can tell observed
//!   derivations from lazy ones.
//!
//! # Invariants
//! - A notified observer loses all recorded reads; it watches again only what
//!   its callback reads on the next run.
//! - An observer is pending at most once at a time.
//! - Dropping the `Observer` guard removes every trace of it.

use crate::error::StoreResult;
use crate::model::value::Value;
use crate::store::compute::{FieldRef, Frame};
use crate::store::record::Record;
use crate::store::Store;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::rc::Rc;

pub(crate) type ObserverId = u64;
pub(crate) type ObserverFn = Rc<dyn Fn(&View) -> StoreResult<()>>;

struct ObserverEntry {
    callback: ObserverFn,
    reads: HashSet<FieldRef>,
    pending: bool,
}

#[derive(Default)]
pub(crate) struct ObserverTable {
    next_id: ObserverId,
    entries: HashMap<ObserverId, ObserverEntry>,
    watchers: HashMap<FieldRef, HashSet<ObserverId>>,
    pending: VecDeque<ObserverId>,
}

impl ObserverTable {
    pub(crate) fn register(&mut self, callback: ObserverFn) -> ObserverId {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert(
            id,
            ObserverEntry {
                callback,
                reads: HashSet::new(),
                pending: false,
            },
        );
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) {
        if self.entries.contains_key(&id) {
            self.clear_reads(id);
            self.entries.remove(&id);
        }
        self.pending.retain(|candidate| *candidate != id);
    }

    pub(crate) fn subscribe(&mut self, id: ObserverId, field: FieldRef) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        if entry.reads.insert(field.clone()) {
            self.watchers.entry(field).or_default().insert(id);
        }
    }

    /// Queues every observer that recorded a read of `field`.
    pub(crate) fn notify(&mut self, field: &FieldRef) {
        let Some(ids) = self.watchers.get(field) else {
            return;
        };
        let mut ids: Vec<ObserverId> = ids.iter().copied().collect();
        ids.sort_unstable();
        for id in ids {
            self.clear_reads(id);
            if let Some(entry) = self.entries.get_mut(&id) {
                if !entry.pending {
                    entry.pending = true;
                    self.pending.push_back(id);
                }
            }
        }
    }

    pub(crate) fn is_watched(&self, field: &FieldRef) -> bool {
        self.watchers.get(field).is_some_and(|ids| !ids.is_empty())
    }

    pub(crate) fn is_subscribed(&self, id: ObserverId, field: &FieldRef) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| entry.reads.contains(field))
    }

    pub(crate) fn pop_pending(&mut self) -> Option<(ObserverId, ObserverFn)> {
        while let Some(id) = self.pending.pop_front() {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.pending = false;
                return Some((id, entry.callback.clone()));
            }
        }
        None
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear_reads(&mut self, id: ObserverId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        for field in entry.reads.drain() {
            if let Some(ids) = self.watchers.get_mut(&field) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.watchers.remove(&field);
                }
            }
        }
    }
}

/// Reading side of an observer. Reads made through it are recorded.
#[derive(Clone)]
pub struct View {
    store: Store,
    id: ObserverId,
}

impl View {
    pub(crate) fn new(store: Store, id: ObserverId) -> Self {
        Self { store, id }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs `f` with every store read inside it recorded for this observer.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.store.with_frame(Frame::Observer(self.id), f)
    }

    /// Records a read of `record.field` without returning it.
    pub fn track(&self, record: &Record, field: &str) -> StoreResult<()> {
        self.scope(|| record.read(field).map(|_| ()))
    }

    pub fn get(&self, record: &Record, field: &str) -> StoreResult<Value> {
        self.scope(|| record.get(field))
    }

    pub fn one(&self, record: &Record, field: &str) -> StoreResult<Option<Record>> {
        self.scope(|| record.one(field))
    }

    /// Reads a many-relation and returns its records in current order.
    pub fn records(&self, record: &Record, field: &str) -> StoreResult<Vec<Record>> {
        self.scope(|| record.many(field)?.records())
    }

    pub fn state(&self, key: &str) -> Value {
        self.scope(|| self.store.state(key))
    }

    /// Returns whether this observer currently watches `record.field`.
    pub fn is_subscribed(&self, record: &Record, field: &str) -> StoreResult<bool> {
        let index = record.field_index(field)?;
        Ok(self
            .store
            .core()
            .observers
            .is_subscribed(self.id, &FieldRef::Field(record.local_id(), index)))
    }
}

impl Debug for View {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View").field("id", &self.id).finish()
    }
}

/// Registration guard. Dropping it stops notifications.
#[derive(Debug)]
pub struct Observer {
    view: View,
}

impl Observer {
    pub(crate) fn new(view: View) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &View {
        &self.view
    }
}

impl Deref for Observer {
    type Target = View;

    fn deref(&self) -> &View {
        &self.view
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.view.store.unobserve(self.view.id);
    }
}
