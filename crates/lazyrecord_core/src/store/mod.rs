//! Reactive record store.
//!
//! # Responsibility
//! - Own records, relation edges, the dependency graph and observers for one
//!   session.
//! - Run every public mutation inside a batch and drain deferred work
//!   (recomputations, re-sorts, hooks, finalization, notifications) when the
//!   outermost batch ends.
//!
//! # Invariants
//! - Data is consistent whenever a public call returns.
//! - No `RefCell` borrow of store state is held while caller code runs
//!   (compute functions, comparators, hooks, observer callbacks).
//! - A failed batch keeps applied data; queued hooks of that batch are
//!   dropped.
//!
//! # See also
//! - `relation` for the write path, `compute` for dependency tracking.

pub(crate) mod compute;
pub mod input;
pub mod list;
pub mod observe;
pub mod record;
pub mod registry;
pub(crate) mod relation;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::field::FieldKind;
use crate::model::schema::{ResolvedSchema, Schema};
use crate::model::value::Value;
use compute::{DepGraph, FieldRef, Frame, NodeKey};
use input::{Input, InsertOptions};
use log::{debug, error, info, warn};
use observe::{Observer, ObserverId, ObserverTable, View};
use record::Record;
use registry::{FieldValue, LocalId, RecordRef, Registry};
use relation::LinkEvent;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Handle to one store. Cloning shares the same store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

struct StoreInner {
    schema: ResolvedSchema,
    config: StoreConfig,
    state: RefCell<StoreState>,
    /// Observers dropped while the state was borrowed, removed on next sweep.
    dropped_observers: RefCell<Vec<ObserverId>>,
}

pub(crate) struct StoreState {
    pub(crate) registry: Registry,
    pub(crate) graph: DepGraph,
    pub(crate) queues: Queues,
    pub(crate) observers: ObserverTable,
    bag: BTreeMap<String, Value>,
    pub(crate) frames: Vec<Frame>,
    batch_depth: usize,
}

/// Deferred work, drained in field order at the end of the outermost batch.
#[derive(Default)]
pub(crate) struct Queues {
    pub(crate) computes: VecDeque<NodeKey>,
    pub(crate) sorts: VecDeque<NodeKey>,
    pub(crate) links: VecDeque<LinkEvent>,
    updates: VecDeque<(RecordRef, usize)>,
    queued_updates: HashSet<(RecordRef, usize)>,
    pub(crate) finalize: VecDeque<LocalId>,
}

impl Queues {
    /// Queues an update hook once per field until it runs.
    pub(crate) fn queue_update(&mut self, record: RecordRef, field: usize) {
        if self.queued_updates.insert((record, field)) {
            self.updates.push_back((record, field));
        }
    }

    fn pop_update(&mut self) -> Option<(RecordRef, usize)> {
        let next = self.updates.pop_front()?;
        self.queued_updates.remove(&next);
        Some(next)
    }

    fn discard_hooks(&mut self) -> usize {
        let dropped = self.links.len() + self.updates.len();
        self.links.clear();
        self.updates.clear();
        self.queued_updates.clear();
        dropped
    }
}

enum Job {
    Compute(NodeKey),
    Sort(NodeKey),
    Link(LinkEvent),
    Update(RecordRef, usize),
    Finalize(LocalId),
    Notify(ObserverId, observe::ObserverFn),
}

impl Store {
    /// Builds a store with default configuration.
    pub fn new(schema: Schema) -> StoreResult<Self> {
        Self::with_config(schema, StoreConfig::default())
    }

    pub fn with_config(schema: Schema, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let schema = schema.resolve()?;
        let model_count = schema.len();
        info!(
            "event=store_init module=store status=ok models={} max_flush_jobs={}",
            model_count, config.max_flush_jobs
        );
        Ok(Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(StoreState {
                    registry: Registry::new(model_count),
                    graph: DepGraph::default(),
                    queues: Queues::default(),
                    observers: ObserverTable::default(),
                    bag: BTreeMap::new(),
                    frames: Vec::new(),
                    batch_depth: 0,
                }),
                schema,
                config,
                dropped_observers: RefCell::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Returns the handle used to insert and look up records of `name`.
    pub fn model(&self, name: &str) -> StoreResult<ModelHandle> {
        let model = self
            .schema()
            .model_index(name)
            .ok_or_else(|| StoreError::UnknownModel(name.to_string()))?;
        Ok(ModelHandle {
            store: self.clone(),
            model,
        })
    }

    pub fn get(&self, model: &str, identity: impl Into<Input>) -> StoreResult<Option<Record>> {
        self.model(model)?.get(identity)
    }

    pub fn has(&self, model: &str, identity: impl Into<Input>) -> StoreResult<bool> {
        self.model(model)?.has(identity)
    }

    /// Number of live records across all models.
    pub fn record_count(&self) -> usize {
        self.core().registry.len()
    }

    /// Reads a top-level state value. Tracked like a field read.
    pub fn state(&self, key: &str) -> Value {
        self.track(FieldRef::State(key.to_string()));
        self.core().bag.get(key).cloned().unwrap_or_default()
    }

    pub fn set_state(&self, key: &str, value: impl Into<Value>) -> StoreResult<()> {
        self.ensure_mutable()?;
        let value = value.into();
        self.batch(|| {
            let mut guard = self.core_mut();
            let state = &mut *guard;
            if state.bag.get(key).cloned().unwrap_or_default() == value {
                return Ok(());
            }
            if value.is_undefined() {
                state.bag.remove(key);
            } else {
                state.bag.insert(key.to_string(), value);
            }
            state.touch(&self.inner.schema, FieldRef::State(key.to_string()));
            Ok(())
        })
    }

    /// Registers an observer. Reads made through its view are recorded, and
    /// `callback` runs once at the end of any batch that changed one of them.
    /// Recorded reads are cleared before each notification.
    pub fn observe<F>(&self, callback: F) -> Observer
    where
        F: Fn(&View) -> StoreResult<()> + 'static,
    {
        let id = self.core_mut().observers.register(Rc::new(callback));
        Observer::new(View::new(self.clone(), id))
    }

    /// Returns whether any live observer currently watches `record.field`.
    pub fn is_observed(&self, record: &Record, field: &str) -> StoreResult<bool> {
        let index = record.field_index(field)?;
        self.sweep_observers();
        Ok(self
            .core()
            .observers
            .is_watched(&FieldRef::Field(record.local_id(), index)))
    }

    /// Runs `f` as one batch: deferred work runs once, after `f` returns.
    pub fn batch_update<T>(&self, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        self.ensure_mutable()?;
        self.batch(f)
    }

    /// Returns whether both handles point at the same store.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn schema(&self) -> &ResolvedSchema {
        &self.inner.schema
    }

    pub(crate) fn core(&self) -> Ref<'_, StoreState> {
        self.inner.state.borrow()
    }

    pub(crate) fn core_mut(&self) -> RefMut<'_, StoreState> {
        self.inner.state.borrow_mut()
    }

    pub(crate) fn model_name(&self, model: usize) -> &str {
        self.schema().model(model).name.as_str()
    }

    pub(crate) fn names(&self, model: usize, field: usize) -> (String, String) {
        let resolved = self.schema().model(model);
        (
            resolved.name.clone(),
            resolved.fields[field].def.name().to_string(),
        )
    }

    pub(crate) fn field_index(&self, model: usize, name: &str) -> StoreResult<usize> {
        self.schema()
            .model(model)
            .field_index(name)
            .ok_or_else(|| StoreError::UnknownField {
                model: self.model_name(model).to_string(),
                field: name.to_string(),
            })
    }

    pub(crate) fn empty_value(&self, model: usize, field: usize) -> FieldValue {
        match self.schema().field(model, field).def.kind() {
            FieldKind::Attr => FieldValue::Attr(Value::Undefined),
            FieldKind::One { .. } => FieldValue::One(None),
            FieldKind::Many { .. } => FieldValue::Many(Vec::new()),
        }
    }

    pub(crate) fn is_live(&self, record: RecordRef) -> bool {
        self.core().registry.is_live(record.id)
    }

    pub(crate) fn ensure_live(&self, record: RecordRef) -> StoreResult<()> {
        if self.is_live(record) {
            return Ok(());
        }
        Err(StoreError::DeadRecord {
            model: self.model_name(record.model).to_string(),
            local_id: record.id,
        })
    }

    /// Rejects public mutations from inside a compute function or comparator.
    pub(crate) fn ensure_mutable(&self) -> StoreResult<()> {
        let node = match self.core().frames.last() {
            Some(Frame::Node(node)) => *node,
            _ => return Ok(()),
        };
        let model = self.core().registry.get(node.record).map(|slot| slot.model);
        let (model, field) = match model {
            Some(model) => self.names(model, node.field),
            None => (String::new(), node.field.to_string()),
        };
        Err(StoreError::MutationInCompute { model, field })
    }

    pub(crate) fn with_frame<T>(&self, frame: Frame, f: impl FnOnce() -> T) -> T {
        self.core_mut().frames.push(frame);
        let output = f();
        self.core_mut().frames.pop();
        output
    }

    pub(crate) fn unobserve(&self, id: ObserverId) {
        self.inner.dropped_observers.borrow_mut().push(id);
        self.sweep_observers();
    }

    /// Removes dropped observers. Removal can drop callbacks that own further
    /// guards, so it repeats until nothing new was dropped. Ids stay queued
    /// while the state is borrowed elsewhere.
    fn sweep_observers(&self) {
        loop {
            let ids = std::mem::take(&mut *self.inner.dropped_observers.borrow_mut());
            if ids.is_empty() {
                return;
            }
            let Ok(mut state) = self.inner.state.try_borrow_mut() else {
                self.inner.dropped_observers.borrow_mut().extend(ids);
                return;
            };
            for id in ids {
                state.observers.remove(id);
            }
        }
    }

    /// Runs `f` inside a batch. The outermost batch drains deferred work on
    /// success and drops queued hooks on failure.
    pub(crate) fn batch<T>(&self, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        self.core_mut().batch_depth += 1;
        let result = f();
        let depth = {
            let mut state = self.core_mut();
            state.batch_depth -= 1;
            state.batch_depth
        };
        if depth > 0 {
            return result;
        }
        match result {
            Ok(value) => {
                self.flush()?;
                Ok(value)
            }
            Err(err) => {
                self.abandon(&err);
                Err(err)
            }
        }
    }

    fn flush(&self) -> StoreResult<()> {
        self.core_mut().batch_depth += 1;
        let result = self.with_frame(Frame::Untracked, || self.drain());
        self.core_mut().batch_depth -= 1;
        if let Err(err) = &result {
            self.abandon(err);
        }
        result
    }

    fn drain(&self) -> StoreResult<()> {
        let limit = self.inner.config.max_flush_jobs;
        let mut jobs = 0usize;
        while let Some(job) = self.next_job() {
            jobs += 1;
            if jobs > limit {
                error!(
                    "event=flush module=store status=error code=flush_limit_exceeded limit={}",
                    limit
                );
                return Err(StoreError::FlushLimitExceeded(limit));
            }
            self.run_job(job)?;
        }
        if jobs > 0 && self.inner.config.log_mutations {
            debug!("event=flush module=store status=ok jobs={}", jobs);
        }
        Ok(())
    }

    fn next_job(&self) -> Option<Job> {
        self.sweep_observers();
        let mut state = self.core_mut();
        let queues = &mut state.queues;
        if let Some(node) = queues.computes.pop_front() {
            return Some(Job::Compute(node));
        }
        if let Some(node) = queues.sorts.pop_front() {
            return Some(Job::Sort(node));
        }
        if let Some(event) = queues.links.pop_front() {
            return Some(Job::Link(event));
        }
        if let Some((record, field)) = queues.pop_update() {
            return Some(Job::Update(record, field));
        }
        if let Some(id) = queues.finalize.pop_front() {
            return Some(Job::Finalize(id));
        }
        state
            .observers
            .pop_pending()
            .map(|(id, callback)| Job::Notify(id, callback))
    }

    fn run_job(&self, job: Job) -> StoreResult<()> {
        match job {
            Job::Compute(node) => self.recompute(node),
            Job::Sort(node) => self.resort(node),
            Job::Link(event) => {
                let def = &self.schema().field(event.owner.model, event.field).def;
                let hook = if event.added {
                    def.on_add.clone()
                } else {
                    def.on_delete.clone()
                };
                match hook {
                    Some(hook) => hook(
                        &Record::from_ref(self.clone(), event.owner),
                        &Record::from_ref(self.clone(), event.other),
                    ),
                    None => Ok(()),
                }
            }
            Job::Update(record, field) => {
                if !self.is_live(record) {
                    return Ok(());
                }
                match self.schema().field(record.model, field).def.on_update.clone() {
                    Some(hook) => hook(&Record::from_ref(self.clone(), record)),
                    None => Ok(()),
                }
            }
            Job::Finalize(id) => {
                self.finalize(id);
                Ok(())
            }
            Job::Notify(id, callback) => callback(&View::new(self.clone(), id)),
        }
    }

    fn abandon(&self, err: &StoreError) {
        let dropped = self.core_mut().queues.discard_hooks();
        warn!(
            "event=batch_abandon module=store status=error code={} dropped_hooks={}",
            err.code(),
            dropped
        );
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("models", &self.inner.schema.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Per-model entry point for inserts and lookups.
#[derive(Clone)]
pub struct ModelHandle {
    store: Store,
    model: usize,
}

impl ModelHandle {
    pub fn name(&self) -> &str {
        self.store.model_name(self.model)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Inserts or updates one record.
    ///
    /// Accepts a bare id value, a `Data` object or an existing record.
    pub fn insert(&self, input: impl Into<Input>) -> StoreResult<Record> {
        self.insert_with(input, InsertOptions::default())
    }

    pub fn insert_with(
        &self,
        input: impl Into<Input>,
        options: InsertOptions,
    ) -> StoreResult<Record> {
        self.store.ensure_mutable()?;
        let input = input.into();
        let reference = self
            .store
            .batch(|| self.store.insert_one(self.model, input, options))?;
        Ok(Record::from_ref(self.store.clone(), reference))
    }

    /// Inserts each input in order within one batch.
    pub fn insert_many<I: Into<Input>>(
        &self,
        inputs: impl IntoIterator<Item = I>,
    ) -> StoreResult<Vec<Record>> {
        self.insert_many_with(inputs, InsertOptions::default())
    }

    pub fn insert_many_with<I: Into<Input>>(
        &self,
        inputs: impl IntoIterator<Item = I>,
        options: InsertOptions,
    ) -> StoreResult<Vec<Record>> {
        self.store.ensure_mutable()?;
        let inputs: Vec<Input> = inputs.into_iter().map(Into::into).collect();
        let references = self.store.batch(|| {
            inputs
                .into_iter()
                .map(|input| self.store.insert_one(self.model, input, options))
                .collect::<StoreResult<Vec<_>>>()
        })?;
        Ok(references
            .into_iter()
            .map(|reference| Record::from_ref(self.store.clone(), reference))
            .collect())
    }

    /// Looks up a record by identity without creating it.
    pub fn get(&self, identity: impl Into<Input>) -> StoreResult<Option<Record>> {
        Ok(self
            .store
            .lookup_identity(self.model, identity.into())?
            .map(|id| {
                Record::from_ref(
                    self.store.clone(),
                    RecordRef {
                        id,
                        model: self.model,
                    },
                )
            }))
    }

    pub fn has(&self, identity: impl Into<Input>) -> StoreResult<bool> {
        Ok(self.get(identity)?.is_some())
    }

    /// Live records of this model in creation order.
    pub fn records(&self) -> Vec<Record> {
        let ids = self.store.core().registry.ids(self.model).to_vec();
        ids.into_iter()
            .map(|id| {
                Record::from_ref(
                    self.store.clone(),
                    RecordRef {
                        id,
                        model: self.model,
                    },
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.store.core().registry.ids(self.model).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for ModelHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModelHandle").field(&self.name()).finish()
    }
}
