//! Dependency tracking and recomputation of computed fields and sorted lists.
//!
//! # Responsibility
//! - Attribute every tracked read to the frame on top of the tracking stack.
//! - Mark dependents stale when a field changes, and decide whether they
//!   recompute now (eager or observed) or on the next read (lazy).
//! - Recompute computed fields and re-sort sorted lists.
//!
//! # Invariants
//! - A node's dependency set is rebuilt from scratch on every run.
//! - A stale node is recomputed before its field is read.
//! - Recompute results go through the regular write path, so equal values
//!   do not notify.

use crate::error::{StoreError, StoreResult};
use crate::model::schema::ResolvedSchema;
use crate::store::input::InsertOptions;
use crate::store::observe::ObserverId;
use crate::store::record::Record;
use crate::store::registry::{FieldValue, LocalId, RecordRef};
use crate::store::relation::Origin;
use crate::store::{Store, StoreState};
use log::debug;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Something a tracked read can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum FieldRef {
    Field(LocalId, usize),
    /// Key of the store's top-level state bag.
    State(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NodeKind {
    Compute,
    Sort,
}

/// A derivation attached to one field of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    pub(crate) record: LocalId,
    pub(crate) field: usize,
    pub(crate) kind: NodeKind,
}

impl NodeKey {
    pub(crate) fn compute(record: LocalId, field: usize) -> Self {
        Self {
            record,
            field,
            kind: NodeKind::Compute,
        }
    }

    pub(crate) fn sort(record: LocalId, field: usize) -> Self {
        Self {
            record,
            field,
            kind: NodeKind::Sort,
        }
    }

    fn output(&self) -> FieldRef {
        FieldRef::Field(self.record, self.field)
    }
}

/// Tracking context that reads are attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    Node(NodeKey),
    Observer(ObserverId),
    Untracked,
}

#[derive(Default)]
pub(crate) struct DepGraph {
    deps: HashMap<NodeKey, HashSet<FieldRef>>,
    dependents: HashMap<FieldRef, Vec<NodeKey>>,
}

impl DepGraph {
    pub(crate) fn add_edge(&mut self, node: NodeKey, field: FieldRef) {
        if self.deps.entry(node).or_default().insert(field.clone()) {
            self.dependents.entry(field).or_default().push(node);
        }
    }

    pub(crate) fn clear_node(&mut self, node: NodeKey) {
        let Some(fields) = self.deps.remove(&node) else {
            return;
        };
        for field in fields {
            if let Some(nodes) = self.dependents.get_mut(&field) {
                nodes.retain(|candidate| *candidate != node);
                if nodes.is_empty() {
                    self.dependents.remove(&field);
                }
            }
        }
    }

    /// Drops every edge pointing at `field`.
    pub(crate) fn forget_field(&mut self, field: &FieldRef) {
        for node in self.dependents.remove(field).unwrap_or_default() {
            if let Some(fields) = self.deps.get_mut(&node) {
                fields.remove(field);
            }
        }
    }

    pub(crate) fn dependents_of(&self, field: &FieldRef) -> Vec<NodeKey> {
        self.dependents.get(field).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    fn depends_on(&self, node: NodeKey, field: &FieldRef) -> bool {
        self.deps.get(&node).is_some_and(|fields| fields.contains(field))
    }
}

impl StoreState {
    /// Records that `field` changed: notifies observers and invalidates
    /// dependents.
    pub(crate) fn touch(&mut self, schema: &ResolvedSchema, field: FieldRef) {
        self.observers.notify(&field);
        for node in self.graph.dependents_of(&field) {
            self.invalidate(schema, node);
        }
    }

    pub(crate) fn invalidate(&mut self, schema: &ResolvedSchema, node: NodeKey) {
        let Some(record) = self.registry.get_mut(node.record) else {
            return;
        };
        if record.deleted {
            return;
        }
        let model = record.model;
        let slot = &mut record.fields[node.field];
        let stale = match node.kind {
            NodeKind::Compute => &mut slot.stale,
            NodeKind::Sort => &mut slot.sort_stale,
        };
        if *stale {
            return;
        }
        *stale = true;

        let output = node.output();
        let eager =
            node.kind == NodeKind::Compute && schema.field(model, node.field).def.is_eager();
        if eager || self.observers.is_watched(&output) {
            match node.kind {
                NodeKind::Compute => self.queues.computes.push_back(node),
                NodeKind::Sort => self.queues.sorts.push_back(node),
            }
        } else {
            for dependent in self.graph.dependents_of(&output) {
                self.invalidate(schema, dependent);
            }
        }
    }
}

impl Store {
    /// Attributes a read of `field` to the current frame.
    pub(crate) fn track(&self, field: FieldRef) {
        let mut state = self.core_mut();
        match state.frames.last().copied() {
            Some(Frame::Node(node)) => state.graph.add_edge(node, field),
            Some(Frame::Observer(observer)) => state.observers.subscribe(observer, field),
            Some(Frame::Untracked) | None => {}
        }
    }

    /// Tracked read: refreshes stale derivations first.
    pub(crate) fn read_field(&self, record: RecordRef, field: usize) -> StoreResult<FieldValue> {
        self.refresh(record.id, field)?;
        self.track(FieldRef::Field(record.id, field));
        Ok(self.peek_field(record, field))
    }

    /// Untracked raw read; dead records read as empty.
    pub(crate) fn peek_field(&self, record: RecordRef, field: usize) -> FieldValue {
        let state = self.core();
        match state.registry.get(record.id) {
            Some(slot) => slot.fields[field].value.clone(),
            None => self.empty_value(record.model, field),
        }
    }

    fn refresh(&self, id: LocalId, field: usize) -> StoreResult<()> {
        if self.slot_flags(id, field).0 {
            self.batch(|| self.recompute(NodeKey::compute(id, field)))?;
        }
        if self.slot_flags(id, field).1 {
            self.batch(|| self.resort(NodeKey::sort(id, field)))?;
        }
        Ok(())
    }

    fn slot_flags(&self, id: LocalId, field: usize) -> (bool, bool) {
        let state = self.core();
        state
            .registry
            .get(id)
            .filter(|slot| !slot.deleted)
            .map(|slot| (slot.fields[field].stale, slot.fields[field].sort_stale))
            .unwrap_or((false, false))
    }

    pub(crate) fn recompute(&self, node: NodeKey) -> StoreResult<()> {
        let model = {
            let mut state = self.core_mut();
            let Some(record) = state.registry.get_mut(node.record) else {
                return Ok(());
            };
            if record.deleted || !record.fields[node.field].stale {
                return Ok(());
            }
            let model = record.model;
            if record.fields[node.field].computing {
                let names = self.names(model, node.field);
                return Err(StoreError::CyclicCompute {
                    model: names.0,
                    field: names.1,
                });
            }
            record.fields[node.field].computing = true;
            state.graph.clear_node(node);
            model
        };

        let compute = self.schema().field(model, node.field).def.compute.clone();
        let Some(compute) = compute else {
            self.set_computing(node, false, false);
            return Ok(());
        };
        let record = Record::from_ref(
            self.clone(),
            RecordRef {
                id: node.record,
                model,
            },
        );
        let result = self.with_frame(Frame::Node(node), || compute(&record));
        let input = match result {
            Ok(input) => input,
            Err(err) => {
                self.set_computing(node, false, false);
                return Err(err);
            }
        };
        self.set_computing(node, false, true);
        if self.config().log_mutations {
            let (model_name, field_name) = self.names(model, node.field);
            debug!(
                "event=compute module=store status=ok model={} field={}",
                model_name, field_name
            );
        }
        self.write_field(
            RecordRef {
                id: node.record,
                model,
            },
            node.field,
            input,
            InsertOptions::default(),
            Origin::Compute,
        )
    }

    fn set_computing(&self, node: NodeKey, computing: bool, fresh: bool) {
        let mut state = self.core_mut();
        if let Some(record) = state.registry.get_mut(node.record) {
            let slot = &mut record.fields[node.field];
            slot.computing = computing;
            if fresh {
                slot.stale = false;
            }
        }
    }

    /// Stable re-sort of a sorted many-relation. Touches the field only when
    /// the order changed.
    pub(crate) fn resort(&self, node: NodeKey) -> StoreResult<()> {
        let (model, ids) = {
            let mut state = self.core_mut();
            let Some(record) = state.registry.get(node.record) else {
                return Ok(());
            };
            if record.deleted || !record.fields[node.field].sort_stale {
                return Ok(());
            }
            let model = record.model;
            let ids = record.fields[node.field].value.as_many().to_vec();
            state.graph.clear_node(node);
            (model, ids)
        };
        let Some(compare) = self.schema().field(model, node.field).def.sort.clone() else {
            return Ok(());
        };
        let target = self
            .schema()
            .field(model, node.field)
            .target
            .unwrap_or(model);

        let mut sorted: Vec<Record> = ids
            .iter()
            .map(|id| {
                Record::from_ref(
                    self.clone(),
                    RecordRef {
                        id: *id,
                        model: target,
                    },
                )
            })
            .collect();
        let mut failure = None;
        self.with_frame(Frame::Node(node), || {
            sorted.sort_by(|left, right| match compare(left, right) {
                Ok(ordering) => ordering,
                Err(err) => {
                    failure.get_or_insert(err);
                    Ordering::Equal
                }
            });
        });
        if let Some(err) = failure {
            return Err(err);
        }

        let ordered: Vec<LocalId> = sorted.iter().map(Record::local_id).collect();
        let schema = self.schema();
        let mut state = self.core_mut();
        let Some(record) = state.registry.get_mut(node.record) else {
            return Ok(());
        };
        let slot = &mut record.fields[node.field];
        slot.sort_stale = false;
        if ordered != ids {
            slot.value = FieldValue::Many(ordered);
            state.touch(schema, node.output());
        }
        Ok(())
    }
}
