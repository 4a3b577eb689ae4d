//! Record handles.
//!
//! # Responsibility
//! - Give callers a cheap, cloneable handle to one record of one store.
//! - Route reads through dependency tracking and writes through one batch per
//!   call.
//!
//! # Invariants
//! - A handle never owns record data; it resolves through the store on every
//!   access.
//! - Handles of deleted records read empty values and reject writes.

use crate::error::{StoreError, StoreResult};
use crate::model::field::FieldKind;
use crate::model::value::Value;
use crate::store::input::{Data, Input, InsertOptions};
use crate::store::list::RecordList;
use crate::store::observe::Observer;
use crate::store::registry::{FieldValue, LocalId, RecordRef};
use crate::store::relation::Origin;
use crate::store::Store;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};

#[derive(Clone)]
pub struct Record {
    store: Store,
    reference: RecordRef,
}

/// Raw field values of one record, without refreshing stale derivations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSnapshot {
    pub local_id: LocalId,
    pub model: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub(crate) fn from_ref(store: Store, reference: RecordRef) -> Self {
        Self { store, reference }
    }

    pub(crate) fn reference(&self) -> RecordRef {
        self.reference
    }

    pub fn local_id(&self) -> LocalId {
        self.reference.id
    }

    pub fn model(&self) -> &str {
        self.store.model_name(self.reference.model)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Returns false once the record has been deleted.
    pub fn exists(&self) -> bool {
        self.store.is_live(self.reference)
    }

    pub(crate) fn field_index(&self, name: &str) -> StoreResult<usize> {
        self.store.field_index(self.reference.model, name)
    }

    /// Tracked read of any field kind.
    pub(crate) fn read(&self, field: &str) -> StoreResult<FieldValue> {
        let index = self.field_index(field)?;
        self.store.read_field(self.reference, index)
    }

    /// Reads an attribute field.
    pub fn get(&self, field: &str) -> StoreResult<Value> {
        match self.read(field)? {
            FieldValue::Attr(value) => Ok(value),
            _ => Err(self.kind_mismatch(field, "an attribute")),
        }
    }

    /// Reads a one-relation field.
    pub fn one(&self, field: &str) -> StoreResult<Option<Record>> {
        let index = self.field_index(field)?;
        let Some(target) = self.store.schema().field(self.reference.model, index).target else {
            return Err(self.kind_mismatch(field, "a one-relation"));
        };
        match self.store.read_field(self.reference, index)? {
            FieldValue::One(id) => Ok(id.map(|id| {
                Record::from_ref(self.store.clone(), RecordRef { id, model: target })
            })),
            _ => Err(self.kind_mismatch(field, "a one-relation")),
        }
    }

    /// Returns the list handle of a many-relation field. Nothing is read until
    /// the list is queried.
    pub fn many(&self, field: &str) -> StoreResult<RecordList> {
        let index = self.field_index(field)?;
        let resolved = self.store.schema().field(self.reference.model, index);
        match (resolved.def.kind(), resolved.target) {
            (FieldKind::Many { .. }, Some(target)) => {
                Ok(RecordList::new(self.clone(), index, target))
            }
            _ => Err(self.kind_mismatch(field, "a many-relation")),
        }
    }

    /// Returns whether this record is a member of `list`.
    pub fn is_in(&self, list: &RecordList) -> StoreResult<bool> {
        list.contains(self)
    }

    pub fn set(&self, field: &str, input: impl Into<Input>) -> StoreResult<()> {
        self.set_with(field, input, InsertOptions::default())
    }

    pub fn set_with(
        &self,
        field: &str,
        input: impl Into<Input>,
        options: InsertOptions,
    ) -> StoreResult<()> {
        self.store.ensure_mutable()?;
        let index = self.field_index(field)?;
        let input = input.into();
        self.store.batch(|| {
            self.store
                .write_field(self.reference, index, input, options, Origin::User)
        })
    }

    /// Writes several fields in one batch, in field declaration order.
    pub fn assign(&self, data: Data) -> StoreResult<()> {
        self.assign_with(data, InsertOptions::default())
    }

    pub fn assign_with(&self, data: Data, options: InsertOptions) -> StoreResult<()> {
        self.store.ensure_mutable()?;
        self.store.batch(|| {
            self.store.ensure_live(self.reference)?;
            self.store.validate_data(self.reference.model, &data)?;
            self.store.apply_data(self.reference, data, options)
        })
    }

    /// Deletes the record and unlinks it everywhere. Deleting twice is a no-op.
    pub fn delete(&self) -> StoreResult<()> {
        self.store.ensure_mutable()?;
        self.store.batch(|| self.store.delete_record(self.reference))
    }

    /// Untracked raw read. Stale computed values and unsorted lists are
    /// returned as stored.
    pub fn peek(&self, field: &str) -> StoreResult<FieldValue> {
        let index = self.field_index(field)?;
        Ok(self.store.peek_field(self.reference, index))
    }

    pub fn snapshot(&self) -> RecordSnapshot {
        let resolved = self.store.schema().model(self.reference.model);
        let fields = resolved
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| {
                (
                    field.def.name().to_string(),
                    self.store.peek_field(self.reference, index),
                )
            })
            .collect();
        RecordSnapshot {
            local_id: self.reference.id,
            model: resolved.name.clone(),
            fields,
        }
    }

    /// Calls `callback` at the end of every batch that changed `field`.
    pub fn on_change<F>(&self, field: &str, callback: F) -> StoreResult<Observer>
    where
        F: Fn(&Record) -> StoreResult<()> + 'static,
    {
        let index = self.field_index(field)?;
        let reference = self.reference;
        let observer = self.store.observe(move |view| {
            let record = Record::from_ref(view.store().clone(), reference);
            view.scope(|| record.store.read_field(reference, index))?;
            callback(&record)
        });
        observer.scope(|| self.store.read_field(reference, index))?;
        Ok(observer)
    }

    fn kind_mismatch(&self, field: &str, expected: &'static str) -> StoreError {
        StoreError::FieldKindMismatch {
            model: self.model().to_string(),
            field: field.to_string(),
            expected,
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.reference.id == other.reference.id && self.store.ptr_eq(&other.store)
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.id.hash(state);
    }
}

impl Debug for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model())
            .field("local_id", &self.reference.id)
            .finish()
    }
}
