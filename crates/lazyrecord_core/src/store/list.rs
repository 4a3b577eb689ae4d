//! List handle over a many-relation field.
//!
//! # Invariants
//! - A record appears at most once per list.
//! - Every mutation goes through the same link/unlink primitive as field
//!   assignment, so inverses and hooks behave identically.

use crate::error::{StoreError, StoreResult};
use crate::store::input::{Input, InsertOptions};
use crate::store::record::Record;
use crate::store::registry::{LocalId, RecordRef};
use crate::store::relation::Position;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};

#[derive(Clone)]
pub struct RecordList {
    owner: Record,
    field: usize,
    target: usize,
}

impl RecordList {
    pub(crate) fn new(owner: Record, field: usize, target: usize) -> Self {
        Self {
            owner,
            field,
            target,
        }
    }

    pub fn owner(&self) -> &Record {
        &self.owner
    }

    /// Current members in list order. Tracked.
    pub fn records(&self) -> StoreResult<Vec<Record>> {
        Ok(self
            .ids()?
            .into_iter()
            .map(|id| self.record(id))
            .collect())
    }

    pub fn ids(&self) -> StoreResult<Vec<LocalId>> {
        let value = self
            .owner
            .store()
            .read_field(self.owner.reference(), self.field)?;
        Ok(value.as_many().to_vec())
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.ids()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.ids()?.is_empty())
    }

    pub fn contains(&self, record: &Record) -> StoreResult<bool> {
        if !record.store().ptr_eq(self.owner.store()) {
            return Ok(false);
        }
        Ok(self.ids()?.contains(&record.local_id()))
    }

    pub fn first(&self) -> StoreResult<Option<Record>> {
        self.get(0)
    }

    pub fn get(&self, index: usize) -> StoreResult<Option<Record>> {
        Ok(self.ids()?.get(index).map(|id| self.record(*id)))
    }

    /// Adds one record at the end unless already present.
    pub fn add(&self, input: impl Into<Input>) -> StoreResult<Record> {
        let mut added = self.push([input])?;
        added.pop().ok_or_else(|| self.empty_input())
    }

    /// Appends records in the given order, skipping members already present.
    pub fn push<I: Into<Input>>(
        &self,
        items: impl IntoIterator<Item = I>,
    ) -> StoreResult<Vec<Record>> {
        let items: Vec<Input> = items.into_iter().map(Into::into).collect();
        self.mutate(|| {
            let store = self.owner.store();
            let owner = self.owner.reference();
            let mut added = Vec::with_capacity(items.len());
            for item in items {
                let target =
                    store.coerce_target(owner, self.field, item, InsertOptions::default())?;
                store.link(owner, self.field, target, Position::Back)?;
                added.push(target);
            }
            Ok(added)
        })
    }

    /// Places the records of one call at the front, in the given order.
    pub fn unshift<I: Into<Input>>(
        &self,
        items: impl IntoIterator<Item = I>,
    ) -> StoreResult<Vec<Record>> {
        let items: Vec<Input> = items.into_iter().map(Into::into).collect();
        self.mutate(|| {
            let store = self.owner.store();
            let owner = self.owner.reference();
            let mut targets = Vec::with_capacity(items.len());
            for item in items {
                let target =
                    store.coerce_target(owner, self.field, item, InsertOptions::default())?;
                targets.push(target);
            }
            let mut position = 0;
            for target in &targets {
                if store.has_link(owner, self.field, target.id) {
                    continue;
                }
                store.link(owner, self.field, *target, Position::Front(position))?;
                position += 1;
            }
            Ok(targets)
        })
    }

    /// Removes a member. Unknown or absent records are ignored.
    pub fn delete(&self, input: impl Into<Input>) -> StoreResult<()> {
        let input = input.into();
        self.mutate(|| {
            let store = self.owner.store();
            let owner = self.owner.reference();
            if let Some(target) = store.find_target(owner, self.field, input)? {
                store.unlink(owner, self.field, target, false)?;
            }
            Ok(Vec::new())
        })
        .map(|_| ())
    }

    /// Removes every member, last first.
    pub fn clear(&self) -> StoreResult<()> {
        self.mutate(|| {
            let store = self.owner.store();
            let owner = self.owner.reference();
            for target in store.current_many(owner, self.field).into_iter().rev() {
                store.unlink(owner, self.field, target, false)?;
            }
            Ok(Vec::new())
        })
        .map(|_| ())
    }

    /// Stable in-place reorder with a caller comparator.
    ///
    /// Fields that declare their own `sort` reject manual reordering.
    ///
    /// Reads made by the comparator are attributed to the current tracking
    /// context.
    pub fn sort_by<F>(&self, mut compare: F) -> StoreResult<()>
    where
        F: FnMut(&Record, &Record) -> StoreResult<Ordering>,
    {
        self.mutate(|| {
            let store = self.owner.store();
            let owner = self.owner.reference();
            if store.schema().field(owner.model, self.field).def.is_sorted() {
                let (model, field) = store.names(owner.model, self.field);
                return Err(StoreError::InvalidInput {
                    model,
                    field,
                    detail: "field keeps its declared sort order".to_string(),
                });
            }
            let mut records = self.records()?;
            let mut failure = None;
            records.sort_by(|left, right| match compare(left, right) {
                Ok(ordering) => ordering,
                Err(err) => {
                    failure.get_or_insert(err);
                    Ordering::Equal
                }
            });
            if let Some(err) = failure {
                return Err(err);
            }
            let order: Vec<RecordRef> = records.iter().map(Record::reference).collect();
            self.owner
                .store()
                .reorder(self.owner.reference(), self.field, &order);
            Ok(Vec::new())
        })
        .map(|_| ())
    }

    fn mutate(&self, f: impl FnOnce() -> StoreResult<Vec<RecordRef>>) -> StoreResult<Vec<Record>> {
        let store = self.owner.store();
        store.ensure_mutable()?;
        let references = store.batch(|| {
            let owner = self.owner.reference();
            store.ensure_live(owner)?;
            if store.schema().field(owner.model, self.field).def.is_computed() {
                let (model, field) = store.names(owner.model, self.field);
                return Err(StoreError::ComputedFieldWrite { model, field });
            }
            f()
        })?;
        Ok(references
            .into_iter()
            .map(|reference| Record::from_ref(store.clone(), reference))
            .collect())
    }

    fn record(&self, id: LocalId) -> Record {
        Record::from_ref(
            self.owner.store().clone(),
            RecordRef {
                id,
                model: self.target,
            },
        )
    }

    fn empty_input(&self) -> StoreError {
        let (model, field) = self
            .owner
            .store()
            .names(self.owner.reference().model, self.field);
        StoreError::InvalidInput {
            model,
            field,
            detail: "nothing to add".to_string(),
        }
    }
}

impl Debug for RecordList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (model, field) = self
            .owner
            .store()
            .names(self.owner.reference().model, self.field);
        f.debug_struct("RecordList")
            .field("owner", &self.owner)
            .field("field", &format!("{model}.{field}"))
            .finish()
    }
}
