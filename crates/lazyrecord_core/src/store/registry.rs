//! Record arena, identity index and reverse-reference index.
//!
//! # Responsibility
//! - Assign stable local identities to records.
//! - Resolve `(model, identity key)` to a live record.
//! - Track which relation fields reference a record, so deletion can clean up
//!   links that have no declared inverse.
//!
//! # Invariants
//! - One identity key maps to at most one live record per model.
//! - Relation values store `LocalId`s, never record handles.
//! - A `LocalId` is never reused.

use crate::model::value::Value;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const KEY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Stable in-memory identity of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LocalId(Uuid);

impl LocalId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Record identity paired with its model index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RecordRef {
    pub(crate) id: LocalId,
    pub(crate) model: usize,
}

/// One component of an identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyPart {
    Str(String),
    Int(i64),
    Bool(bool),
    Record(LocalId),
}

impl KeyPart {
    /// Normalizes a scalar id value. Markup keys by content, integral floats
    /// key as integers.
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(text) => Some(Self::Str(text.clone())),
            Value::Markup(markup) => Some(Self::Str(markup.as_str().to_string())),
            Value::Int(number) => Some(Self::Int(*number)),
            Value::Float(number) if number.is_finite() && number.fract() == 0.0 => {
                Some(Self::Int(*number as i64))
            }
            Value::Bool(flag) => Some(Self::Bool(*flag)),
            Value::DateTime(stamp) => {
                Some(Self::Str(stamp.format(KEY_DATETIME_FORMAT).to_string()))
            }
            Value::Undefined | Value::Null | Value::Float(_) => None,
        }
    }
}

/// Identity key; empty for singleton models.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IdentityKey(pub(crate) Vec<KeyPart>);

/// Stored value of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Attr(Value),
    One(Option<LocalId>),
    Many(Vec<LocalId>),
}

impl FieldValue {
    pub fn as_attr(&self) -> Option<&Value> {
        match self {
            Self::Attr(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_one(&self) -> Option<LocalId> {
        match self {
            Self::One(value) => *value,
            _ => None,
        }
    }

    pub fn as_many(&self) -> &[LocalId] {
        match self {
            Self::Many(ids) => ids.as_slice(),
            _ => &[],
        }
    }
}

pub(crate) struct FieldSlot {
    pub(crate) value: FieldValue,
    /// Computed value must be recomputed before the next read.
    pub(crate) stale: bool,
    /// Sorted list must be re-sorted before the next read.
    pub(crate) sort_stale: bool,
    pub(crate) computing: bool,
}

impl FieldSlot {
    pub(crate) fn new(value: FieldValue, stale: bool) -> Self {
        Self {
            value,
            stale,
            sort_stale: false,
            computing: false,
        }
    }
}

pub(crate) struct RecordSlot {
    pub(crate) model: usize,
    pub(crate) key: IdentityKey,
    pub(crate) fields: Vec<FieldSlot>,
    /// Unlinked and unindexed; the slot is dropped when deletion finalizes.
    pub(crate) deleted: bool,
}

#[derive(Default)]
pub(crate) struct Registry {
    records: HashMap<LocalId, RecordSlot>,
    index: HashMap<(usize, IdentityKey), LocalId>,
    by_model: Vec<Vec<LocalId>>,
    referrers: HashMap<LocalId, Vec<(LocalId, usize)>>,
}

impl Registry {
    pub(crate) fn new(model_count: usize) -> Self {
        Self {
            by_model: vec![Vec::new(); model_count],
            ..Self::default()
        }
    }

    pub(crate) fn insert(
        &mut self,
        model: usize,
        key: IdentityKey,
        fields: Vec<FieldSlot>,
    ) -> LocalId {
        let id = LocalId::new();
        self.index.insert((model, key.clone()), id);
        self.by_model[model].push(id);
        self.records.insert(
            id,
            RecordSlot {
                model,
                key,
                fields,
                deleted: false,
            },
        );
        id
    }

    pub(crate) fn lookup(&self, model: usize, key: &IdentityKey) -> Option<LocalId> {
        self.index.get(&(model, key.clone())).copied()
    }

    pub(crate) fn get(&self, id: LocalId) -> Option<&RecordSlot> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: LocalId) -> Option<&mut RecordSlot> {
        self.records.get_mut(&id)
    }

    pub(crate) fn is_live(&self, id: LocalId) -> bool {
        self.records.get(&id).is_some_and(|slot| !slot.deleted)
    }

    /// Marks a record deleted and removes it from lookups.
    pub(crate) fn unindex(&mut self, id: LocalId) {
        let Some(slot) = self.records.get_mut(&id) else {
            return;
        };
        slot.deleted = true;
        let entry = (slot.model, slot.key.clone());
        if self.index.get(&entry) == Some(&id) {
            self.index.remove(&entry);
        }
        self.by_model[slot.model].retain(|candidate| *candidate != id);
    }

    /// Removes a live record from lookups only. It stays listed under its
    /// model and readable through existing handles.
    pub(crate) fn drop_lookup(&mut self, id: LocalId) {
        let Some(slot) = self.records.get(&id) else {
            return;
        };
        let entry = (slot.model, slot.key.clone());
        if self.index.get(&entry) == Some(&id) {
            self.index.remove(&entry);
        }
    }

    pub(crate) fn remove(&mut self, id: LocalId) -> Option<RecordSlot> {
        self.referrers.remove(&id);
        self.records.remove(&id)
    }

    pub(crate) fn ids(&self, model: usize) -> &[LocalId] {
        self.by_model.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn len(&self) -> usize {
        self.by_model.iter().map(Vec::len).sum()
    }

    pub(crate) fn add_referrer(&mut self, target: LocalId, owner: LocalId, field: usize) {
        let entry = self.referrers.entry(target).or_default();
        if !entry.contains(&(owner, field)) {
            entry.push((owner, field));
        }
    }

    pub(crate) fn remove_referrer(&mut self, target: LocalId, owner: LocalId, field: usize) {
        if let Some(entry) = self.referrers.get_mut(&target) {
            entry.retain(|candidate| *candidate != (owner, field));
            if entry.is_empty() {
                self.referrers.remove(&target);
            }
        }
    }

    /// Returns `(owner, field)` pairs currently referencing `target`.
    pub(crate) fn referrers(&self, target: LocalId) -> Vec<(LocalId, usize)> {
        self.referrers.get(&target).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldSlot, FieldValue, IdentityKey, KeyPart, Registry};
    use crate::model::value::Value;

    fn key(name: &str) -> IdentityKey {
        IdentityKey(vec![KeyPart::Str(name.to_string())])
    }

    #[test]
    fn key_part_normalizes_scalars() {
        assert_eq!(KeyPart::from_value(&Value::Float(3.0)), Some(KeyPart::Int(3)));
        assert_eq!(KeyPart::from_value(&Value::Float(3.5)), None);
        assert_eq!(KeyPart::from_value(&Value::Undefined), None);
        assert_eq!(
            KeyPart::from_value(&Value::from("John")),
            Some(KeyPart::Str("John".to_string()))
        );
    }

    #[test]
    fn lookup_follows_index_until_unindexed() {
        let mut registry = Registry::new(1);
        let id = registry.insert(
            0,
            key("John"),
            vec![FieldSlot::new(FieldValue::Attr(Value::from("John")), false)],
        );
        assert_eq!(registry.lookup(0, &key("John")), Some(id));
        assert_eq!(registry.len(), 1);

        registry.unindex(id);
        assert_eq!(registry.lookup(0, &key("John")), None);
        assert!(!registry.is_live(id));
        assert!(registry.get(id).is_some());
        assert!(registry.ids(0).is_empty());

        assert!(registry.remove(id).is_some());
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn dropped_lookup_keeps_the_record_listed() {
        let mut registry = Registry::new(1);
        let id = registry.insert(0, key("General"), Vec::new());
        registry.drop_lookup(id);
        assert_eq!(registry.lookup(0, &key("General")), None);
        assert!(registry.is_live(id));
        assert_eq!(registry.ids(0), [id]);
    }

    #[test]
    fn referrers_are_deduplicated_and_removable() {
        let mut registry = Registry::new(1);
        let owner = registry.insert(0, key("General"), Vec::new());
        let target = registry.insert(0, key("John"), Vec::new());
        registry.add_referrer(target, owner, 1);
        registry.add_referrer(target, owner, 1);
        assert_eq!(registry.referrers(target), vec![(owner, 1)]);
        registry.remove_referrer(target, owner, 1);
        assert!(registry.referrers(target).is_empty());
    }
}
