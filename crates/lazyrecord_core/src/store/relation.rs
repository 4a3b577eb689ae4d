//! Field writes, relation links and record lifecycle.
//!
//! # Responsibility
//! - Apply attribute writes with coercion and identity checks.
//! - Keep relation fields and their inverses consistent through a single
//!   link/unlink primitive.
//! - Resolve inbound data to records (upsert) and cascade deletions.
//!
//! # Invariants
//! - For every link through a field with an inverse, the inverse field links
//!   back; inverse updates are a single hop.
//! - Adding a present link or removing an absent one changes nothing and
//!   queues nothing.
//! - An id field never changes on a live record; only a deletion cascade may
//!   empty an id relation.
//! - Hooks are queued, never called from inside a write.

use crate::error::{StoreError, StoreResult};
use crate::model::field::FieldKind;
use crate::model::value::{coerce_attr, Value};
use crate::store::compute::{FieldRef, NodeKey};
use crate::store::input::{Command, Data, Input, InsertOptions};
use crate::store::record::Record;
use crate::store::registry::{FieldSlot, FieldValue, IdentityKey, KeyPart, LocalId, RecordRef};
use crate::store::Store;
use log::debug;

/// Who is writing a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    User,
    Compute,
}

/// Where a new member lands in a many-relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Position {
    Back,
    Front(usize),
}

/// Queued add/delete hook invocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinkEvent {
    pub(crate) owner: RecordRef,
    pub(crate) field: usize,
    pub(crate) other: RecordRef,
    pub(crate) added: bool,
}

enum Inbound {
    Existing(RecordRef),
    Data(Data),
}

impl Store {
    pub(crate) fn write_field(
        &self,
        record: RecordRef,
        field: usize,
        input: Input,
        options: InsertOptions,
        origin: Origin,
    ) -> StoreResult<()> {
        self.ensure_live(record)?;
        let def = &self.schema().field(record.model, field).def;
        if origin == Origin::User && def.is_computed() {
            let (model, field) = self.names(record.model, field);
            return Err(StoreError::ComputedFieldWrite { model, field });
        }
        match def.kind() {
            FieldKind::Attr => self.write_attr(record, field, input, options),
            FieldKind::One { .. } => self.write_one(record, field, input, options),
            FieldKind::Many { .. } => self.write_many(record, field, input, options),
        }
    }

    fn write_attr(
        &self,
        record: RecordRef,
        field: usize,
        input: Input,
        options: InsertOptions,
    ) -> StoreResult<()> {
        let schema = self.schema();
        let resolved = schema.field(record.model, field);
        let raw = match input {
            Input::Value(value) => value,
            other => {
                return Err(self.invalid_input(
                    record.model,
                    field,
                    format!("attribute expects a value, got a {}", other.kind_name()),
                ))
            }
        };
        let value = coerce_attr(raw, resolved.def.attr_type, resolved.def.html, options.html);

        let mut guard = self.core_mut();
        let state = &mut *guard;
        let Some(slot) = state.registry.get_mut(record.id) else {
            return Ok(());
        };
        if let Some(position) = resolved.id_position {
            if KeyPart::from_value(&value).as_ref() != slot.key.0.get(position) {
                let (model, field) = self.names(record.model, field);
                return Err(StoreError::IdentityChange { model, field });
            }
        }
        let next = FieldValue::Attr(value);
        if slot.fields[field].value == next {
            return Ok(());
        }
        slot.fields[field].value = next;
        if resolved.def.on_update.is_some() {
            state.queues.queue_update(record, field);
        }
        state.touch(schema, FieldRef::Field(record.id, field));
        Ok(())
    }

    fn write_one(
        &self,
        record: RecordRef,
        field: usize,
        input: Input,
        options: InsertOptions,
    ) -> StoreResult<()> {
        match input {
            Input::Commands(commands) => self.apply_commands(record, field, commands, options),
            input if input.is_empty_value() => match self.current_one(record, field) {
                Some(current) => self.unlink(record, field, current, false),
                None => Ok(()),
            },
            Input::List(mut items) if items.len() == 1 => {
                self.write_one(record, field, items.remove(0), options)
            }
            Input::List(_) => Err(self.invalid_input(
                record.model,
                field,
                "one-relation accepts at most one record".to_string(),
            )),
            other => {
                let target = self.coerce_target(record, field, other, options)?;
                self.link(record, field, target, Position::Back)
            }
        }
    }

    fn write_many(
        &self,
        record: RecordRef,
        field: usize,
        input: Input,
        options: InsertOptions,
    ) -> StoreResult<()> {
        match input {
            Input::Commands(commands) => self.apply_commands(record, field, commands, options),
            Input::Value(Value::Undefined | Value::Null | Value::Bool(false)) => {
                self.replace_many(record, field, Vec::new(), options)
            }
            Input::List(items) => self.replace_many(record, field, items, options),
            other => self.replace_many(record, field, vec![other], options),
        }
    }

    fn apply_commands(
        &self,
        record: RecordRef,
        field: usize,
        commands: Vec<Command>,
        options: InsertOptions,
    ) -> StoreResult<()> {
        for command in commands {
            match command {
                Command::Add(input) => {
                    let target = self.coerce_target(record, field, input, options)?;
                    self.link(record, field, target, Position::Back)?;
                }
                Command::Delete(input) => {
                    if let Some(target) = self.find_target(record, field, input)? {
                        self.unlink(record, field, target, false)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Replaces membership: removes members not listed (last first), then adds
    /// the listed ones in order.
    fn replace_many(
        &self,
        record: RecordRef,
        field: usize,
        items: Vec<Input>,
        options: InsertOptions,
    ) -> StoreResult<()> {
        let mut targets: Vec<RecordRef> = Vec::with_capacity(items.len());
        for item in items {
            let target = self.coerce_target(record, field, item, options)?;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        for existing in self.current_many(record, field).into_iter().rev() {
            if !targets.contains(&existing) {
                self.unlink(record, field, existing, false)?;
            }
        }
        for target in &targets {
            self.link(record, field, *target, Position::Back)?;
        }
        if !self.schema().field(record.model, field).def.is_sorted() {
            self.reorder(record, field, &targets);
        }
        Ok(())
    }

    /// Moves the listed members into the listed order. Members not listed keep
    /// their relative order after them.
    pub(crate) fn reorder(&self, record: RecordRef, field: usize, order: &[RecordRef]) {
        let schema = self.schema();
        let mut guard = self.core_mut();
        let state = &mut *guard;
        let Some(slot) = state.registry.get_mut(record.id) else {
            return;
        };
        let FieldValue::Many(current) = &mut slot.fields[field].value else {
            return;
        };
        let mut wanted: Vec<LocalId> = order
            .iter()
            .map(|target| target.id)
            .filter(|id| current.contains(id))
            .collect();
        let rest: Vec<LocalId> = current
            .iter()
            .filter(|id| !wanted.contains(id))
            .copied()
            .collect();
        wanted.extend(rest);
        if *current == wanted {
            return;
        }
        *current = wanted;
        state.touch(schema, FieldRef::Field(record.id, field));
    }

    /// Links `target` into `owner.field` and applies the inverse.
    pub(crate) fn link(
        &self,
        owner: RecordRef,
        field: usize,
        target: RecordRef,
        position: Position,
    ) -> StoreResult<()> {
        let schema = self.schema();
        let resolved = schema.field(owner.model, field);
        self.expect_target(owner, field, target)?;
        self.ensure_live(target)?;
        self.check_id_link(owner, field, target)?;
        if let Some(inverse) = resolved.inverse {
            self.check_id_link(target, inverse, owner)?;
        }

        if resolved.def.is_many() {
            if self.has_link(owner, field, target.id) {
                return Ok(());
            }
        } else {
            match self.current_one(owner, field) {
                Some(current) if current == target => return Ok(()),
                Some(current) => self.unlink(owner, field, current, false)?,
                None => {}
            }
        }
        self.insert_link(owner, field, target, position);

        let Some(inverse) = resolved.inverse else {
            return Ok(());
        };
        if schema.field(target.model, inverse).def.is_many() {
            if !self.has_link(target, inverse, owner.id) {
                self.insert_link(target, inverse, owner, Position::Back);
            }
            return Ok(());
        }
        match self.current_one(target, inverse) {
            Some(current) if current == owner => {}
            Some(current) => {
                self.unlink(target, inverse, current, false)?;
                self.insert_link(target, inverse, owner, Position::Back);
            }
            None => self.insert_link(target, inverse, owner, Position::Back),
        }
        Ok(())
    }

    /// Removes `target` from `owner.field` and applies the inverse.
    ///
    /// `cascade` is set by record deletion, the only path allowed to empty an
    /// id relation.
    pub(crate) fn unlink(
        &self,
        owner: RecordRef,
        field: usize,
        target: RecordRef,
        cascade: bool,
    ) -> StoreResult<()> {
        if !self.has_link(owner, field, target.id) {
            return Ok(());
        }
        let schema = self.schema();
        let resolved = schema.field(owner.model, field);
        let inverse = resolved
            .inverse
            .filter(|inverse| self.has_link(target, *inverse, owner.id));
        if !cascade {
            if resolved.id_position.is_some() {
                let (model, field) = self.names(owner.model, field);
                return Err(StoreError::IdentityChange { model, field });
            }
            if let Some(inverse) = inverse {
                if schema.field(target.model, inverse).id_position.is_some() {
                    let (model, field) = self.names(target.model, inverse);
                    return Err(StoreError::IdentityChange { model, field });
                }
            }
        }
        self.remove_link(owner, field, target);
        if let Some(inverse) = inverse {
            self.remove_link(target, inverse, owner);
        }
        Ok(())
    }

    fn insert_link(&self, owner: RecordRef, field: usize, target: RecordRef, position: Position) {
        let schema = self.schema();
        let resolved = schema.field(owner.model, field);
        let mut guard = self.core_mut();
        let state = &mut *guard;
        let Some(slot) = state.registry.get_mut(owner.id) else {
            return;
        };
        match &mut slot.fields[field].value {
            FieldValue::One(value) => *value = Some(target.id),
            FieldValue::Many(ids) => match position {
                Position::Back => ids.push(target.id),
                Position::Front(index) => ids.insert(index.min(ids.len()), target.id),
            },
            FieldValue::Attr(_) => return,
        }
        state.registry.add_referrer(target.id, owner.id, field);
        if resolved.def.on_add.is_some() {
            state.queues.links.push_back(LinkEvent {
                owner,
                field,
                other: target,
                added: true,
            });
        }
        if resolved.def.on_update.is_some() {
            state.queues.queue_update(owner, field);
        }
        if resolved.def.is_sorted() {
            state.invalidate(schema, NodeKey::sort(owner.id, field));
        }
        state.touch(schema, FieldRef::Field(owner.id, field));
        if self.config().log_mutations {
            debug!(
                "event=link module=store status=ok model={} field={}",
                schema.model(owner.model).name,
                resolved.def.name()
            );
        }
    }

    fn remove_link(&self, owner: RecordRef, field: usize, target: RecordRef) {
        let schema = self.schema();
        let resolved = schema.field(owner.model, field);
        let mut guard = self.core_mut();
        let state = &mut *guard;
        let Some(slot) = state.registry.get_mut(owner.id) else {
            return;
        };
        match &mut slot.fields[field].value {
            FieldValue::One(value) => {
                if *value == Some(target.id) {
                    *value = None;
                }
            }
            FieldValue::Many(ids) => ids.retain(|id| *id != target.id),
            FieldValue::Attr(_) => return,
        }
        state.registry.remove_referrer(target.id, owner.id, field);
        if resolved.def.on_delete.is_some() {
            state.queues.links.push_back(LinkEvent {
                owner,
                field,
                other: target,
                added: false,
            });
        }
        if resolved.def.on_update.is_some() {
            state.queues.queue_update(owner, field);
        }
        state.touch(schema, FieldRef::Field(owner.id, field));
        if self.config().log_mutations {
            debug!(
                "event=unlink module=store status=ok model={} field={}",
                schema.model(owner.model).name,
                resolved.def.name()
            );
        }
    }

    /// Turns relation input into a record of the target model, inserting it
    /// when raw data is given.
    pub(crate) fn coerce_target(
        &self,
        owner: RecordRef,
        field: usize,
        input: Input,
        options: InsertOptions,
    ) -> StoreResult<RecordRef> {
        let schema = self.schema();
        let resolved = schema.field(owner.model, field);
        let target_model = self.target_model(owner.model, field)?;
        match input {
            Input::Record(record) => {
                let reference = self.own_record(&record)?;
                self.expect_target(owner, field, reference)?;
                self.ensure_live(reference)?;
                Ok(reference)
            }
            Input::Data(mut data) => {
                if let Some(inverse) = resolved.inverse {
                    let inverse_field = schema.field(target_model, inverse);
                    let name = inverse_field.def.name();
                    if inverse_field.id_position.is_some() && !data.contains(name) {
                        data.insert(name, Record::from_ref(self.clone(), owner));
                    }
                }
                self.insert_one(target_model, Input::Data(data), options)
            }
            Input::Value(value) => self.insert_one(target_model, Input::Value(value), options),
            other => Err(self.invalid_input(
                owner.model,
                field,
                format!("cannot link a {}", other.kind_name()),
            )),
        }
    }

    /// Resolves relation input to an existing record without creating one.
    pub(crate) fn find_target(
        &self,
        owner: RecordRef,
        field: usize,
        input: Input,
    ) -> StoreResult<Option<RecordRef>> {
        let target_model = self.target_model(owner.model, field)?;
        match input {
            Input::Record(record) => {
                let reference = self.own_record(&record)?;
                self.expect_target(owner, field, reference)?;
                Ok(Some(reference))
            }
            other => Ok(self
                .lookup_identity(target_model, other)?
                .map(|id| RecordRef {
                    id,
                    model: target_model,
                })),
        }
    }

    /// Upsert: resolves identity, creates the record when absent, then applies
    /// the supplied fields in declaration order.
    pub(crate) fn insert_one(
        &self,
        model: usize,
        input: Input,
        options: InsertOptions,
    ) -> StoreResult<RecordRef> {
        let mut data = match self.inbound(model, input)? {
            Inbound::Existing(reference) => {
                self.ensure_live(reference)?;
                return Ok(reference);
            }
            Inbound::Data(data) => data,
        };
        self.validate_data(model, &data)?;
        let key = match self.identity_key(model, &mut data, options, true)? {
            Some(key) => key,
            None => {
                return Err(StoreError::MissingIdentity {
                    model: self.model_name(model).to_string(),
                    field: "id".to_string(),
                })
            }
        };
        let existing = self.core().registry.lookup(model, &key);
        let record = match existing {
            Some(id) => RecordRef { id, model },
            None => self.create_record(model, key),
        };
        self.apply_data(record, data, options)?;
        Ok(record)
    }

    /// Rejects unknown and computed fields before anything is written.
    pub(crate) fn validate_data(&self, model: usize, data: &Data) -> StoreResult<()> {
        for name in data.keys() {
            let field = self.field_index(model, name)?;
            if self.schema().field(model, field).def.is_computed() {
                return Err(StoreError::ComputedFieldWrite {
                    model: self.model_name(model).to_string(),
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn apply_data(
        &self,
        record: RecordRef,
        mut data: Data,
        options: InsertOptions,
    ) -> StoreResult<()> {
        let schema = self.schema();
        for (field, resolved) in schema.model(record.model).fields.iter().enumerate() {
            if let Some(input) = data.take(resolved.def.name()) {
                self.write_field(record, field, input, options, Origin::User)?;
            }
        }
        Ok(())
    }

    /// Looks a record up by inbound identity data. Never creates records.
    pub(crate) fn lookup_identity(
        &self,
        model: usize,
        input: Input,
    ) -> StoreResult<Option<LocalId>> {
        let mut data = match self.inbound(model, input)? {
            Inbound::Existing(reference) => {
                return Ok(self.is_live(reference).then_some(reference.id))
            }
            Inbound::Data(data) => data,
        };
        let Some(key) = self.identity_key(model, &mut data, InsertOptions::default(), false)? else {
            return Ok(None);
        };
        Ok(self.core().registry.lookup(model, &key))
    }

    fn inbound(&self, model: usize, input: Input) -> StoreResult<Inbound> {
        let resolved = self.schema().model(model);
        let single_id = match resolved.id_fields.as_slice() {
            [single] => Some(&resolved.fields[*single]),
            _ => None,
        };
        match input {
            Input::Record(record) => {
                let reference = self.own_record(&record)?;
                if reference.model == model {
                    return Ok(Inbound::Existing(reference));
                }
                match single_id {
                    Some(id_field) if id_field.target == Some(reference.model) => Ok(Inbound::Data(
                        Data::new().field(id_field.def.name(), record),
                    )),
                    _ => Err(StoreError::WrongModel {
                        expected: resolved.name.clone(),
                        actual: self.model_name(reference.model).to_string(),
                    }),
                }
            }
            Input::Data(data) => Ok(Inbound::Data(data)),
            Input::Value(value) => match single_id {
                Some(id_field) => Ok(Inbound::Data(Data::new().field(id_field.def.name(), value))),
                None => Err(StoreError::InvalidInput {
                    model: resolved.name.clone(),
                    field: "id".to_string(),
                    detail: if resolved.is_singleton() {
                        "singleton models are inserted from data".to_string()
                    } else {
                        "a bare value needs a single id field".to_string()
                    },
                }),
            },
            other => Err(StoreError::InvalidInput {
                model: resolved.name.clone(),
                field: "id".to_string(),
                detail: format!("cannot insert a {}", other.kind_name()),
            }),
        }
    }

    /// Builds the identity key from inbound data.
    ///
    /// With `create`, relation ids given as raw data are inserted and replaced
    /// by the resulting record in `data`; without it, an unknown relation id
    /// yields `None`.
    fn identity_key(
        &self,
        model: usize,
        data: &mut Data,
        options: InsertOptions,
        create: bool,
    ) -> StoreResult<Option<IdentityKey>> {
        let resolved = self.schema().model(model);
        let mut parts = Vec::with_capacity(resolved.id_fields.len());
        for index in &resolved.id_fields {
            let field = &resolved.fields[*index];
            let name = field.def.name();
            let invalid = |detail: String| StoreError::InvalidIdentity {
                model: resolved.name.clone(),
                field: name.to_string(),
                detail,
            };
            let Some(input) = data.get(name).cloned() else {
                return Err(StoreError::MissingIdentity {
                    model: resolved.name.clone(),
                    field: name.to_string(),
                });
            };
            match (field.def.kind(), field.target) {
                (FieldKind::Attr, _) => {
                    let raw = match input {
                        Input::Value(raw) => raw,
                        other => {
                            return Err(invalid(format!(
                                "expected a value, got a {}",
                                other.kind_name()
                            )))
                        }
                    };
                    let value = coerce_attr(raw, field.def.attr_type, false, false);
                    let part = KeyPart::from_value(&value)
                        .ok_or_else(|| invalid("value kind cannot identify a record".to_string()))?;
                    parts.push(part);
                }
                (FieldKind::One { .. }, Some(target)) => {
                    let reference = match input {
                        Input::Record(record) => {
                            let reference = self.own_record(&record)?;
                            if reference.model != target {
                                return Err(StoreError::WrongModel {
                                    expected: self.model_name(target).to_string(),
                                    actual: record.model().to_string(),
                                });
                            }
                            reference
                        }
                        other if create => {
                            let reference = self.insert_one(target, other, options)?;
                            data.insert(name, Record::from_ref(self.clone(), reference));
                            reference
                        }
                        other => match self.lookup_identity(target, other)? {
                            Some(id) => RecordRef { id, model: target },
                            None => return Ok(None),
                        },
                    };
                    parts.push(KeyPart::Record(reference.id));
                }
                _ => return Err(invalid("relation ids must be one-relations".to_string())),
            }
        }
        Ok(Some(IdentityKey(parts)))
    }

    fn create_record(&self, model: usize, key: IdentityKey) -> RecordRef {
        let resolved = self.schema().model(model);
        let fields = resolved
            .fields
            .iter()
            .map(|field| {
                let value = match field.def.kind() {
                    FieldKind::Attr => FieldValue::Attr(field.def.default.clone()),
                    FieldKind::One { .. } => FieldValue::One(None),
                    FieldKind::Many { .. } => FieldValue::Many(Vec::new()),
                };
                FieldSlot::new(value, field.def.is_computed())
            })
            .collect();
        let mut state = self.core_mut();
        let id = state.registry.insert(model, key, fields);
        for (index, field) in resolved.fields.iter().enumerate() {
            if field.def.is_eager() {
                state.queues.computes.push_back(NodeKey::compute(id, index));
            }
        }
        if self.config().log_mutations {
            debug!(
                "event=record_create module=store status=ok model={}",
                resolved.name
            );
        }
        RecordRef { id, model }
    }

    /// Unlinks every relation of `record`, removes it from lookups and queues
    /// its finalization.
    ///
    /// Records identified through a relation to `record` stay live with that
    /// relation emptied, but leave the identity index.
    pub(crate) fn delete_record(&self, record: RecordRef) -> StoreResult<()> {
        if !self.is_live(record) {
            return Ok(());
        }
        let schema = self.schema();
        for (field, resolved) in schema.model(record.model).fields.iter().enumerate() {
            match resolved.def.kind() {
                FieldKind::Attr => {}
                FieldKind::One { .. } => {
                    if let Some(target) = self.current_one(record, field) {
                        self.unlink(record, field, target, true)?;
                    }
                }
                FieldKind::Many { .. } => {
                    for target in self.current_many(record, field).into_iter().rev() {
                        self.unlink(record, field, target, true)?;
                    }
                }
            }
        }
        let referrers = self.core().registry.referrers(record.id);
        let mut orphans = Vec::new();
        for (owner, field) in referrers {
            let owner_model = self.core().registry.get(owner).map(|slot| slot.model);
            if let Some(model) = owner_model {
                self.unlink(RecordRef { id: owner, model }, field, record, true)?;
                if schema.field(model, field).id_position.is_some() {
                    orphans.push(owner);
                }
            }
        }

        let mut state = self.core_mut();
        // Their identity names a dead record; no lookup can reach them again.
        for owner in orphans {
            state.registry.drop_lookup(owner);
        }
        state.registry.unindex(record.id);
        state.queues.finalize.push_back(record.id);
        if self.config().log_mutations {
            debug!(
                "event=record_delete module=store status=ok model={}",
                schema.model(record.model).name
            );
        }
        Ok(())
    }

    /// Drops a deleted record's slot and graph nodes, touching its fields so
    /// readers observe the emptied values.
    pub(crate) fn finalize(&self, id: LocalId) {
        let schema = self.schema();
        let mut guard = self.core_mut();
        let state = &mut *guard;
        let Some(slot) = state.registry.remove(id) else {
            return;
        };
        for field in 0..slot.fields.len() {
            state.graph.clear_node(NodeKey::compute(id, field));
            state.graph.clear_node(NodeKey::sort(id, field));
            let reference = FieldRef::Field(id, field);
            state.touch(schema, reference.clone());
            state.graph.forget_field(&reference);
        }
    }

    pub(crate) fn has_link(&self, owner: RecordRef, field: usize, target: LocalId) -> bool {
        let state = self.core();
        state
            .registry
            .get(owner.id)
            .is_some_and(|slot| match &slot.fields[field].value {
                FieldValue::One(value) => *value == Some(target),
                FieldValue::Many(ids) => ids.contains(&target),
                FieldValue::Attr(_) => false,
            })
    }

    pub(crate) fn current_one(&self, record: RecordRef, field: usize) -> Option<RecordRef> {
        let model = self.schema().field(record.model, field).target?;
        let state = self.core();
        let id = state.registry.get(record.id)?.fields[field].value.as_one()?;
        Some(RecordRef { id, model })
    }

    pub(crate) fn current_many(&self, record: RecordRef, field: usize) -> Vec<RecordRef> {
        let Some(model) = self.schema().field(record.model, field).target else {
            return Vec::new();
        };
        let state = self.core();
        state
            .registry
            .get(record.id)
            .map(|slot| {
                slot.fields[field]
                    .value
                    .as_many()
                    .iter()
                    .map(|id| RecordRef { id: *id, model })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn target_model(&self, model: usize, field: usize) -> StoreResult<usize> {
        self.schema().field(model, field).target.ok_or_else(|| {
            let (model, field) = self.names(model, field);
            StoreError::FieldKindMismatch {
                model,
                field,
                expected: "a relation",
            }
        })
    }

    fn expect_target(&self, owner: RecordRef, field: usize, target: RecordRef) -> StoreResult<()> {
        let expected = self.target_model(owner.model, field)?;
        if expected == target.model {
            return Ok(());
        }
        Err(StoreError::WrongModel {
            expected: self.model_name(expected).to_string(),
            actual: self.model_name(target.model).to_string(),
        })
    }

    /// An id relation only ever links the record named by the identity key.
    fn check_id_link(&self, owner: RecordRef, field: usize, target: RecordRef) -> StoreResult<()> {
        let Some(position) = self.schema().field(owner.model, field).id_position else {
            return Ok(());
        };
        let matches = self
            .core()
            .registry
            .get(owner.id)
            .is_some_and(|slot| slot.key.0.get(position) == Some(&KeyPart::Record(target.id)));
        if matches {
            return Ok(());
        }
        let (model, field) = self.names(owner.model, field);
        Err(StoreError::IdentityChange { model, field })
    }

    fn own_record(&self, record: &Record) -> StoreResult<RecordRef> {
        if record.store().ptr_eq(self) {
            return Ok(record.reference());
        }
        Err(StoreError::InvalidInput {
            model: record.model().to_string(),
            field: "id".to_string(),
            detail: "record belongs to another store".to_string(),
        })
    }

    fn invalid_input(&self, model: usize, field: usize, detail: String) -> StoreError {
        let (model, field) = self.names(model, field);
        StoreError::InvalidInput {
            model,
            field,
            detail,
        }
    }
}
