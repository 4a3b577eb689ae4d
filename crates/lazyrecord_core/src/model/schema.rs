//! Model declarations and the schema registry.
//!
//! # Responsibility
//! - Collect model declarations before any store exists.
//! - Validate declaration-level invariants at registration time.
//! - Resolve cross-model references (targets, inverses) when a store is built.
//!
//! # Invariants
//! - Model and field names match `^[A-Za-z_][A-Za-z0-9_]*$`.
//! - A model name is registered at most once per schema.
//! - Inverse pairs always point at each other once resolved; one-sided
//!   declarations are completed on the reciprocal field.
//! - Relation id fields are one-relations.

use crate::error::SchemaError;
use crate::model::field::{Field, FieldKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid name regex"));

/// Identity declaration of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSpec {
    /// Identity is the value of one field (attribute or one-relation).
    Field(String),
    /// Identity is the tuple of several field values.
    Fields(Vec<String>),
    /// Every insert resolves to the same record.
    Singleton,
}

impl IdSpec {
    fn names(&self) -> Vec<&str> {
        match self {
            Self::Field(name) => vec![name.as_str()],
            Self::Fields(names) => names.iter().map(String::as_str).collect(),
            Self::Singleton => vec![],
        }
    }
}

impl From<&str> for IdSpec {
    fn from(value: &str) -> Self {
        Self::Field(value.to_string())
    }
}

impl From<&[&str]> for IdSpec {
    fn from(value: &[&str]) -> Self {
        Self::Fields(value.iter().map(|name| (*name).to_string()).collect())
    }
}

/// Declarative shape of one model.
#[derive(Debug, Clone)]
pub struct ModelDef {
    name: String,
    id: IdSpec,
    fields: Vec<Field>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>, id: impl Into<IdSpec>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            fields: Vec::new(),
        }
    }

    /// Appends one field. Declaration order is the order fields are applied.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &IdSpec {
        &self.id
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Validates field-local invariants and declares implicit id attributes.
    fn normalize(mut self) -> Result<Self, SchemaError> {
        ensure_name(&self.name)?;

        let mut implicit = Vec::new();
        for id_name in self.id.names() {
            ensure_name(id_name)?;
            if !self.fields.iter().any(|field| field.name == id_name) {
                implicit.push(Field::attr(id_name));
            }
        }
        if matches!(&self.id, IdSpec::Fields(names) if names.is_empty()) {
            return Err(SchemaError::InvalidIdField {
                model: self.name.clone(),
                field: String::new(),
            });
        }
        implicit.append(&mut self.fields);
        self.fields = implicit;

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            ensure_name(&field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    model: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            self.check_options(field)?;
        }

        for id_name in self.id.names() {
            let field = self
                .fields
                .iter()
                .find(|field| field.name == id_name)
                .ok_or_else(|| SchemaError::InvalidIdField {
                    model: self.name.clone(),
                    field: id_name.to_string(),
                })?;
            if field.is_many() || field.is_computed() {
                return Err(SchemaError::InvalidIdField {
                    model: self.name.clone(),
                    field: id_name.to_string(),
                });
            }
        }

        Ok(self)
    }

    fn check_options(&self, field: &Field) -> Result<(), SchemaError> {
        let invalid = |option: &'static str| SchemaError::InvalidFieldOption {
            model: self.name.clone(),
            field: field.name.clone(),
            option,
        };
        match field.kind {
            FieldKind::Attr => {
                if field.inverse.is_some() {
                    return Err(invalid("inverse"));
                }
                if field.on_add.is_some() {
                    return Err(invalid("on_add"));
                }
                if field.on_delete.is_some() {
                    return Err(invalid("on_delete"));
                }
                if field.sort.is_some() {
                    return Err(invalid("sort"));
                }
            }
            FieldKind::One { .. } | FieldKind::Many { .. } => {
                if field.html {
                    return Err(invalid("html"));
                }
                if field.attr_type.is_some() {
                    return Err(invalid("type"));
                }
                if !field.default.is_undefined() {
                    return Err(invalid("default"));
                }
                if field.sort.is_some() && !field.is_many() {
                    return Err(invalid("sort"));
                }
            }
        }
        if field.eager && field.compute.is_none() {
            return Err(invalid("eager"));
        }
        Ok(())
    }
}

/// Registry of model declarations.
///
/// A schema is an explicit value: tests build one per case, so registration
/// is reversible by dropping it.
#[derive(Debug, Default)]
pub struct Schema {
    models: Vec<ModelDef>,
    by_name: BTreeMap<String, usize>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one model after declaration validation.
    pub fn register(&mut self, model: ModelDef) -> Result<(), SchemaError> {
        let model = model.normalize()?;
        if self.by_name.contains_key(model.name.as_str()) {
            return Err(SchemaError::DuplicateModel(model.name));
        }
        self.by_name.insert(model.name.clone(), self.models.len());
        self.models.push(model);
        Ok(())
    }

    /// Chaining variant of [`Schema::register`].
    pub fn with(mut self, model: ModelDef) -> Result<Self, SchemaError> {
        self.register(model)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ModelDef> {
        self.by_name.get(name).map(|index| &self.models[*index])
    }

    /// Returns registered model names in registration order.
    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|model| model.name.as_str()).collect()
    }

    /// Resolves relation targets and inverse pairs.
    pub(crate) fn resolve(self) -> Result<ResolvedSchema, SchemaError> {
        let by_name: HashMap<String, usize> = self
            .models
            .iter()
            .enumerate()
            .map(|(index, model)| (model.name.clone(), index))
            .collect();

        let mut models = Vec::with_capacity(self.models.len());
        for model in &self.models {
            let mut fields = Vec::with_capacity(model.fields.len());
            for field in &model.fields {
                let target = match field.target() {
                    Some(target) => Some(*by_name.get(target).ok_or_else(|| {
                        SchemaError::UnknownTarget {
                            model: model.name.clone(),
                            field: field.name.clone(),
                            target: target.to_string(),
                        }
                    })?),
                    None => None,
                };
                let id_position = model
                    .id
                    .names()
                    .iter()
                    .position(|name| *name == field.name);
                fields.push(ResolvedField {
                    def: field.clone(),
                    target,
                    inverse: None,
                    id_position,
                });
            }
            let field_index = fields
                .iter()
                .enumerate()
                .map(|(index, field)| (field.def.name.clone(), index))
                .collect();
            let id_fields = model
                .id
                .names()
                .iter()
                .filter_map(|name| fields.iter().position(|field| field.def.name == *name))
                .collect();
            models.push(ResolvedModel {
                name: model.name.clone(),
                id_fields,
                fields,
                field_index,
            });
        }

        link_inverses(&mut models)?;
        Ok(ResolvedSchema { models, by_name })
    }
}

fn link_inverses(models: &mut [ResolvedModel]) -> Result<(), SchemaError> {
    let mut pairs = Vec::new();
    for (model_index, model) in models.iter().enumerate() {
        for (field_index, field) in model.fields.iter().enumerate() {
            let Some(inverse_name) = field.def.inverse.as_deref() else {
                continue;
            };
            let mismatch = || SchemaError::InverseMismatch {
                model: model.name.clone(),
                field: field.def.name.clone(),
                inverse: inverse_name.to_string(),
            };
            let Some(target_index) = field.target else {
                return Err(mismatch());
            };
            let target = &models[target_index];
            let Some(inverse_index) = target.field_index.get(inverse_name).copied() else {
                return Err(SchemaError::UnknownInverse {
                    model: model.name.clone(),
                    field: field.def.name.clone(),
                    inverse: inverse_name.to_string(),
                });
            };
            let inverse = &target.fields[inverse_index];
            if inverse.target != Some(model_index) {
                return Err(mismatch());
            }
            if let Some(back) = inverse.def.inverse.as_deref() {
                if back != field.def.name {
                    return Err(mismatch());
                }
            }
            if target_index == model_index && inverse_index == field_index {
                return Err(mismatch());
            }
            pairs.push(((model_index, field_index), (target_index, inverse_index)));
        }
    }

    for ((model, field), (target, inverse)) in pairs {
        for (owner, slot, other_model, other) in [
            (model, field, target, inverse),
            (target, inverse, model, field),
        ] {
            let existing = models[owner].fields[slot].inverse;
            if existing.is_some_and(|existing| existing != other) {
                return Err(SchemaError::InverseMismatch {
                    model: models[owner].name.clone(),
                    field: models[owner].fields[slot].def.name.clone(),
                    inverse: models[other_model].fields[other].def.name.clone(),
                });
            }
            models[owner].fields[slot].inverse = Some(other);
        }
    }
    Ok(())
}

fn ensure_name(name: &str) -> Result<(), SchemaError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidName(name.to_string()))
    }
}

/// Schema with cross-model references resolved to indices.
pub(crate) struct ResolvedSchema {
    models: Vec<ResolvedModel>,
    by_name: HashMap<String, usize>,
}

pub(crate) struct ResolvedModel {
    pub(crate) name: String,
    /// Field indices forming the identity, in declaration order of the id.
    pub(crate) id_fields: Vec<usize>,
    pub(crate) fields: Vec<ResolvedField>,
    field_index: HashMap<String, usize>,
}

pub(crate) struct ResolvedField {
    pub(crate) def: Field,
    pub(crate) target: Option<usize>,
    pub(crate) inverse: Option<usize>,
    /// Position inside the identity key when this is an id field.
    pub(crate) id_position: Option<usize>,
}

impl ResolvedSchema {
    pub(crate) fn len(&self) -> usize {
        self.models.len()
    }

    pub(crate) fn model(&self, index: usize) -> &ResolvedModel {
        &self.models[index]
    }

    pub(crate) fn model_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn field(&self, model: usize, field: usize) -> &ResolvedField {
        &self.models[model].fields[field]
    }
}

impl ResolvedModel {
    pub(crate) fn field_index(&self, name: &str) -> Option<usize> {
        self.field_index.get(name).copied()
    }

    pub(crate) fn is_singleton(&self) -> bool {
        self.id_fields.is_empty()
    }
}
