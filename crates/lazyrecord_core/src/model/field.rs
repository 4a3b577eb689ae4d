//! Field declarations.
//!
//! # Responsibility
//! - Describe one field: kind, coercion, compute function, comparator, hooks.
//! - Offer a builder API used by `ModelDef` declarations.
//!
//! # Invariants
//! - A field belongs to exactly one model and never changes after the model
//!   is registered.
//! - Callbacks receive record handles; they never see raw storage.

use crate::error::StoreResult;
use crate::model::value::{AttrType, Value};
use crate::store::input::Input;
use crate::store::record::Record;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Derivation function of a computed field.
pub type ComputeFn = Rc<dyn Fn(&Record) -> StoreResult<Input>>;
/// Comparator of a sorted many-relation.
pub type SortFn = Rc<dyn Fn(&Record, &Record) -> StoreResult<Ordering>>;
/// Link hook: receives the owner of the changed field and the other record.
pub type LinkHook = Rc<dyn Fn(&Record, &Record) -> StoreResult<()>>;
/// Update hook: receives the record whose field value changed.
pub type UpdateHook = Rc<dyn Fn(&Record) -> StoreResult<()>>;

/// Field kind with relation target model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Scalar attribute.
    Attr,
    /// Zero-or-one reference.
    One { target: String },
    /// Ordered, duplicate-free references.
    Many { target: String },
}

/// One field declaration.
#[derive(Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) default: Value,
    pub(crate) attr_type: Option<AttrType>,
    pub(crate) html: bool,
    pub(crate) inverse: Option<String>,
    pub(crate) compute: Option<ComputeFn>,
    pub(crate) eager: bool,
    pub(crate) sort: Option<SortFn>,
    pub(crate) on_add: Option<LinkHook>,
    pub(crate) on_delete: Option<LinkHook>,
    pub(crate) on_update: Option<UpdateHook>,
}

impl Field {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: Value::Undefined,
            attr_type: None,
            html: false,
            inverse: None,
            compute: None,
            eager: false,
            sort: None,
            on_add: None,
            on_delete: None,
            on_update: None,
        }
    }

    /// Declares a scalar attribute.
    pub fn attr(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Attr)
    }

    /// Declares a zero-or-one relation to `target`.
    pub fn one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::One {
                target: target.into(),
            },
        )
    }

    /// Declares an ordered multi-valued relation to `target`.
    pub fn many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Many {
                target: target.into(),
            },
        )
    }

    /// Value a new record starts with. Attributes only.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    pub fn attr_type(mut self, attr_type: AttrType) -> Self {
        self.attr_type = Some(attr_type);
        self
    }

    /// Allows callers to insert trusted markup into this attribute.
    pub fn html(mut self) -> Self {
        self.html = true;
        self
    }

    /// Names the reciprocal field on the target model.
    pub fn inverse(mut self, field: impl Into<String>) -> Self {
        self.inverse = Some(field.into());
        self
    }

    /// Makes the field computed from other fields. Lazy unless `eager()`.
    pub fn compute<F, I>(mut self, compute: F) -> Self
    where
        F: Fn(&Record) -> StoreResult<I> + 'static,
        I: Into<Input>,
    {
        self.compute = Some(Rc::new(move |record: &Record| -> StoreResult<Input> {
            compute(record).map(Into::into)
        }));
        self
    }

    /// Recomputes on every dependency change instead of on read.
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Keeps a many-relation ordered by `compare`.
    pub fn sort<F>(mut self, compare: F) -> Self
    where
        F: Fn(&Record, &Record) -> StoreResult<Ordering> + 'static,
    {
        self.sort = Some(Rc::new(compare));
        self
    }

    pub fn on_add<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Record, &Record) -> StoreResult<()> + 'static,
    {
        self.on_add = Some(Rc::new(hook));
        self
    }

    pub fn on_delete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Record, &Record) -> StoreResult<()> + 'static,
    {
        self.on_delete = Some(Rc::new(hook));
        self
    }

    /// Fires once per logical change of the stored value.
    pub fn on_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Record) -> StoreResult<()> + 'static,
    {
        self.on_update = Some(Rc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_relation(&self) -> bool {
        !matches!(self.kind, FieldKind::Attr)
    }

    pub fn is_many(&self) -> bool {
        matches!(self.kind, FieldKind::Many { .. })
    }

    pub fn is_computed(&self) -> bool {
        self.compute.is_some()
    }

    pub fn is_eager(&self) -> bool {
        self.eager
    }

    pub fn is_sorted(&self) -> bool {
        self.sort.is_some()
    }

    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Attr => None,
            FieldKind::One { target } | FieldKind::Many { target } => Some(target.as_str()),
        }
    }

    pub fn inverse_name(&self) -> Option<&str> {
        self.inverse.as_deref()
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("inverse", &self.inverse)
            .field("computed", &self.compute.is_some())
            .field("eager", &self.eager)
            .field("sorted", &self.sort.is_some())
            .finish()
    }
}
