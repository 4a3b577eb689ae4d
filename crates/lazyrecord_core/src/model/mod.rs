//! Declarative model layer: values, fields and schemas.
//!
//! # Responsibility
//! - Define how models and their fields are declared.
//! - Define the scalar value representation and attribute coercion.
//!
//! # Invariants
//! - A model's field set is fixed once it is registered in a `Schema`.
//! - Declarations carry no runtime state; stores are built from them.

pub mod field;
pub mod schema;
pub mod value;

pub use field::{ComputeFn, Field, FieldKind, LinkHook, SortFn, UpdateHook};
pub use schema::{IdSpec, ModelDef, Schema};
pub use value::{parse_datetime, AttrType, Markup, Value};
