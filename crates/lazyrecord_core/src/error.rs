//! Error taxonomy for schema registration and store operations.
//!
//! # Responsibility
//! - Separate declaration-time failures (`SchemaError`) from runtime store
//!   failures (`StoreError`).
//! - Keep messages metadata-only: model/field names, never field payloads.
//!
//! # Invariants
//! - Schema and usage faults surface at the call site; they are never
//!   swallowed or converted into empty values.
//! - Collaborator failures (hooks, compute functions, sort comparators) are
//!   carried unchanged to the caller of the triggering mutation.

use crate::config::ConfigError;
use crate::store::registry::LocalId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while registering models or building a store from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Model or field name does not match the identifier grammar.
    InvalidName(String),
    /// Model name was registered twice in one schema.
    DuplicateModel(String),
    /// Field name appears twice in one model.
    DuplicateField { model: String, field: String },
    /// Relation field names a model that is not registered.
    UnknownTarget {
        model: String,
        field: String,
        target: String,
    },
    /// Inverse names a field that does not exist on the target model.
    UnknownInverse {
        model: String,
        field: String,
        inverse: String,
    },
    /// Inverse exists but does not point back to the declaring field.
    InverseMismatch {
        model: String,
        field: String,
        inverse: String,
    },
    /// Id declaration names a field that cannot carry identity.
    InvalidIdField { model: String, field: String },
    /// Field option is not valid for the field kind.
    InvalidFieldOption {
        model: String,
        field: String,
        option: &'static str,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid model or field name: `{name}`"),
            Self::DuplicateModel(name) => write!(f, "model already registered: {name}"),
            Self::DuplicateField { model, field } => {
                write!(f, "field `{field}` declared twice on model {model}")
            }
            Self::UnknownTarget {
                model,
                field,
                target,
            } => write!(
                f,
                "relation {model}.{field} targets unregistered model {target}"
            ),
            Self::UnknownInverse {
                model,
                field,
                inverse,
            } => write!(
                f,
                "relation {model}.{field} declares unknown inverse `{inverse}`"
            ),
            Self::InverseMismatch {
                model,
                field,
                inverse,
            } => write!(
                f,
                "relation {model}.{field} and inverse `{inverse}` do not point at each other"
            ),
            Self::InvalidIdField { model, field } => {
                write!(f, "field `{field}` cannot be used as identity of {model}")
            }
            Self::InvalidFieldOption {
                model,
                field,
                option,
            } => write!(f, "option `{option}` is not valid on {model}.{field}"),
        }
    }
}

impl Error for SchemaError {}

/// Errors raised by record store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Schema could not be resolved.
    Schema(SchemaError),
    /// Store configuration failed validation.
    Config(ConfigError),
    /// Model name is not registered in this store.
    UnknownModel(String),
    /// Field name does not exist on the model.
    UnknownField { model: String, field: String },
    /// Direct write to a computed field.
    ComputedFieldWrite { model: String, field: String },
    /// Field exists but has a different kind than the accessor expects.
    FieldKindMismatch {
        model: String,
        field: String,
        expected: &'static str,
    },
    /// Inbound data lacks a value for an id field.
    MissingIdentity { model: String, field: String },
    /// Id value cannot be turned into an identity key.
    InvalidIdentity {
        model: String,
        field: String,
        detail: String,
    },
    /// Write would change the identity of a live record.
    IdentityChange { model: String, field: String },
    /// Record of one model given where another model is expected.
    WrongModel { expected: String, actual: String },
    /// Input shape is not accepted by the field.
    InvalidInput {
        model: String,
        field: String,
        detail: String,
    },
    /// Write addressed to a deleted record.
    DeadRecord { model: String, local_id: LocalId },
    /// Compute function or sort comparator tried to mutate the store.
    MutationInCompute { model: String, field: String },
    /// Computed field depends on itself.
    CyclicCompute { model: String, field: String },
    /// Deferred work did not settle within the configured job limit.
    FlushLimitExceeded(usize),
    /// Failure raised by caller-provided hook or compute code.
    Callback(String),
}

impl StoreError {
    /// Builds a collaborator failure from any displayable message.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }

    /// Stable short code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema",
            Self::Config(_) => "config",
            Self::UnknownModel(_) => "unknown_model",
            Self::UnknownField { .. } => "unknown_field",
            Self::ComputedFieldWrite { .. } => "computed_field_write",
            Self::FieldKindMismatch { .. } => "field_kind_mismatch",
            Self::MissingIdentity { .. } => "missing_identity",
            Self::InvalidIdentity { .. } => "invalid_identity",
            Self::IdentityChange { .. } => "identity_change",
            Self::WrongModel { .. } => "wrong_model",
            Self::InvalidInput { .. } => "invalid_input",
            Self::DeadRecord { .. } => "dead_record",
            Self::MutationInCompute { .. } => "mutation_in_compute",
            Self::CyclicCompute { .. } => "cyclic_compute",
            Self::FlushLimitExceeded(_) => "flush_limit_exceeded",
            Self::Callback(_) => "callback",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::UnknownModel(name) => write!(f, "model not registered: {name}"),
            Self::UnknownField { model, field } => {
                write!(f, "field `{field}` does not exist on model {model}")
            }
            Self::ComputedFieldWrite { model, field } => {
                write!(f, "computed field {model}.{field} cannot be assigned")
            }
            Self::FieldKindMismatch {
                model,
                field,
                expected,
            } => write!(f, "field {model}.{field} is not {expected}"),
            Self::MissingIdentity { model, field } => {
                write!(f, "missing id field `{field}` for model {model}")
            }
            Self::InvalidIdentity {
                model,
                field,
                detail,
            } => write!(f, "invalid id value for {model}.{field}: {detail}"),
            Self::IdentityChange { model, field } => {
                write!(f, "id field {model}.{field} cannot change on a live record")
            }
            Self::WrongModel { expected, actual } => {
                write!(f, "expected record of model {expected}, got {actual}")
            }
            Self::InvalidInput {
                model,
                field,
                detail,
            } => write!(f, "invalid input for {model}.{field}: {detail}"),
            Self::DeadRecord { model, local_id } => {
                write!(f, "record {model}/{local_id} has been deleted")
            }
            Self::MutationInCompute { model, field } => write!(
                f,
                "store mutation attempted while computing {model}.{field}"
            ),
            Self::CyclicCompute { model, field } => {
                write!(f, "computed field {model}.{field} depends on itself")
            }
            Self::FlushLimitExceeded(limit) => {
                write!(f, "deferred work did not settle within {limit} jobs")
            }
            Self::Callback(message) => write!(f, "callback failed: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for StoreError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}
