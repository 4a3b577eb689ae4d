//! Reactive relational record store.
//! Records with attribute and relation fields, inverse maintenance, computed
//! fields and read-tracking observers, all in memory.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;

pub use config::{default_log_level, ConfigError, LogConfig, StoreConfig};
pub use error::{SchemaError, StoreError, StoreResult};
pub use logging::{init_logging, logging_status};
pub use model::{AttrType, Field, FieldKind, IdSpec, Markup, ModelDef, Schema, Value};
pub use store::input::{Command, Data, Input, InsertOptions};
pub use store::list::RecordList;
pub use store::observe::{Observer, View};
pub use store::record::{Record, RecordSnapshot};
pub use store::registry::{FieldValue, LocalId};
pub use store::{ModelHandle, Store};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
