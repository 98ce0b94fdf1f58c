//! Stage configuration schemas and storage

pub mod registry;
pub mod store;

pub use registry::{default_config, from_wire, schema_for, to_wire, ConfigMap};
pub use store::{ConfigStore, StageKey, SyncState, WireOutcome};
