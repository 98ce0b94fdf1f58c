//! pipewright - a CI/CD pipeline definition editor and synchronization engine

pub mod cli;
pub mod core;
pub mod editor;
pub mod reconcile;
pub mod schema;
pub mod session;
pub mod sync;

// Re-export commonly used types
pub use crate::core::{
    Pipeline, PipelineDefinition, PipelineRecord, StageType, TaskRegistry, TaskType,
};
pub use editor::{EditorState, StageEditor};
pub use schema::{ConfigMap, ConfigStore, StageKey, SyncState};
pub use session::{EditSession, SessionError, SubmitReport};
pub use sync::{ApiError, ConfigApi, FlushReport, HttpConfigApi, PushOutcome, SyncEngine};
