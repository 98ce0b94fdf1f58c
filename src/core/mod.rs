//! Core domain models

pub mod config;
pub mod pipeline;
pub mod task;

pub use config::PipelineDefinition;
pub use pipeline::{Member, Pipeline, PipelineRecord, RecordStage, RecordTask, Trigger};
pub use task::{ModelError, Stage, StageType, Task, TaskRegistry, TaskType};
