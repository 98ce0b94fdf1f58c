//! Remote configuration API
//!
//! The transport is an external collaborator: the engine only sees this
//! trait, so tests inject a scripted implementation and the CLI injects
//! the HTTP one.

use crate::core::pipeline::PipelineRecord;
use crate::core::task::{StageType, TaskType};
use crate::schema::ConfigMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from the remote configuration API
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// API answered with a non-2xx status code
    #[error("API error (status {status}): {message}")]
    Status {
        status: u16,
        message: String,
    },

    /// API answered 2xx but reported failure in its envelope
    #[error("API rejected request: {0}")]
    Rejected(String),

    /// Response body did not match the expected shape
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }
}

/// Payload for the maven/npm compile config endpoints
#[derive(Debug, Clone, Serialize)]
pub struct StageConfigRequest {
    pub project_id: String,
    pub branch: String,
    pub task_name: String,
    pub stage_configs: BTreeMap<String, ConfigMap>,
    pub sync_to_gitlab: bool,
}

/// Payload for the deploy config endpoint; note the `deploy_config`
/// key, which this endpoint uses instead of `stage_configs`.
#[derive(Debug, Clone, Serialize)]
pub struct DeployConfigRequest {
    pub project_id: String,
    pub branch: String,
    pub task_name: String,
    pub template_type: TaskType,
    pub deploy_config: ConfigMap,
    pub sync_to_gitlab: bool,
}

/// Payload for the generic batch stage-config update
#[derive(Debug, Clone, Serialize)]
pub struct BatchUpdateRequest {
    pub project_id: String,
    pub branch: String,
    pub task_name: String,
    pub template_type: TaskType,
    pub stage_config: BTreeMap<String, BatchStageEntry>,
    pub sync_to_gitlab: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStageEntry {
    pub enabled: bool,
    pub config: ConfigMap,
}

/// Payload for the stage enable/disable endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StageToggleRequest {
    pub project_id: String,
    pub branch: String,
    pub task_name: String,
    pub stage_name: StageType,
    pub enabled: bool,
    pub sync_to_gitlab: bool,
}

/// Task tree as the get-tasks-with-stages endpoint returns it
#[derive(Debug, Clone, Deserialize)]
pub struct TaskWithStages {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub stages: Vec<StageWithConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageWithConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Option<ConfigMap>,
}

/// Result of the remote task-create call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedTask {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
}

/// Result of persisting the pipeline record
#[derive(Debug, Clone, Deserialize)]
pub struct SavedPipeline {
    pub id: i64,
}

/// Per-stage enabled flags, keyed by stage type name (`"on"`/`"off"`)
pub type StageStatusMap = BTreeMap<String, String>;

/// The remote store's configuration API surface
#[async_trait]
pub trait ConfigApi: Send + Sync {
    /// Create or update the pipeline record
    async fn save_pipeline(
        &self,
        id: Option<i64>,
        record: &PipelineRecord,
    ) -> Result<SavedPipeline, ApiError>;

    /// Fetch a pipeline record by id
    async fn get_pipeline(&self, id: i64) -> Result<PipelineRecord, ApiError>;

    /// Fetch the structured task tree; empty when the record predates it
    async fn get_tasks_with_stages(&self, id: i64) -> Result<Vec<TaskWithStages>, ApiError>;

    /// Create a task remotely
    async fn create_task(
        &self,
        project_id: &str,
        branch: &str,
        name: &str,
        kind: TaskType,
    ) -> Result<CreatedTask, ApiError>;

    /// Delete a task remotely (best-effort from the caller's view)
    async fn delete_task(&self, project_id: &str, branch: &str, name: &str)
        -> Result<(), ApiError>;

    /// Maven compile config update
    async fn update_maven_config(&self, req: &StageConfigRequest) -> Result<(), ApiError>;

    /// NPM compile config update
    async fn update_npm_config(&self, req: &StageConfigRequest) -> Result<(), ApiError>;

    /// Deploy config update
    async fn update_deploy_config(&self, req: &DeployConfigRequest) -> Result<(), ApiError>;

    /// Generic batch stage-config update
    async fn batch_update(&self, req: &BatchUpdateRequest) -> Result<(), ApiError>;

    /// Enable or disable a single stage
    async fn toggle_stage(&self, req: &StageToggleRequest) -> Result<(), ApiError>;

    /// Enabled/disabled state of a task's stages
    async fn stage_status(
        &self,
        project_id: &str,
        branch: &str,
        task_name: &str,
    ) -> Result<StageStatusMap, ApiError>;

    /// Stored config of one stage, if the remote store has one
    async fn get_task_config(
        &self,
        pipeline_id: i64,
        task_name: &str,
        stage: StageType,
    ) -> Result<Option<ConfigMap>, ApiError>;
}
