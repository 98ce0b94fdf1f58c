//! Mock configuration API for deterministic, fast unit tests

use async_trait::async_trait;
use pipewright::core::PipelineRecord;
use pipewright::schema::ConfigMap;
use pipewright::sync::api::{
    ApiError, BatchUpdateRequest, ConfigApi, CreatedTask, DeployConfigRequest, SavedPipeline,
    StageConfigRequest, StageStatusMap, StageToggleRequest, TaskWithStages,
};
use pipewright::{StageType, TaskType};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One recorded call against the mock
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: &'static str,
    pub task_name: String,
    pub config: ConfigMap,
    pub enabled: Option<bool>,
}

/// Mock API with scripted outcomes
///
/// This is useful for:
/// - Fast, deterministic tests without a running backend
/// - Testing debounce and retry behavior
/// - Testing the submit flush barrier with artificial delays
/// - Asserting on the exact wire payloads the engine produces
#[derive(Default)]
pub struct MockConfigApi {
    /// Scripted push outcomes, consumed in call order; exhausted = Ok
    push_results: Mutex<VecDeque<Result<(), String>>>,

    /// Scripted per-push delays, consumed in call order
    push_delays: Mutex<VecDeque<Duration>>,

    /// Scripted toggle outcomes, consumed in call order; exhausted = Ok
    toggle_results: Mutex<VecDeque<Result<(), String>>>,

    calls: Mutex<Vec<RecordedCall>>,
    saved_records: Mutex<Vec<PipelineRecord>>,

    pipeline: Mutex<Option<PipelineRecord>>,
    tasks: Mutex<Vec<TaskWithStages>>,
    stage_status: Mutex<StageStatusMap>,
    remote_config: Mutex<Option<ConfigMap>>,
}

impl MockConfigApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_push_results(self, results: Vec<Result<(), String>>) -> Self {
        *self.push_results.lock().unwrap() = results.into_iter().collect();
        self
    }

    pub fn with_push_delays(self, delays: Vec<Duration>) -> Self {
        *self.push_delays.lock().unwrap() = delays.into_iter().collect();
        self
    }

    pub fn with_toggle_results(self, results: Vec<Result<(), String>>) -> Self {
        *self.toggle_results.lock().unwrap() = results.into_iter().collect();
        self
    }

    pub fn with_pipeline(self, record: PipelineRecord) -> Self {
        *self.pipeline.lock().unwrap() = Some(record);
        self
    }

    pub fn with_tasks(self, tasks: Vec<TaskWithStages>) -> Self {
        *self.tasks.lock().unwrap() = tasks;
        self
    }

    pub fn with_stage_status(self, status: StageStatusMap) -> Self {
        *self.stage_status.lock().unwrap() = status;
        self
    }

    pub fn with_remote_config(self, config: ConfigMap) -> Self {
        *self.remote_config.lock().unwrap() = Some(config);
        self
    }

    /// All recorded config pushes (maven/npm/deploy/batch)
    pub fn push_calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.endpoint != "stage_toggle")
            .cloned()
            .collect()
    }

    pub fn push_count(&self) -> usize {
        self.push_calls().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn saved_records(&self) -> Vec<PipelineRecord> {
        self.saved_records.lock().unwrap().clone()
    }

    async fn push(
        &self,
        endpoint: &'static str,
        task_name: &str,
        config: ConfigMap,
    ) -> Result<(), ApiError> {
        let delay = self.push_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint,
            task_name: task_name.to_string(),
            config,
            enabled: None,
        });
        let result = self.push_results.lock().unwrap().pop_front();
        match result {
            Some(Err(message)) => Err(ApiError::status(500, message)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ConfigApi for MockConfigApi {
    async fn save_pipeline(
        &self,
        id: Option<i64>,
        record: &PipelineRecord,
    ) -> Result<SavedPipeline, ApiError> {
        self.saved_records.lock().unwrap().push(record.clone());
        Ok(SavedPipeline { id: id.unwrap_or(1) })
    }

    async fn get_pipeline(&self, id: i64) -> Result<PipelineRecord, ApiError> {
        self.pipeline
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::status(404, format!("pipeline {id} not found")))
    }

    async fn get_tasks_with_stages(&self, _id: i64) -> Result<Vec<TaskWithStages>, ApiError> {
        Ok(self.tasks.lock().unwrap().clone())
    }

    async fn create_task(
        &self,
        _project_id: &str,
        _branch: &str,
        name: &str,
        _kind: TaskType,
    ) -> Result<CreatedTask, ApiError> {
        Ok(CreatedTask {
            id: Some(format!("srv-{name}")),
            operation: Some("created".to_string()),
        })
    }

    async fn delete_task(
        &self,
        _project_id: &str,
        _branch: &str,
        name: &str,
    ) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: "delete_task",
            task_name: name.to_string(),
            config: ConfigMap::new(),
            enabled: None,
        });
        Ok(())
    }

    async fn update_maven_config(&self, req: &StageConfigRequest) -> Result<(), ApiError> {
        let config = req.stage_configs.get("compile").cloned().unwrap_or_default();
        self.push("maven_config", &req.task_name, config).await
    }

    async fn update_npm_config(&self, req: &StageConfigRequest) -> Result<(), ApiError> {
        let config = req.stage_configs.get("compile").cloned().unwrap_or_default();
        self.push("npm_config", &req.task_name, config).await
    }

    async fn update_deploy_config(&self, req: &DeployConfigRequest) -> Result<(), ApiError> {
        self.push("deploy_config", &req.task_name, req.deploy_config.clone())
            .await
    }

    async fn batch_update(&self, req: &BatchUpdateRequest) -> Result<(), ApiError> {
        let config = req
            .stage_config
            .get("build")
            .map(|entry| entry.config.clone())
            .unwrap_or_default();
        self.push("batch_update", &req.task_name, config).await
    }

    async fn toggle_stage(&self, req: &StageToggleRequest) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: "stage_toggle",
            task_name: req.task_name.clone(),
            config: ConfigMap::new(),
            enabled: Some(req.enabled),
        });
        let result = self.toggle_results.lock().unwrap().pop_front();
        match result {
            Some(Err(message)) => Err(ApiError::Rejected(message)),
            _ => Ok(()),
        }
    }

    async fn stage_status(
        &self,
        _project_id: &str,
        _branch: &str,
        _task_name: &str,
    ) -> Result<StageStatusMap, ApiError> {
        Ok(self.stage_status.lock().unwrap().clone())
    }

    async fn get_task_config(
        &self,
        _pipeline_id: i64,
        _task_name: &str,
        _stage: StageType,
    ) -> Result<Option<ConfigMap>, ApiError> {
        Ok(self.remote_config.lock().unwrap().clone())
    }
}
