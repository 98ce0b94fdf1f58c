//! HTTP implementation of the configuration API

use crate::core::pipeline::PipelineRecord;
use crate::core::task::{StageType, TaskType};
use crate::schema::ConfigMap;
use crate::sync::api::{
    ApiError, BatchUpdateRequest, ConfigApi, CreatedTask, DeployConfigRequest, SavedPipeline,
    StageConfigRequest, StageStatusMap, StageToggleRequest, TaskWithStages,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

/// Client for the remote pipeline configuration service
#[derive(Debug, Clone)]
pub struct HttpConfigApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpConfigApi {
    /// Create a client against the given base URL (e.g.
    /// `http://localhost:5000/api`)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check the HTTP status and the `{success, data|error}` envelope,
    /// returning the raw body value.
    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::status(status.as_u16(), message));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unspecified error")
                .to_string();
            return Err(ApiError::Rejected(message));
        }
        Ok(body)
    }

    async fn post_json(&self, path: &str, payload: &impl serde::Serialize) -> Result<Value, ApiError> {
        debug!("POST {}", path);
        let response = self.client.post(self.url(path)).json(payload).send().await?;
        self.handle_response(response).await
    }

    fn extract<T: DeserializeOwned>(body: Value, pointer: &str) -> Result<T, ApiError> {
        let value = if pointer.is_empty() {
            body
        } else {
            body.pointer(pointer)
                .cloned()
                .ok_or_else(|| ApiError::Parse(format!("missing field {pointer}")))?
        };
        serde_json::from_value(value).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ConfigApi for HttpConfigApi {
    async fn save_pipeline(
        &self,
        id: Option<i64>,
        record: &PipelineRecord,
    ) -> Result<SavedPipeline, ApiError> {
        let path = match id {
            Some(id) => format!("/pipelines/{id}"),
            None => "/pipelines".to_string(),
        };
        let body = self.post_json(&path, record).await?;
        // Updates may omit the id; fall back to the one we addressed
        let saved_id = body
            .get("pipeline_id")
            .and_then(Value::as_i64)
            .or(id)
            .ok_or_else(|| ApiError::Parse("missing pipeline_id".to_string()))?;
        Ok(SavedPipeline { id: saved_id })
    }

    async fn get_pipeline(&self, id: i64) -> Result<PipelineRecord, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/pipelines/{id}")))
            .send()
            .await?;
        let body = self.handle_response(response).await?;
        Self::extract(body, "/pipeline")
    }

    async fn get_tasks_with_stages(&self, id: i64) -> Result<Vec<TaskWithStages>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/pipelines/{id}/tasks")))
            .send()
            .await?;
        let body = self.handle_response(response).await?;
        if body.get("tasks").is_none() {
            return Ok(Vec::new());
        }
        Self::extract(body, "/tasks")
    }

    async fn create_task(
        &self,
        project_id: &str,
        branch: &str,
        name: &str,
        kind: TaskType,
    ) -> Result<CreatedTask, ApiError> {
        let payload = json!({
            "projectId": project_id,
            "branchName": branch,
            "taskName": name,
            "taskType": kind,
        });
        let body = self.post_json("/pipeline/task", &payload).await?;
        match body.get("task") {
            Some(task) => Self::extract(task.clone(), ""),
            None => Ok(CreatedTask::default()),
        }
    }

    async fn delete_task(
        &self,
        project_id: &str,
        branch: &str,
        name: &str,
    ) -> Result<(), ApiError> {
        let payload = json!({
            "projectId": project_id,
            "branchName": branch,
            "taskName": name,
        });
        self.post_json("/pipeline/task/delete", &payload).await?;
        Ok(())
    }

    async fn update_maven_config(&self, req: &StageConfigRequest) -> Result<(), ApiError> {
        self.post_json("/task_config/maven_config", req).await?;
        Ok(())
    }

    async fn update_npm_config(&self, req: &StageConfigRequest) -> Result<(), ApiError> {
        self.post_json("/task_config/npm_config", req).await?;
        Ok(())
    }

    async fn update_deploy_config(&self, req: &DeployConfigRequest) -> Result<(), ApiError> {
        self.post_json("/task_config/deploy_config", req).await?;
        Ok(())
    }

    async fn batch_update(&self, req: &BatchUpdateRequest) -> Result<(), ApiError> {
        self.post_json("/task_config/batch_update", req).await?;
        Ok(())
    }

    async fn toggle_stage(&self, req: &StageToggleRequest) -> Result<(), ApiError> {
        self.post_json("/task_config/stage_toggle", req).await?;
        Ok(())
    }

    async fn stage_status(
        &self,
        project_id: &str,
        branch: &str,
        task_name: &str,
    ) -> Result<StageStatusMap, ApiError> {
        let response = self
            .client
            .get(self.url("/task_config/stage_status"))
            .query(&[
                ("project_id", project_id),
                ("branch", branch),
                ("task_name", task_name),
            ])
            .send()
            .await?;
        let body = self.handle_response(response).await?;
        Self::extract(body, "/stages")
    }

    async fn get_task_config(
        &self,
        pipeline_id: i64,
        task_name: &str,
        stage: StageType,
    ) -> Result<Option<ConfigMap>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/task_config/{pipeline_id}/{task_name}")))
            .query(&[("stage_type", stage.as_str())])
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let body = self.handle_response(response).await?;
        Ok(body
            .pointer(&format!("/stages/{}", stage.as_str()))
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
    }
}
