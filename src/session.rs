//! Pipeline edit session
//!
//! Ties the task registry, configuration store, synchronization engine
//! and stage editor together behind the operations the UI layer calls:
//! task and stage management, the editor lifecycle, loading a persisted
//! pipeline and the validate-save-flush submit flow.

use crate::core::pipeline::{Pipeline, RecordStage, RecordTask};
use crate::core::task::{ModelError, StageType, TaskType};
use crate::editor::StageEditor;
use crate::reconcile;
use crate::schema::store::ConfigStore;
use crate::schema::{ConfigMap, StageKey};
use crate::sync::api::{ApiError, ConfigApi, StageToggleRequest};
use crate::sync::engine::{FlushReport, PushOutcome, PushSpec, SyncEngine};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors surfaced by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("no stage editor open")]
    EditorClosed,
}

/// Result of a successful submit
#[derive(Debug)]
pub struct SubmitReport {
    pub pipeline_id: i64,
    pub flush: FlushReport,
}

/// One editing session over a pipeline definition
pub struct EditSession<A: ConfigApi + 'static> {
    api: Arc<A>,
    pub pipeline: Pipeline,
    store: Arc<Mutex<ConfigStore>>,
    engine: SyncEngine<A>,
    editor: StageEditor,
}

impl<A: ConfigApi + 'static> EditSession<A> {
    /// Start a fresh session for a pipeline not yet persisted
    pub fn new(api: Arc<A>, project_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self::with_pipeline(api, Pipeline::new(project_id, branch), ConfigStore::new())
    }

    fn with_pipeline(api: Arc<A>, pipeline: Pipeline, store: ConfigStore) -> Self {
        let store = Arc::new(Mutex::new(store));
        let engine = SyncEngine::new(Arc::clone(&api), Arc::clone(&store));
        Self {
            api,
            pipeline,
            store,
            engine,
            editor: StageEditor::new(),
        }
    }

    /// Override the engine's debounce and retry timing
    pub fn with_timing(mut self, debounce: Duration, retry_delay: Duration) -> Self {
        self.engine = self.engine.with_timing(debounce, retry_delay);
        self
    }

    /// Build a session from a YAML pipeline definition
    pub fn from_definition(
        api: Arc<A>,
        definition: &crate::core::PipelineDefinition,
    ) -> Result<Self, ModelError> {
        let mut store = ConfigStore::new();
        let pipeline = definition.to_pipeline(&mut store)?;
        Ok(Self::with_pipeline(api, pipeline, store))
    }

    /// Load a persisted pipeline. The structured task tree is preferred;
    /// records that predate it go through the legacy reconciler.
    pub async fn load(api: Arc<A>, pipeline_id: i64) -> Result<Self, ApiError> {
        let mut record = api.get_pipeline(pipeline_id).await?;
        record.id = record.id.or(Some(pipeline_id));

        let mut store = ConfigStore::new();
        let pipeline = match api.get_tasks_with_stages(pipeline_id).await {
            Ok(tasks) if !tasks.is_empty() => {
                debug!("loading pipeline {pipeline_id} from structured task tree");
                let tasks: Vec<RecordTask> = tasks
                    .into_iter()
                    .map(|t| RecordTask {
                        id: t.id,
                        name: t.name,
                        kind: t.kind,
                        stages: t
                            .stages
                            .into_iter()
                            .map(|s| RecordStage {
                                id: s.id,
                                kind: s.kind,
                                config: s.config,
                            })
                            .collect(),
                    })
                    .collect();
                reconcile::reconcile_structured(&record, &tasks, &mut store)
            }
            Ok(_) => reconcile::reconcile(&record, &mut store),
            Err(e) => {
                warn!("tasks-with-stages unavailable, reconciling legacy record: {e}");
                reconcile::reconcile(&record, &mut store)
            }
        };

        Ok(Self::with_pipeline(api, pipeline, store))
    }

    /// Shared handle to the configuration store
    pub fn store(&self) -> Arc<Mutex<ConfigStore>> {
        Arc::clone(&self.store)
    }

    pub fn editor(&self) -> &StageEditor {
        &self.editor
    }

    // ------------------------------------------------------------------
    // Task and stage management
    // ------------------------------------------------------------------

    /// Add a task locally and announce it to the remote store. The task
    /// keeps its client id even when the remote call fails; identity is
    /// assigned lazily by the next successful sync.
    pub async fn add_task(&mut self, name: &str, kind: TaskType) -> Result<Uuid, SessionError> {
        let task_id = self.pipeline.registry.add_task(name, kind)?;

        if self.has_project_context() {
            match self
                .api
                .create_task(&self.pipeline.project_id, &self.pipeline.branch, name, kind)
                .await
            {
                Ok(created) => {
                    if let Some(op) = &created.operation {
                        info!("remote {op} of task '{name}'");
                    }
                    if let Some(task) = self.pipeline.registry.task_mut(task_id) {
                        task.server_id = created.id;
                    }
                }
                Err(e) => warn!("remote create for task '{name}' failed, keeping local: {e}"),
            }
        }
        Ok(task_id)
    }

    pub fn rename_task(&mut self, task_id: Uuid, new_name: &str) -> Result<(), ModelError> {
        self.pipeline.registry.rename_task(task_id, new_name)
    }

    /// Remove a task locally at once; a previously persisted task also
    /// gets a best-effort remote delete that does not block removal.
    pub async fn remove_task(&mut self, task_id: Uuid) -> Result<(), ModelError> {
        let task = self
            .pipeline
            .registry
            .remove_task(task_id)
            .ok_or(ModelError::UnknownTask(task_id))?;

        for stage in &task.stages {
            self.engine
                .cancel_pending(StageKey::new(task_id, stage.id))
                .await;
        }
        self.store.lock().await.remove_task(task_id);
        if self.editor.current_stage().map(|k| k.task) == Some(task_id) {
            self.editor.cancel();
        }

        if self.pipeline.id.is_some() && self.has_project_context() {
            let api = Arc::clone(&self.api);
            let project_id = self.pipeline.project_id.clone();
            let branch = self.pipeline.branch.clone();
            let name = task.name.clone();
            tokio::spawn(async move {
                if let Err(e) = api.delete_task(&project_id, &branch, &name).await {
                    warn!("best-effort remote delete of task '{name}' failed: {e}");
                }
            });
        }
        Ok(())
    }

    /// Add a stage directly (outside the editor flow), with its default
    /// config in the store.
    pub async fn add_stage(
        &mut self,
        task_id: Uuid,
        kind: StageType,
    ) -> Result<Uuid, ModelError> {
        let stage_id = self.pipeline.registry.add_stage(task_id, kind)?;
        let task_kind = self.task_kind(task_id)?;
        self.store
            .lock()
            .await
            .get_or_default(StageKey::new(task_id, stage_id), task_kind, kind);
        Ok(stage_id)
    }

    pub async fn remove_stage(&mut self, task_id: Uuid, stage_id: Uuid) -> Result<(), ModelError> {
        let key = StageKey::new(task_id, stage_id);
        self.pipeline
            .registry
            .remove_stage(task_id, stage_id)
            .ok_or(ModelError::UnknownStage(stage_id))?;
        self.engine.cancel_pending(key).await;
        self.store.lock().await.remove_stage(key);
        if self.editor.current_stage() == Some(key) {
            self.editor.cancel();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stage editor lifecycle
    // ------------------------------------------------------------------

    /// "Add stage": enter stage-type selection for a task
    pub fn begin_add_stage(&mut self, task_id: Uuid) -> Result<(), ModelError> {
        if self.pipeline.registry.task(task_id).is_none() {
            return Err(ModelError::UnknownTask(task_id));
        }
        self.editor.begin_select(task_id);
        Ok(())
    }

    /// A stage type was chosen: create the stage and open its panel
    /// with the schema default config. A duplicate stage type leaves
    /// the selection open.
    pub async fn choose_stage_type(&mut self, kind: StageType) -> Result<StageKey, SessionError> {
        let task_id = self.editor.selecting_task().ok_or(SessionError::EditorClosed)?;
        let stage_id = self.pipeline.registry.add_stage(task_id, kind)?;
        let task_kind = self.task_kind(task_id)?;

        let key = StageKey::new(task_id, stage_id);
        let config = self.store.lock().await.get_or_default(key, task_kind, kind);
        self.editor.open(key, kind, config, true);
        Ok(key)
    }

    /// Open the panel on an existing stage. Config resolution order:
    /// store cache, then the remote store, then the schema default.
    pub async fn open_stage(&mut self, task_id: Uuid, stage_id: Uuid) -> Result<(), SessionError> {
        let task = self
            .pipeline
            .registry
            .task(task_id)
            .ok_or(ModelError::UnknownTask(task_id))?;
        let stage = task.stage(stage_id).ok_or(ModelError::UnknownStage(stage_id))?;
        let (task_kind, task_name, stage_kind) = (task.kind, task.name.clone(), stage.kind);

        let key = StageKey::new(task_id, stage_id);
        let cached = self.store.lock().await.get(key).cloned();
        let config = match cached {
            Some(config) => config,
            None => match self.fetch_remote_config(&task_name, task_kind, stage_kind).await {
                Some(config) => {
                    let mut store = self.store.lock().await;
                    store.import(key, task_kind, stage_kind, config);
                    store.get(key).cloned().unwrap_or_default()
                }
                None => self.store.lock().await.get_or_default(key, task_kind, stage_kind),
            },
        };

        let enabled = self.fetch_stage_enabled(&task_name, stage_kind).await;
        self.editor.open(key, stage_kind, config, enabled);
        Ok(())
    }

    async fn fetch_remote_config(
        &self,
        task_name: &str,
        task_kind: TaskType,
        stage_kind: StageType,
    ) -> Option<ConfigMap> {
        let pipeline_id = self.pipeline.id?;
        match self
            .api
            .get_task_config(pipeline_id, task_name, stage_kind)
            .await
        {
            Ok(config) => config,
            Err(e) => {
                debug!("remote config fetch for {task_name}.{stage_kind} ({task_kind}) failed, using defaults: {e}");
                None
            }
        }
    }

    /// Enabled flag from the stage-status endpoint; enabled by default
    /// when the status cannot be fetched.
    async fn fetch_stage_enabled(&self, task_name: &str, stage_kind: StageType) -> bool {
        if !self.has_project_context() {
            return true;
        }
        match self
            .api
            .stage_status(&self.pipeline.project_id, &self.pipeline.branch, task_name)
            .await
        {
            Ok(status) => status
                .get(stage_kind.as_str())
                .map(|s| s == "on")
                .unwrap_or(true),
            Err(e) => {
                debug!("stage status fetch failed, assuming enabled: {e}");
                true
            }
        }
    }

    /// Apply one field edit in the open panel and restart that stage's
    /// autosave timer with the updated draft.
    pub async fn edit_field(&mut self, field: &str, value: Value) -> Result<(), SessionError> {
        let (key, _) = self.editor.editing_context().ok_or(SessionError::EditorClosed)?;
        let snapshot = self
            .editor
            .edit_field(field, value)
            .ok_or(SessionError::EditorClosed)?;
        let spec = self.push_spec(key, Some(snapshot))?;
        self.engine.schedule_autosave(spec).await;
        Ok(())
    }

    /// Save the open panel: commit the draft and push immediately.
    pub async fn save_stage(&mut self) -> Result<PushOutcome, SessionError> {
        let (key, _, draft) = self.editor.begin_save().ok_or(SessionError::EditorClosed)?;
        let spec = self.push_spec(key, Some(draft))?;
        let outcome = self.engine.push_now(spec).await;
        self.editor.finish_save();
        Ok(outcome)
    }

    /// Close the panel, discarding draft edits that never reached the
    /// store. An already-dispatched push still runs to completion.
    pub async fn cancel_editor(&mut self) {
        if let Some(key) = self.editor.cancel() {
            self.engine.cancel_pending(key).await;
        }
    }

    /// Flip the stage-enabled toggle. The call goes out immediately,
    /// independent of the debounce timer, and the flag reverts if the
    /// call fails.
    pub async fn set_stage_enabled(&mut self, enabled: bool) -> Result<(), SessionError> {
        let (key, stage_kind) = self.editor.editing_context().ok_or(SessionError::EditorClosed)?;
        let task = self
            .pipeline
            .registry
            .task(key.task)
            .ok_or(ModelError::UnknownTask(key.task))?;

        let previous = self.editor.set_enabled(enabled).ok_or(SessionError::EditorClosed)?;
        let req = StageToggleRequest {
            project_id: self.pipeline.project_id.clone(),
            branch: self.pipeline.branch.clone(),
            task_name: task.name.clone(),
            stage_name: stage_kind,
            enabled,
            sync_to_gitlab: true,
        };
        if let Err(e) = self.api.toggle_stage(&req).await {
            self.editor.set_enabled(previous);
            return Err(e.into());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Submit
    // ------------------------------------------------------------------

    /// Validate, persist the pipeline record, then flush every stage
    /// config that still needs a sync. The returned future resolves
    /// only after all pushes, including in-flight autosaves and their
    /// retries, have completed.
    pub async fn submit(&mut self) -> Result<SubmitReport, SessionError> {
        // Force-collect the open panel before anything else
        if let Some((key, _, draft)) = self.editor.begin_save() {
            if let Ok((task_kind, _, stage_kind)) = self.stage_meta(key) {
                self.store.lock().await.set(key, task_kind, stage_kind, draft);
            }
            self.editor.finish_save();
        }

        self.pipeline.validate()?;

        // Stages never opened still get their defaults persisted
        {
            let mut store = self.store.lock().await;
            for task in self.pipeline.registry.tasks() {
                for stage in &task.stages {
                    store.get_or_default(StageKey::new(task.id, stage.id), task.kind, stage.kind);
                }
            }
        }

        let record = {
            let store = self.store.lock().await;
            self.pipeline.to_record(&store)
        };
        let saved = self.api.save_pipeline(self.pipeline.id, &record).await?;
        self.pipeline.id = Some(saved.id);
        info!("pipeline {} saved, flushing stage configs", saved.id);

        let mut candidates = Vec::new();
        for task in self.pipeline.registry.tasks() {
            for stage in &task.stages {
                candidates.push(PushSpec {
                    key: StageKey::new(task.id, stage.id),
                    task_kind: task.kind,
                    stage_kind: stage.kind,
                    task_name: task.name.clone(),
                    project_id: self.pipeline.project_id.clone(),
                    branch: self.pipeline.branch.clone(),
                    draft: None,
                });
            }
        }
        let flush = self.engine.flush(candidates).await;
        if !flush.is_success() {
            warn!("{} stage config(s) failed to sync", flush.failures.len());
        }

        Ok(SubmitReport {
            pipeline_id: saved.id,
            flush,
        })
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn has_project_context(&self) -> bool {
        !self.pipeline.project_id.trim().is_empty() && !self.pipeline.branch.trim().is_empty()
    }

    fn task_kind(&self, task_id: Uuid) -> Result<TaskType, ModelError> {
        self.pipeline
            .registry
            .task(task_id)
            .map(|t| t.kind)
            .ok_or(ModelError::UnknownTask(task_id))
    }

    fn stage_meta(&self, key: StageKey) -> Result<(TaskType, String, StageType), ModelError> {
        let task = self
            .pipeline
            .registry
            .task(key.task)
            .ok_or(ModelError::UnknownTask(key.task))?;
        let stage = task
            .stage(key.stage)
            .ok_or(ModelError::UnknownStage(key.stage))?;
        Ok((task.kind, task.name.clone(), stage.kind))
    }

    fn push_spec(&self, key: StageKey, draft: Option<ConfigMap>) -> Result<PushSpec, ModelError> {
        let (task_kind, task_name, stage_kind) = self.stage_meta(key)?;
        Ok(PushSpec {
            key,
            task_kind,
            stage_kind,
            task_name,
            project_id: self.pipeline.project_id.clone(),
            branch: self.pipeline.branch.clone(),
            draft,
        })
    }
}
