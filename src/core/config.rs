//! Pipeline definition from YAML
//!
//! The file format the CLI edits offline; building it populates the
//! task registry and the stage configuration store.

use crate::core::pipeline::{Member, Pipeline, Trigger};
use crate::core::task::{ModelError, StageType, TaskType};
use crate::schema::store::ConfigStore;
use crate::schema::{ConfigMap, StageKey};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level pipeline definition loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// GitLab project id the pipeline belongs to
    pub project_id: String,

    /// Branch the pipeline builds
    pub branch: String,

    /// Trigger configuration
    #[serde(default)]
    pub trigger: TriggerDefinition,

    /// Pipeline members
    #[serde(default)]
    pub members: Vec<Member>,

    /// Tasks in order
    pub tasks: Vec<TaskDefinition>,
}

/// Task entry as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: TaskType,

    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

/// Stage entry as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    #[serde(rename = "type")]
    pub kind: StageType,

    /// Partial local-form config; unset fields take schema defaults
    #[serde(default)]
    pub config: ConfigMap,
}

/// Trigger section of the definition file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerDefinition {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default)]
    pub schedule_type: Option<String>,

    #[serde(default)]
    pub schedule_time: Option<String>,
}

impl TriggerDefinition {
    fn to_trigger(&self) -> Trigger {
        match self.kind.as_deref() {
            Some("auto") => Trigger::Auto {
                events: self.events.clone(),
            },
            Some("schedule") => Trigger::Schedule {
                schedule_type: self.schedule_type.clone().unwrap_or_default(),
                schedule_time: self.schedule_time.clone().unwrap_or_default(),
            },
            _ => Trigger::Manual,
        }
    }
}

impl PipelineDefinition {
    /// Parse a definition from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse pipeline definition")
    }

    /// Load a definition from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        Self::from_yaml(&content)
    }

    /// Build the in-memory pipeline and fill the configuration store.
    ///
    /// Model invariants (unique names, one stage of each type per task)
    /// are enforced here, so an invalid file fails loudly instead of
    /// producing a half-built registry.
    pub fn to_pipeline(&self, store: &mut ConfigStore) -> Result<Pipeline, ModelError> {
        let mut pipeline = Pipeline::new(self.project_id.clone(), self.branch.clone());
        pipeline.trigger = self.trigger.to_trigger();
        pipeline.members = self.members.clone();

        for task_def in &self.tasks {
            let task_id = pipeline.registry.add_task(&task_def.name, task_def.kind)?;
            for stage_def in &task_def.stages {
                let stage_id = pipeline.registry.add_stage(task_id, stage_def.kind)?;
                let key = StageKey::new(task_id, stage_id);
                store.get_or_default(key, task_def.kind, stage_def.kind);
                if !stage_def.config.is_empty() {
                    store.set(key, task_def.kind, stage_def.kind, stage_def.config.clone());
                }
            }
        }

        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EXAMPLE: &str = r#"
project_id: "42"
branch: develop
trigger:
  type: auto
  events: [push]
members:
  - name: admin
    role: maintainer
tasks:
  - name: backend
    type: maven
    stages:
      - type: compile
        config:
          jdkVersion: "17"
      - type: deploy
  - name: frontend
    type: npm
    stages:
      - type: compile
"#;

    #[test]
    fn test_definition_builds_pipeline_and_store() {
        let def = PipelineDefinition::from_yaml(EXAMPLE).unwrap();
        let mut store = ConfigStore::new();
        let pipeline = def.to_pipeline(&mut store).unwrap();

        assert_eq!(pipeline.registry.len(), 2);
        assert_eq!(pipeline.trigger, Trigger::Auto { events: vec!["push".to_string()] });

        let backend = pipeline.registry.task_by_name("backend").unwrap();
        let compile = &backend.stages[0];
        let config = store
            .get(StageKey::new(backend.id, compile.id))
            .unwrap();
        assert_eq!(config["jdkVersion"], json!("17"));
        // Unset fields filled from schema defaults
        assert_eq!(config["artifactFormat"], json!("jar"));
    }

    #[test]
    fn test_definition_rejects_duplicate_stage() {
        let yaml = r#"
project_id: "42"
branch: develop
tasks:
  - name: backend
    type: maven
    stages:
      - type: compile
      - type: compile
"#;
        let def = PipelineDefinition::from_yaml(yaml).unwrap();
        let mut store = ConfigStore::new();
        assert!(matches!(
            def.to_pipeline(&mut store),
            Err(ModelError::DuplicateStage { .. })
        ));
    }
}
