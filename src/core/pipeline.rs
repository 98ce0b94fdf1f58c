//! Pipeline domain model and persistence record

use crate::core::task::{ModelError, TaskRegistry};
use crate::schema::store::ConfigStore;
use crate::schema::ConfigMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

/// How a pipeline run is triggered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Auto {
        events: Vec<String>,
    },
    Schedule {
        schedule_type: String,
        schedule_time: String,
    },
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::Manual
    }
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Auto { .. } => "auto",
            Trigger::Schedule { .. } => "schedule",
        }
    }

    /// Type-specific payload as stored in the `trigger_config` column
    pub fn config_json(&self) -> String {
        let payload = match self {
            Trigger::Manual => json!({}),
            Trigger::Auto { events } => json!({ "events": events }),
            Trigger::Schedule {
                schedule_type,
                schedule_time,
            } => json!({ "scheduleType": schedule_type, "scheduleTime": schedule_time }),
        };
        payload.to_string()
    }

    /// Rebuild a trigger from its persisted columns. Unparseable
    /// payloads degrade to an empty payload of the recorded type.
    pub fn from_columns(trigger_type: &str, trigger_config: &str) -> Trigger {
        let payload: serde_json::Value = serde_json::from_str(trigger_config).unwrap_or_else(|e| {
            if !trigger_config.is_empty() {
                warn!("unparseable trigger_config, using empty payload: {e}");
            }
            json!({})
        });
        match trigger_type {
            "auto" => Trigger::Auto {
                events: payload["events"]
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "schedule" => Trigger::Schedule {
                schedule_type: payload["scheduleType"].as_str().unwrap_or_default().to_string(),
                schedule_time: payload["scheduleTime"].as_str().unwrap_or_default().to_string(),
            },
            _ => Trigger::Manual,
        }
    }
}

/// A pipeline member (name, role)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub role: String,
}

/// The top-level CI/CD definition being edited
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Server-assigned identity; absent until the first save
    pub id: Option<i64>,

    pub project_id: String,
    pub branch: String,
    pub trigger: Trigger,
    pub members: Vec<Member>,

    /// The task tree
    pub registry: TaskRegistry,
}

impl Pipeline {
    pub fn new(project_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id: None,
            project_id: project_id.into(),
            branch: branch.into(),
            trigger: Trigger::Manual,
            members: Vec::new(),
            registry: TaskRegistry::new(),
        }
    }

    /// Required-field validation; blocks submission when it fails.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.project_id.trim().is_empty() {
            return Err(ModelError::MissingField("project_id"));
        }
        if self.branch.trim().is_empty() {
            return Err(ModelError::MissingField("branch"));
        }
        Ok(())
    }

    /// Build the persistence record: `task` as a JSON array of task
    /// objects (stages and local-form configs embedded), `stage` as a
    /// JSON array of arrays of stage type strings, one inner array per
    /// task. Both stay readable by the legacy reconciler.
    pub fn to_record(&self, store: &ConfigStore) -> PipelineRecord {
        let tasks: Vec<RecordTask> = self
            .registry
            .tasks()
            .iter()
            .map(|task| {
                let configs = store.task_configs(task.id);
                RecordTask {
                    id: Some(task.id.to_string()),
                    name: task.name.clone(),
                    kind: task.kind.to_string(),
                    stages: task
                        .stages
                        .iter()
                        .map(|stage| RecordStage {
                            id: Some(stage.id.to_string()),
                            kind: stage.kind.to_string(),
                            config: configs.get(&stage.id).cloned(),
                        })
                        .collect(),
                }
            })
            .collect();

        let stage_matrix: Vec<Vec<String>> = self
            .registry
            .tasks()
            .iter()
            .map(|t| t.stages.iter().map(|s| s.kind.to_string()).collect())
            .collect();

        PipelineRecord {
            id: self.id,
            project_id: self.project_id.trim().to_string(),
            branch: self.branch.trim().to_string(),
            task: serde_json::to_string(&tasks).unwrap_or_else(|_| "[]".to_string()),
            stage: serde_json::to_string(&stage_matrix).unwrap_or_else(|_| "[]".to_string()),
            trigger_type: self.trigger.kind().to_string(),
            trigger_config: self.trigger.config_json(),
            members: serde_json::to_string(&self.members).unwrap_or_else(|_| "[]".to_string()),
            updated_by: "system".to_string(),
            updated_at: None,
        }
    }
}

/// One task entry inside the record's `task` column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub stages: Vec<RecordStage>,
}

/// One stage entry inside a record task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigMap>,
}

/// The pipeline row as the remote store persists it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub project_id: String,
    pub branch: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_config: String,
    #[serde(default)]
    pub members: String,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{StageType, TaskType};
    use crate::schema::StageKey;

    #[test]
    fn test_validate_requires_project_and_branch() {
        let pipeline = Pipeline::new("", "develop");
        assert_eq!(pipeline.validate(), Err(ModelError::MissingField("project_id")));

        let pipeline = Pipeline::new("42", "  ");
        assert_eq!(pipeline.validate(), Err(ModelError::MissingField("branch")));

        assert!(Pipeline::new("42", "develop").validate().is_ok());
    }

    #[test]
    fn test_trigger_columns_round_trip() {
        let trigger = Trigger::Auto {
            events: vec!["push".to_string(), "merge".to_string()],
        };
        let rebuilt = Trigger::from_columns(trigger.kind(), &trigger.config_json());
        assert_eq!(rebuilt, trigger);

        let schedule = Trigger::Schedule {
            schedule_type: "daily".to_string(),
            schedule_time: "02:30".to_string(),
        };
        let rebuilt = Trigger::from_columns(schedule.kind(), &schedule.config_json());
        assert_eq!(rebuilt, schedule);
    }

    #[test]
    fn test_unparseable_trigger_config_degrades() {
        let trigger = Trigger::from_columns("auto", "{not json");
        assert_eq!(trigger, Trigger::Auto { events: vec![] });
    }

    #[test]
    fn test_record_stage_matrix_mirrors_tasks() {
        let mut pipeline = Pipeline::new("42", "develop");
        let a = pipeline.registry.add_task("a", TaskType::Maven).unwrap();
        let b = pipeline.registry.add_task("b", TaskType::Npm).unwrap();
        pipeline.registry.add_stage(a, StageType::Compile).unwrap();
        pipeline.registry.add_stage(a, StageType::Build).unwrap();
        pipeline.registry.add_stage(b, StageType::Deploy).unwrap();

        let mut store = ConfigStore::new();
        for task in pipeline.registry.tasks() {
            for stage in &task.stages {
                store.get_or_default(StageKey::new(task.id, stage.id), task.kind, stage.kind);
            }
        }

        let record = pipeline.to_record(&store);
        let matrix: Vec<Vec<String>> = serde_json::from_str(&record.stage).unwrap();
        assert_eq!(
            matrix,
            vec![
                vec!["compile".to_string(), "build".to_string()],
                vec!["deploy".to_string()],
            ]
        );

        let tasks: Vec<RecordTask> = serde_json::from_str(&record.task).unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks[0].stages[0].config.is_some());
    }
}
