//! Task and stage domain model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by registry and pipeline invariants
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("task '{task}' already has a {stage_type} stage")]
    DuplicateStage { task: String, stage_type: StageType },

    #[error("a task named '{0}' already exists")]
    DuplicateTaskName(String),

    #[error("task name must not be empty")]
    EmptyTaskName,

    #[error("unknown task {0}")]
    UnknownTask(Uuid),

    #[error("unknown stage {0}")]
    UnknownStage(Uuid),

    #[error("required field '{0}' is missing")]
    MissingField(&'static str),
}

/// Kind of work a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Maven,
    Npm,
    Scan,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Maven => "maven",
            TaskType::Npm => "npm",
            TaskType::Scan => "scan",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "maven" => Ok(TaskType::Maven),
            "npm" => Ok(TaskType::Npm),
            "scan" => Ok(TaskType::Scan),
            other => Err(format!("unknown task type '{other}'")),
        }
    }
}

/// One phase of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    Compile,
    Build,
    Deploy,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Compile => "compile",
            StageType::Build => "build",
            StageType::Deploy => "deploy",
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "compile" => Ok(StageType::Compile),
            "build" => Ok(StageType::Build),
            "deploy" => Ok(StageType::Deploy),
            other => Err(format!("unknown stage type '{other}'")),
        }
    }
}

/// A single stage belonging to a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Client-generated identity, stable for the editing session
    pub id: Uuid,

    /// Stage kind; at most one of each kind per task
    pub kind: StageType,
}

impl Stage {
    pub fn new(kind: StageType) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }
}

/// A named unit of work containing ordered stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Client-generated identity; preserved as the sync key even after
    /// the remote store assigns its own id
    pub id: Uuid,

    /// Identity assigned by the remote store, if any
    pub server_id: Option<String>,

    /// Unique within the pipeline, non-empty
    pub name: String,

    pub kind: TaskType,

    /// Ordered stages
    pub stages: Vec<Stage>,
}

impl Task {
    pub fn new(name: String, kind: TaskType) -> Self {
        Self {
            id: Uuid::new_v4(),
            server_id: None,
            name,
            kind,
            stages: Vec::new(),
        }
    }

    /// Look up a stage by id
    pub fn stage(&self, stage_id: Uuid) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    /// Whether a stage of the given kind already exists
    pub fn has_stage(&self, kind: StageType) -> bool {
        self.stages.iter().any(|s| s.kind == kind)
    }
}

/// The in-memory tree of tasks for the pipeline being edited
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn task_by_name(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Add a task, enforcing a unique, non-empty name
    pub fn add_task(&mut self, name: &str, kind: TaskType) -> Result<Uuid, ModelError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ModelError::EmptyTaskName);
        }
        if self.task_by_name(name).is_some() {
            return Err(ModelError::DuplicateTaskName(name.to_string()));
        }
        let task = Task::new(name.to_string(), kind);
        let id = task.id;
        self.tasks.push(task);
        Ok(id)
    }

    /// Rename a task, enforcing the same invariants as `add_task`
    pub fn rename_task(&mut self, id: Uuid, new_name: &str) -> Result<(), ModelError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(ModelError::EmptyTaskName);
        }
        if self.tasks.iter().any(|t| t.name == new_name && t.id != id) {
            return Err(ModelError::DuplicateTaskName(new_name.to_string()));
        }
        let task = self.task_mut(id).ok_or(ModelError::UnknownTask(id))?;
        task.name = new_name.to_string();
        Ok(())
    }

    /// Remove a task and all of its stages
    pub fn remove_task(&mut self, id: Uuid) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(idx))
    }

    /// Append a stage to a task.
    ///
    /// Fails with `DuplicateStage` if the task already holds a stage of
    /// this kind; the task's stage list is left unchanged.
    pub fn add_stage(&mut self, task_id: Uuid, kind: StageType) -> Result<Uuid, ModelError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(ModelError::UnknownTask(task_id))?;
        if task.has_stage(kind) {
            return Err(ModelError::DuplicateStage {
                task: task.name.clone(),
                stage_type: kind,
            });
        }
        let stage = Stage::new(kind);
        let id = stage.id;
        task.stages.push(stage);
        Ok(id)
    }

    pub fn remove_stage(&mut self, task_id: Uuid, stage_id: Uuid) -> Option<Stage> {
        let task = self.task_mut(task_id)?;
        let idx = task.stages.iter().position(|s| s.id == stage_id)?;
        Some(task.stages.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_task_rejects_empty_and_duplicate_names() {
        let mut registry = TaskRegistry::new();
        assert_eq!(registry.add_task("  ", TaskType::Maven), Err(ModelError::EmptyTaskName));

        registry.add_task("backend", TaskType::Maven).unwrap();
        assert_eq!(
            registry.add_task("backend", TaskType::Npm),
            Err(ModelError::DuplicateTaskName("backend".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_stage_leaves_count_unchanged() {
        let mut registry = TaskRegistry::new();
        let task_id = registry.add_task("backend", TaskType::Maven).unwrap();

        registry.add_stage(task_id, StageType::Compile).unwrap();
        let err = registry.add_stage(task_id, StageType::Compile).unwrap_err();

        assert!(matches!(err, ModelError::DuplicateStage { .. }));
        assert_eq!(registry.task(task_id).unwrap().stages.len(), 1);
    }

    #[test]
    fn test_remove_task_cascades_stages() {
        let mut registry = TaskRegistry::new();
        let task_id = registry.add_task("backend", TaskType::Maven).unwrap();
        registry.add_stage(task_id, StageType::Compile).unwrap();
        registry.add_stage(task_id, StageType::Build).unwrap();

        let removed = registry.remove_task(task_id).unwrap();
        assert_eq!(removed.stages.len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rename_task_enforces_uniqueness() {
        let mut registry = TaskRegistry::new();
        let a = registry.add_task("a", TaskType::Maven).unwrap();
        registry.add_task("b", TaskType::Npm).unwrap();

        assert_eq!(
            registry.rename_task(a, "b"),
            Err(ModelError::DuplicateTaskName("b".to_string()))
        );
        registry.rename_task(a, "c").unwrap();
        assert_eq!(registry.task(a).unwrap().name, "c");
    }

    #[test]
    fn test_stage_ordering_is_preserved() {
        let mut registry = TaskRegistry::new();
        let task_id = registry.add_task("backend", TaskType::Maven).unwrap();
        registry.add_stage(task_id, StageType::Deploy).unwrap();
        registry.add_stage(task_id, StageType::Compile).unwrap();

        let kinds: Vec<_> = registry.task(task_id).unwrap().stages.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StageType::Deploy, StageType::Compile]);
    }
}
