//! Legacy format reconciler
//!
//! Rebuilds the task registry and configuration store from a persisted
//! pipeline record, whichever of the two historical encodings it uses:
//! the structured one (`task` holds a JSON array of task objects with
//! embedded stages) or the flat-string one (`task` and `stage` hold
//! comma-separated name lists with no association between them).

use crate::core::pipeline::{Member, Pipeline, PipelineRecord, RecordStage, RecordTask, Trigger};
use crate::core::task::{StageType, TaskRegistry, TaskType};
use crate::schema::store::ConfigStore;
use crate::schema::StageKey;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

/// Fallback task synthesized when a record has no tasks at all
const DEFAULT_TASK_NAME: &str = "default task";

/// Rebuild a pipeline from its persisted record.
///
/// Never fails: unparseable columns degrade to defaults and entries
/// that cannot be represented (unknown stage types, duplicate names)
/// are dropped with a warning.
pub fn reconcile(record: &PipelineRecord, store: &mut ConfigStore) -> Pipeline {
    let mut tasks = parse_task_column(&record.task);

    if tasks.is_empty() {
        tasks.push(RecordTask {
            id: None,
            name: DEFAULT_TASK_NAME.to_string(),
            kind: TaskType::Maven.to_string(),
            stages: Vec::new(),
        });
    }

    // Structured records carry their own stage association; only the
    // flat encoding needs the separate stage column distributed.
    if tasks.iter().all(|t| t.stages.is_empty()) {
        let stages = parse_stage_column(&record.stage);
        distribute_stages(&mut tasks, stages);
    }

    reconcile_structured(record, &tasks, store)
}

/// Rebuild a pipeline from its record and an already-structured task
/// tree, as returned by the tasks-with-stages endpoint.
pub fn reconcile_structured(
    record: &PipelineRecord,
    tasks: &[RecordTask],
    store: &mut ConfigStore,
) -> Pipeline {
    let mut pipeline = Pipeline::new(record.project_id.clone(), record.branch.clone());
    pipeline.id = record.id;
    pipeline.trigger = Trigger::from_columns(&record.trigger_type, &record.trigger_config);
    pipeline.members = parse_members(&record.members);
    import_structured(tasks, &mut pipeline.registry, store);
    pipeline
}

/// Import structured task entries into a registry and store.
///
/// Shared between the reconciler and the tasks-with-stages load path.
pub fn import_structured(tasks: &[RecordTask], registry: &mut TaskRegistry, store: &mut ConfigStore) {
    for entry in tasks {
        let kind = TaskType::from_str(&entry.kind).unwrap_or(TaskType::Maven);
        let task_id = match registry.add_task(&entry.name, kind) {
            Ok(id) => id,
            Err(e) => {
                warn!("skipping task '{}' during import: {e}", entry.name);
                continue;
            }
        };
        if let Some(server_id) = &entry.id {
            if let Some(task) = registry.task_mut(task_id) {
                task.server_id = Some(server_id.clone());
            }
        }
        for stage in &entry.stages {
            let Some(stage_kind) = importable_stage_type(&stage.kind) else {
                warn!(
                    "dropping stage '{}' of task '{}': not an importable stage type",
                    stage.kind, entry.name
                );
                continue;
            };
            let stage_id = match registry.add_stage(task_id, stage_kind) {
                Ok(id) => id,
                Err(e) => {
                    warn!("skipping stage during import: {e}");
                    continue;
                }
            };
            if let Some(config) = &stage.config {
                store.import(StageKey::new(task_id, stage_id), kind, stage_kind, config.clone());
            } else {
                debug!("stage {stage_kind} of task '{}' imported without config", entry.name);
            }
        }
    }
}

/// A stage type that can be rendered and edited. The literal markers
/// `undefined` and `unknown` come from records written before types
/// were validated.
fn importable_stage_type(raw: &str) -> Option<StageType> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "undefined" || raw == "unknown" {
        return None;
    }
    StageType::from_str(raw).ok()
}

fn parse_task_column(column: &str) -> Vec<RecordTask> {
    if column.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(column) {
        Ok(Value::Array(items)) => items.iter().filter_map(task_from_value).collect(),
        Ok(Value::String(name)) => vec![flat_task(&name)],
        Ok(_) => vec![flat_task(column)],
        Err(e) => {
            debug!("task column is not JSON ({e}), splitting on commas");
            column
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(flat_task)
                .collect()
        }
    }
}

fn flat_task(name: &str) -> RecordTask {
    RecordTask {
        id: None,
        name: name.trim().to_string(),
        kind: TaskType::Maven.to_string(),
        stages: Vec::new(),
    }
}

fn task_from_value(value: &Value) -> Option<RecordTask> {
    match value {
        Value::String(name) => Some(flat_task(name)),
        Value::Object(obj) => {
            let name = obj.get("name")?.as_str()?.trim().to_string();
            Some(RecordTask {
                id: obj.get("id").and_then(Value::as_str).map(str::to_string),
                name,
                kind: obj
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or(TaskType::Maven.as_str())
                    .to_string(),
                stages: obj
                    .get("stages")
                    .and_then(Value::as_array)
                    .map(|stages| stages.iter().filter_map(stage_from_value).collect())
                    .unwrap_or_default(),
            })
        }
        other => {
            warn!("dropping unrecognized task entry: {other}");
            None
        }
    }
}

fn parse_stage_column(column: &str) -> Vec<RecordStage> {
    if column.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(column) {
        Ok(Value::Array(items)) => items
            .iter()
            .flat_map(|item| match item {
                // New-format inner arrays (one per task) flatten in order
                Value::Array(inner) => inner.iter().filter_map(stage_from_value).collect(),
                other => stage_from_value(other).into_iter().collect::<Vec<_>>(),
            })
            .collect(),
        Ok(Value::String(kind)) => vec![flat_stage(&kind)],
        Ok(_) => vec![flat_stage(column)],
        Err(e) => {
            debug!("stage column is not JSON ({e}), splitting on commas");
            column
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(flat_stage)
                .collect()
        }
    }
}

fn flat_stage(kind: &str) -> RecordStage {
    RecordStage {
        id: None,
        kind: kind.trim().to_string(),
        config: None,
    }
}

fn stage_from_value(value: &Value) -> Option<RecordStage> {
    match value {
        Value::String(kind) => Some(flat_stage(kind)),
        Value::Object(obj) => Some(RecordStage {
            id: obj.get("id").and_then(Value::as_str).map(str::to_string),
            kind: obj
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            config: obj
                .get("config")
                .and_then(Value::as_object)
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        }),
        _ => None,
    }
}

/// Assign a flat stage list to the parsed tasks.
///
/// A single task receives every stage in order. With multiple tasks the
/// stages are distributed round-robin by index modulo task count. The
/// round-robin rule is a compatibility heuristic for records that
/// predate the multi-task model; it does not reconstruct the original
/// association.
fn distribute_stages(tasks: &mut [RecordTask], stages: Vec<RecordStage>) {
    if tasks.is_empty() || stages.is_empty() {
        return;
    }
    if tasks.len() == 1 {
        tasks[0].stages = stages;
        return;
    }
    let count = tasks.len();
    for (index, stage) in stages.into_iter().enumerate() {
        tasks[index % count].stages.push(stage);
    }
}

fn parse_members(column: &str) -> Vec<Member> {
    if column.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Member>>(column) {
        Ok(members) => members,
        Err(e) => {
            warn!("unparseable members column, using admin fallback: {e}");
            vec![Member {
                name: "admin".to_string(),
                role: "all permissions".to_string(),
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(task: &str, stage: &str) -> PipelineRecord {
        PipelineRecord {
            id: Some(7),
            project_id: "42".to_string(),
            branch: "develop".to_string(),
            task: task.to_string(),
            stage: stage.to_string(),
            trigger_type: String::new(),
            trigger_config: String::new(),
            members: String::new(),
            updated_by: String::new(),
            updated_at: None,
        }
    }

    #[test]
    fn test_flat_single_task_gets_all_stages() {
        let mut store = ConfigStore::new();
        let pipeline = reconcile(&record("A", "compile,build"), &mut store);

        let tasks = pipeline.registry.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "A");
        assert_eq!(tasks[0].kind, TaskType::Maven);
        let kinds: Vec<_> = tasks[0].stages.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StageType::Compile, StageType::Build]);
    }

    #[test]
    fn test_flat_multi_task_round_robin() {
        let mut store = ConfigStore::new();
        let pipeline = reconcile(&record("A,B", "compile,build"), &mut store);

        let tasks = pipeline.registry.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].stages[0].kind, StageType::Compile);
        assert_eq!(tasks[1].stages[0].kind, StageType::Build);
    }

    #[test]
    fn test_invalid_json_task_falls_back_to_comma_split() {
        let mut store = ConfigStore::new();
        // Truncated JSON is not valid, so the column splits on commas
        let pipeline = reconcile(&record(r#"{"name":"A"#, "compile"), &mut store);
        assert_eq!(pipeline.registry.tasks()[0].name, r#"{"name":"A"#);
    }

    #[test]
    fn test_empty_record_synthesizes_default_task() {
        let mut store = ConfigStore::new();
        let pipeline = reconcile(&record("", ""), &mut store);

        let tasks = pipeline.registry.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, DEFAULT_TASK_NAME);
        assert!(tasks[0].stages.is_empty());
    }

    #[test]
    fn test_marker_and_unknown_stage_types_are_dropped() {
        let mut store = ConfigStore::new();
        let pipeline = reconcile(&record("A", "compile,undefined,unknown,mystery"), &mut store);
        let kinds: Vec<_> = pipeline.registry.tasks()[0].stages.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StageType::Compile]);
    }

    #[test]
    fn test_structured_tasks_keep_embedded_stages() {
        let task_json = r#"[
            {"name":"backend","type":"maven","stages":[{"type":"compile","config":{"jdkVersion":"17"}}]},
            {"name":"frontend","type":"npm","stages":[{"type":"build"}]}
        ]"#;
        let mut store = ConfigStore::new();
        // The stage column is ignored when structured stages exist
        let pipeline = reconcile(&record(task_json, r#"["deploy","deploy"]"#), &mut store);

        let tasks = pipeline.registry.tasks();
        assert_eq!(tasks[0].stages[0].kind, StageType::Compile);
        assert_eq!(tasks[1].stages[0].kind, StageType::Build);

        let key = StageKey::new(tasks[0].id, tasks[0].stages[0].id);
        assert_eq!(store.get(key).unwrap()["jdkVersion"], serde_json::json!("17"));
    }

    #[test]
    fn test_duplicate_names_and_stage_types_are_dropped() {
        let mut store = ConfigStore::new();
        let pipeline = reconcile(&record("A,A", "compile,compile,compile"), &mut store);

        let tasks = pipeline.registry.tasks();
        assert_eq!(tasks.len(), 1);
        // Round-robin would have split the stages across two tasks;
        // with the duplicate dropped, all land on A and dedupe to one.
        assert_eq!(tasks[0].stages.len(), 1);
    }

    #[test]
    fn test_non_array_stage_json_is_single_stage() {
        let mut store = ConfigStore::new();
        let pipeline = reconcile(&record("A", r#""compile""#), &mut store);
        assert_eq!(pipeline.registry.tasks()[0].stages[0].kind, StageType::Compile);
    }

    #[test]
    fn test_member_fallback_on_parse_failure() {
        let mut rec = record("A", "");
        rec.members = "not json".to_string();
        let mut store = ConfigStore::new();
        let pipeline = reconcile(&rec, &mut store);
        assert_eq!(pipeline.members.len(), 1);
        assert_eq!(pipeline.members[0].name, "admin");
    }
}
