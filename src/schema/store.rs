//! Stage configuration store
//!
//! Owns the local-form config record for every stage of the pipeline
//! being edited, keyed by (task id, stage id), together with each
//! stage's synchronization state.

use crate::core::task::{StageType, TaskType};
use crate::schema::registry::{self, ConfigMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// Synchronization state of a single stage's config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Local config matches the remote store
    Clean,
    /// Local edits not yet pushed
    Dirty,
    /// A push is currently in flight
    Saving,
    /// The last push failed after its retry; still push-eligible
    Failed,
}

impl SyncState {
    /// Whether a flush should push this stage
    pub fn needs_push(&self) -> bool {
        matches!(self, SyncState::Dirty | SyncState::Failed)
    }
}

/// Identity of a stage config entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageKey {
    pub task: Uuid,
    pub stage: Uuid,
}

impl StageKey {
    pub fn new(task: Uuid, stage: Uuid) -> Self {
        Self { task, stage }
    }
}

/// Result of mapping a stage config into wire form
#[derive(Debug, Clone, PartialEq)]
pub enum WireOutcome {
    Wire(ConfigMap),
    /// No schema exists for the (task type, stage type) pair; the
    /// caller skips synchronization for this stage.
    NoSchema,
}

#[derive(Debug, Clone)]
struct StageEntry {
    config: ConfigMap,
    state: SyncState,
}

/// In-memory keyed store of per-stage configs
#[derive(Debug, Default)]
pub struct ConfigStore {
    entries: HashMap<StageKey, StageEntry>,
    /// Keys of deleted stages. A push callback that lands after its
    /// stage was removed must not resurrect the entry.
    retired: HashSet<StageKey>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: StageKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn get(&self, key: StageKey) -> Option<&ConfigMap> {
        self.entries.get(&key).map(|e| &e.config)
    }

    pub fn state(&self, key: StageKey) -> Option<SyncState> {
        self.entries.get(&key).map(|e| e.state)
    }

    /// Existing config for the stage, or the schema default for its
    /// (task type, stage type). A missing entry is created on first
    /// access and starts out never-synced.
    pub fn get_or_default(&mut self, key: StageKey, task: TaskType, stage: StageType) -> ConfigMap {
        if self.retired.contains(&key) {
            return registry::default_config(task, stage);
        }
        self.entries
            .entry(key)
            .or_insert_with(|| StageEntry {
                config: registry::default_config(task, stage),
                state: SyncState::Dirty,
            })
            .config
            .clone()
    }

    /// Merge partial field updates into the stage's config and mark it
    /// dirty. Returns the merged config, or `None` if the stage has
    /// been deleted in the meantime.
    pub fn set(
        &mut self,
        key: StageKey,
        task: TaskType,
        stage: StageType,
        partial: ConfigMap,
    ) -> Option<ConfigMap> {
        if self.retired.contains(&key) {
            debug!(stage = %key.stage, "ignoring config write for deleted stage");
            return None;
        }
        let entry = self.entries.entry(key).or_insert_with(|| StageEntry {
            config: registry::default_config(task, stage),
            state: SyncState::Dirty,
        });
        entry.config.extend(partial);
        entry.state = SyncState::Dirty;
        Some(entry.config.clone())
    }

    /// Import a config received from the remote store. Wire-form maps
    /// are re-derived into local form; the entry starts out clean.
    pub fn import(&mut self, key: StageKey, task: TaskType, stage: StageType, config: ConfigMap) {
        if self.retired.contains(&key) {
            return;
        }
        let local = if registry::looks_like_wire(task, stage, &config) {
            registry::from_wire(task, stage, &config).unwrap_or(config)
        } else {
            config
        };
        self.entries.insert(
            key,
            StageEntry {
                config: local,
                state: SyncState::Clean,
            },
        );
    }

    /// Wire form of the stage's config (stored, or schema default).
    pub fn to_wire(&self, key: StageKey, task: TaskType, stage: StageType) -> WireOutcome {
        let local;
        let config = match self.get(key) {
            Some(c) => c,
            None => {
                local = registry::default_config(task, stage);
                &local
            }
        };
        match registry::to_wire(task, stage, config) {
            Some(wire) => WireOutcome::Wire(wire),
            None => WireOutcome::NoSchema,
        }
    }

    /// Mark a push as started.
    pub fn begin_push(&mut self, key: StageKey) -> bool {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.state = SyncState::Saving;
                true
            }
            None => false,
        }
    }

    /// Record the outcome of a completed push. A stage edited while the
    /// push was in flight is dirty again and stays that way; a deleted
    /// stage is left alone.
    pub fn finish_push(&mut self, key: StageKey, success: bool) {
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.state == SyncState::Saving {
                entry.state = if success { SyncState::Clean } else { SyncState::Failed };
            }
        }
    }

    pub fn remove_stage(&mut self, key: StageKey) {
        self.entries.remove(&key);
        self.retired.insert(key);
    }

    pub fn remove_task(&mut self, task: Uuid) {
        let keys: Vec<StageKey> = self
            .entries
            .keys()
            .filter(|k| k.task == task)
            .copied()
            .collect();
        for key in keys {
            self.remove_stage(key);
        }
    }

    /// All stage configs of one task in local form, keyed by stage id.
    pub fn task_configs(&self, task: Uuid) -> BTreeMap<Uuid, ConfigMap> {
        self.entries
            .iter()
            .filter(|(k, _)| k.task == task)
            .map(|(k, e)| (k.stage, e.config.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> StageKey {
        StageKey::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_get_or_default_fills_schema_defaults() {
        let mut store = ConfigStore::new();
        let k = key();
        let config = store.get_or_default(k, TaskType::Maven, StageType::Compile);
        assert_eq!(config["jdkVersion"], json!("8"));
        assert_eq!(store.state(k), Some(SyncState::Dirty));
    }

    #[test]
    fn test_set_merges_and_marks_dirty() {
        let mut store = ConfigStore::new();
        let k = key();
        store.import(
            k,
            TaskType::Maven,
            StageType::Compile,
            registry::default_config(TaskType::Maven, StageType::Compile),
        );
        assert_eq!(store.state(k), Some(SyncState::Clean));

        let mut partial = ConfigMap::new();
        partial.insert("jdkVersion".to_string(), json!("17"));
        let merged = store.set(k, TaskType::Maven, StageType::Compile, partial).unwrap();

        assert_eq!(merged["jdkVersion"], json!("17"));
        assert_eq!(merged["artifactFormat"], json!("jar"));
        assert_eq!(store.state(k), Some(SyncState::Dirty));
    }

    #[test]
    fn test_to_wire_reports_no_schema() {
        let mut store = ConfigStore::new();
        let k = key();
        store.get_or_default(k, TaskType::Scan, StageType::Compile);
        assert_eq!(store.to_wire(k, TaskType::Scan, StageType::Compile), WireOutcome::NoSchema);
    }

    #[test]
    fn test_import_wire_form_is_rederived() {
        let mut store = ConfigStore::new();
        let k = key();
        let wire = registry::to_wire(
            TaskType::Maven,
            StageType::Deploy,
            &registry::default_config(TaskType::Maven, StageType::Deploy),
        )
        .unwrap();

        store.import(k, TaskType::Maven, StageType::Deploy, wire);
        let config = store.get(k).unwrap();
        assert_eq!(config["port"], json!("80"));
        assert_eq!(config["enableIngress"], json!(true));
    }

    #[test]
    fn test_removed_stage_is_not_resurrected() {
        let mut store = ConfigStore::new();
        let k = key();
        store.get_or_default(k, TaskType::Maven, StageType::Compile);
        store.remove_stage(k);

        let mut partial = ConfigMap::new();
        partial.insert("jdkVersion".to_string(), json!("17"));
        assert!(store.set(k, TaskType::Maven, StageType::Compile, partial).is_none());
        assert!(!store.contains(k));
    }

    #[test]
    fn test_finish_push_respects_interleaved_edit() {
        let mut store = ConfigStore::new();
        let k = key();
        store.get_or_default(k, TaskType::Maven, StageType::Compile);
        assert!(store.begin_push(k));

        // Edit lands while the push is in flight
        let mut partial = ConfigMap::new();
        partial.insert("codePath".to_string(), json!("svc"));
        store.set(k, TaskType::Maven, StageType::Compile, partial);

        store.finish_push(k, true);
        assert_eq!(store.state(k), Some(SyncState::Dirty));
    }

    #[test]
    fn test_finish_push_failure_stays_push_eligible() {
        let mut store = ConfigStore::new();
        let k = key();
        store.get_or_default(k, TaskType::Maven, StageType::Compile);
        store.begin_push(k);
        store.finish_push(k, false);

        assert_eq!(store.state(k), Some(SyncState::Failed));
        assert!(store.state(k).unwrap().needs_push());
    }
}
