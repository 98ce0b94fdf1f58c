//! Stage editor state machine
//!
//! Governs the open/edit/save/cancel lifecycle of a single stage's
//! configuration panel. The machine holds its own referenced task and
//! stage identifiers and a draft config; IO happens in the session
//! layer around these transitions.

use crate::core::task::StageType;
use crate::schema::{ConfigMap, StageKey};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of the configuration panel
#[derive(Debug, Clone, PartialEq)]
pub enum EditorState {
    /// No panel open
    Closed,

    /// "Add stage" clicked; waiting for a stage type choice
    Selecting { task: Uuid },

    /// Panel open on one stage with a draft of its config
    Editing {
        task: Uuid,
        stage: Uuid,
        stage_kind: StageType,
        draft: ConfigMap,
        enabled: bool,
    },

    /// Save in progress; panel closes when the push completes
    Saving {
        task: Uuid,
        stage: Uuid,
        stage_kind: StageType,
    },
}

/// The stage configuration panel
#[derive(Debug, Clone, Default)]
pub struct StageEditor {
    state: EditorState,
}

impl Default for EditorState {
    fn default() -> Self {
        EditorState::Closed
    }
}

impl StageEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, EditorState::Closed)
    }

    /// Key of the stage currently being edited or saved
    pub fn current_stage(&self) -> Option<StageKey> {
        match &self.state {
            EditorState::Editing { task, stage, .. } | EditorState::Saving { task, stage, .. } => {
                Some(StageKey::new(*task, *stage))
            }
            _ => None,
        }
    }

    /// Key and stage type of the open panel
    pub fn editing_context(&self) -> Option<(StageKey, StageType)> {
        match &self.state {
            EditorState::Editing {
                task,
                stage,
                stage_kind,
                ..
            } => Some((StageKey::new(*task, *stage), *stage_kind)),
            _ => None,
        }
    }

    /// Enter stage-type selection for a task
    pub fn begin_select(&mut self, task: Uuid) {
        self.state = EditorState::Selecting { task };
    }

    /// Task awaiting a stage-type choice, if selecting
    pub fn selecting_task(&self) -> Option<Uuid> {
        match self.state {
            EditorState::Selecting { task } => Some(task),
            _ => None,
        }
    }

    /// Open the panel on a stage with its resolved config
    pub fn open(
        &mut self,
        key: StageKey,
        stage_kind: StageType,
        config: ConfigMap,
        enabled: bool,
    ) {
        self.state = EditorState::Editing {
            task: key.task,
            stage: key.stage,
            stage_kind,
            draft: config,
            enabled,
        };
    }

    /// Apply one field edit to the draft; returns a snapshot of the
    /// updated draft for the autosave timer, or `None` when no panel
    /// is open.
    pub fn edit_field(&mut self, field: &str, value: Value) -> Option<ConfigMap> {
        match &mut self.state {
            EditorState::Editing { draft, .. } => {
                draft.insert(field.to_string(), value);
                Some(draft.clone())
            }
            _ => None,
        }
    }

    /// Flip the enabled flag, returning the previous value so a failed
    /// enable/disable call can revert it.
    pub fn set_enabled(&mut self, value: bool) -> Option<bool> {
        match &mut self.state {
            EditorState::Editing { enabled, .. } => {
                let previous = *enabled;
                *enabled = value;
                Some(previous)
            }
            _ => None,
        }
    }

    /// Transition Editing -> Saving, handing the draft to the caller
    pub fn begin_save(&mut self) -> Option<(StageKey, StageType, ConfigMap)> {
        match std::mem::take(&mut self.state) {
            EditorState::Editing {
                task,
                stage,
                stage_kind,
                draft,
                ..
            } => {
                self.state = EditorState::Saving {
                    task,
                    stage,
                    stage_kind,
                };
                Some((StageKey::new(task, stage), stage_kind, draft))
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Close the panel once the save push completed
    pub fn finish_save(&mut self) {
        if matches!(self.state, EditorState::Saving { .. }) {
            self.state = EditorState::Closed;
        }
    }

    /// Discard draft edits that were never committed to the store and
    /// close. Returns the abandoned stage key, if a panel was open, so
    /// the caller can drop its pending autosave.
    pub fn cancel(&mut self) -> Option<StageKey> {
        let abandoned = self.current_stage();
        self.state = EditorState::Closed;
        abandoned
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
    fn test_select_then_cancel_returns_to_closed() {
        let mut editor = StageEditor::new();
        editor.begin_select(Uuid::new_v4());
        assert!(editor.selecting_task().is_some());

        editor.cancel();
        assert!(editor.is_closed());
    }

    #[test]
    fn test_edit_field_updates_draft_snapshot() {
        let mut editor = StageEditor::new();
        editor.open(key(), StageType::Compile, ConfigMap::new(), true);

        let snapshot = editor.edit_field("jdkVersion", json!("17")).unwrap();
        assert_eq!(snapshot["jdkVersion"], json!("17"));

        let snapshot = editor.edit_field("codePath", json!("svc")).unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_edit_field_requires_open_panel() {
        let mut editor = StageEditor::new();
        assert!(editor.edit_field("jdkVersion", json!("17")).is_none());
    }

    #[test]
    fn test_save_transitions_through_saving() {
        let mut editor = StageEditor::new();
        let k = key();
        editor.open(k, StageType::Deploy, ConfigMap::new(), true);
        editor.edit_field("cpu", json!("2"));

        let (saved_key, kind, draft) = editor.begin_save().unwrap();
        assert_eq!(saved_key, k);
        assert_eq!(kind, StageType::Deploy);
        assert_eq!(draft["cpu"], json!("2"));
        assert!(matches!(editor.state(), EditorState::Saving { .. }));

        editor.finish_save();
        assert!(editor.is_closed());
    }

    #[test]
    fn test_cancel_reports_abandoned_stage() {
        let mut editor = StageEditor::new();
        let k = key();
        editor.open(k, StageType::Build, ConfigMap::new(), true);
        assert_eq!(editor.cancel(), Some(k));
        assert!(editor.is_closed());
    }

    #[test]
    fn test_set_enabled_returns_previous_for_revert() {
        let mut editor = StageEditor::new();
        editor.open(key(), StageType::Build, ConfigMap::new(), true);
        assert_eq!(editor.set_enabled(false), Some(true));
        // A failed toggle call reverts using the returned value
        assert_eq!(editor.set_enabled(true), Some(false));
    }
}
