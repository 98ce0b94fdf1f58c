//! Synchronization engine
//!
//! Debounces per-stage edits into autosave pushes, maps local configs
//! to their wire form, dispatches the endpoint matching the stage type,
//! retries once, and provides the flush barrier the submit flow waits
//! on. Failures are values in the returned report, not side effects.

use crate::core::task::{StageType, TaskType};
use crate::schema::store::{ConfigStore, StageKey, WireOutcome};
use crate::schema::ConfigMap;
use crate::sync::api::{
    BatchStageEntry, BatchUpdateRequest, ConfigApi, DeployConfigRequest, StageConfigRequest,
};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Quiet window after the last edit before an autosave push
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Pause before the single retry of a failed push
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Everything one push needs, captured when the push is requested so a
/// completed callback never has to read ambient state.
#[derive(Debug, Clone)]
pub struct PushSpec {
    pub key: StageKey,
    pub task_kind: TaskType,
    pub stage_kind: StageType,
    pub task_name: String,
    pub project_id: String,
    pub branch: String,

    /// Draft edits committed to the store when the push actually runs;
    /// `None` pushes whatever the store already holds.
    pub draft: Option<ConfigMap>,
}

/// What happened to a single push
#[derive(Debug, Clone)]
pub enum PushOutcome {
    Synced {
        task_name: String,
        stage: StageType,
    },
    /// No schema for the (task type, stage type) pair; nothing sent
    SkippedNoSchema {
        task_name: String,
        stage: StageType,
    },
    /// Project id or branch not known yet; config stays local-only
    SkippedLocalOnly {
        task_name: String,
        stage: StageType,
    },
    /// The stage was deleted between dispatch and completion
    SkippedStageGone {
        task_name: String,
        stage: StageType,
    },
    Failed(SyncFailure),
}

/// A push that failed after its retry
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub task_name: String,
    pub stage: StageType,
    pub error: String,
}

/// Aggregated result of a flush
#[derive(Debug, Default)]
pub struct FlushReport {
    pub synced: usize,
    pub skipped: usize,
    pub failures: Vec<SyncFailure>,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Synced { .. } => self.synced += 1,
            PushOutcome::Failed(failure) => self.failures.push(failure),
            _ => self.skipped += 1,
        }
    }
}

/// Debounced, retrying synchronization of stage configs
pub struct SyncEngine<A> {
    api: Arc<A>,
    store: Arc<Mutex<ConfigStore>>,

    /// Pending debounce timers, one at most per stage
    timers: HashMap<StageKey, JoinHandle<()>>,

    /// Draft snapshots waiting for their quiet window to expire
    pending: Arc<Mutex<HashMap<StageKey, PushSpec>>>,

    /// Dispatched pushes that have not been awaited yet
    in_flight: Arc<Mutex<Vec<JoinHandle<PushOutcome>>>>,

    debounce: Duration,
    retry_delay: Duration,
}

impl<A: ConfigApi + 'static> SyncEngine<A> {
    pub fn new(api: Arc<A>, store: Arc<Mutex<ConfigStore>>) -> Self {
        Self {
            api,
            store,
            timers: HashMap::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(Vec::new())),
            debounce: DEFAULT_DEBOUNCE,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the debounce and retry timing
    pub fn with_timing(mut self, debounce: Duration, retry_delay: Duration) -> Self {
        self.debounce = debounce;
        self.retry_delay = retry_delay;
        self
    }

    /// Restart the stage's autosave timer with the latest draft.
    ///
    /// Each stage has its own timer; edits to one stage never delay
    /// another's autosave. A push already in flight is unaffected.
    pub async fn schedule_autosave(&mut self, spec: PushSpec) {
        let key = spec.key;
        self.pending.lock().await.insert(key, spec);

        if let Some(timer) = self.timers.remove(&key) {
            timer.abort();
        }

        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let in_flight = Arc::clone(&self.in_flight);
        let debounce = self.debounce;
        let retry_delay = self.retry_delay;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Registering the push under the in-flight lock keeps the
            // flush barrier from missing a push that fires during it.
            let mut in_flight = in_flight.lock().await;
            let Some(spec) = pending.lock().await.remove(&key) else {
                return;
            };
            debug!("autosave timer expired for stage {}", key.stage);
            in_flight.push(tokio::spawn(push_stage(api, store, spec, retry_delay)));
        });
        self.timers.insert(key, timer);
    }

    /// Drop a stage's pending (not yet committed) autosave, if any.
    /// An already-dispatched push keeps running to completion.
    pub async fn cancel_pending(&mut self, key: StageKey) {
        if let Some(timer) = self.timers.remove(&key) {
            timer.abort();
        }
        self.pending.lock().await.remove(&key);
    }

    /// Push one stage immediately, superseding its pending autosave.
    pub async fn push_now(&mut self, spec: PushSpec) -> PushOutcome {
        self.cancel_pending(spec.key).await;
        push_stage(
            Arc::clone(&self.api),
            Arc::clone(&self.store),
            spec,
            self.retry_delay,
        )
        .await
    }

    /// Push every candidate stage that still needs a sync and wait for
    /// the full set of pushes, including every retry and every autosave
    /// already in flight, before returning.
    pub async fn flush(&mut self, candidates: Vec<PushSpec>) -> FlushReport {
        // Pending drafts are pushed as-is; their timers are superseded.
        let pending_specs: Vec<PushSpec> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, spec)| spec).collect()
        };
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }

        let pending_keys: HashSet<StageKey> = pending_specs.iter().map(|s| s.key).collect();
        let mut to_push = pending_specs;
        {
            let store = self.store.lock().await;
            for spec in candidates {
                if pending_keys.contains(&spec.key) {
                    continue;
                }
                let needs_push = match store.state(spec.key) {
                    None => true, // never touched, let the push derive defaults
                    Some(state) => state.needs_push(),
                };
                if needs_push {
                    to_push.push(spec);
                }
            }
        }

        let mut handles: Vec<JoinHandle<PushOutcome>> =
            self.in_flight.lock().await.drain(..).collect();
        info!(
            "flushing {} stage config(s), {} already in flight",
            to_push.len(),
            handles.len()
        );
        for spec in to_push {
            handles.push(tokio::spawn(push_stage(
                Arc::clone(&self.api),
                Arc::clone(&self.store),
                spec,
                self.retry_delay,
            )));
        }

        let mut report = FlushReport::default();
        for joined in join_all(handles).await {
            match joined {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => warn!("push task did not complete: {e}"),
            }
        }
        report
    }
}

/// Run one push to completion: commit the draft, map to wire form,
/// dispatch the endpoint for the stage type and retry once on failure.
async fn push_stage<A: ConfigApi>(
    api: Arc<A>,
    store: Arc<Mutex<ConfigStore>>,
    spec: PushSpec,
    retry_delay: Duration,
) -> PushOutcome {
    let gone = || PushOutcome::SkippedStageGone {
        task_name: spec.task_name.clone(),
        stage: spec.stage_kind,
    };

    let wire = {
        let mut store = store.lock().await;
        if let Some(draft) = spec.draft.clone() {
            if store
                .set(spec.key, spec.task_kind, spec.stage_kind, draft)
                .is_none()
            {
                return gone();
            }
        } else {
            store.get_or_default(spec.key, spec.task_kind, spec.stage_kind);
        }

        let wire = match store.to_wire(spec.key, spec.task_kind, spec.stage_kind) {
            WireOutcome::Wire(wire) => wire,
            WireOutcome::NoSchema => {
                debug!(
                    "no config schema for {}/{}, skipping sync",
                    spec.task_kind, spec.stage_kind
                );
                return PushOutcome::SkippedNoSchema {
                    task_name: spec.task_name.clone(),
                    stage: spec.stage_kind,
                };
            }
        };

        if spec.project_id.trim().is_empty() || spec.branch.trim().is_empty() {
            debug!(
                "project id or branch not known yet, keeping {}.{} local-only",
                spec.task_name, spec.stage_kind
            );
            return PushOutcome::SkippedLocalOnly {
                task_name: spec.task_name.clone(),
                stage: spec.stage_kind,
            };
        }

        if !store.begin_push(spec.key) {
            return gone();
        }
        wire
    };

    let result = match dispatch(api.as_ref(), &spec, wire.clone()).await {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(
                "push failed for {}.{} ({first}), retrying once",
                spec.task_name, spec.stage_kind
            );
            tokio::time::sleep(retry_delay).await;
            dispatch(api.as_ref(), &spec, wire).await
        }
    };

    match result {
        Ok(()) => {
            store.lock().await.finish_push(spec.key, true);
            info!("synced {}.{}", spec.task_name, spec.stage_kind);
            PushOutcome::Synced {
                task_name: spec.task_name,
                stage: spec.stage_kind,
            }
        }
        Err(e) => {
            store.lock().await.finish_push(spec.key, false);
            warn!(
                "push failed for {}.{} after retry: {e}",
                spec.task_name, spec.stage_kind
            );
            PushOutcome::Failed(SyncFailure {
                task_name: spec.task_name,
                stage: spec.stage_kind,
                error: e.to_string(),
            })
        }
    }
}

/// Call the endpoint matching the stage type: compile configs go to the
/// maven/npm endpoints, deploy to its dedicated endpoint, everything
/// else through the generic batch update.
async fn dispatch<A: ConfigApi>(
    api: &A,
    spec: &PushSpec,
    wire: ConfigMap,
) -> Result<(), crate::sync::api::ApiError> {
    match spec.stage_kind {
        StageType::Compile => {
            let mut stage_configs = std::collections::BTreeMap::new();
            stage_configs.insert(StageType::Compile.to_string(), wire);
            let req = StageConfigRequest {
                project_id: spec.project_id.clone(),
                branch: spec.branch.clone(),
                task_name: spec.task_name.clone(),
                stage_configs,
                sync_to_gitlab: true,
            };
            match spec.task_kind {
                TaskType::Npm => api.update_npm_config(&req).await,
                _ => api.update_maven_config(&req).await,
            }
        }
        StageType::Deploy => {
            let req = DeployConfigRequest {
                project_id: spec.project_id.clone(),
                branch: spec.branch.clone(),
                task_name: spec.task_name.clone(),
                template_type: spec.task_kind,
                deploy_config: wire,
                sync_to_gitlab: true,
            };
            api.update_deploy_config(&req).await
        }
        StageType::Build => {
            let mut stage_config = std::collections::BTreeMap::new();
            stage_config.insert(
                StageType::Build.to_string(),
                BatchStageEntry {
                    enabled: true,
                    config: wire,
                },
            );
            let req = BatchUpdateRequest {
                project_id: spec.project_id.clone(),
                branch: spec.branch.clone(),
                task_name: spec.task_name.clone(),
                template_type: spec.task_kind,
                stage_config,
                sync_to_gitlab: true,
            };
            api.batch_update(&req).await
        }
    }
}
