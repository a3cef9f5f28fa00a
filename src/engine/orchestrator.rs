//! The top-level coordinator (§4.1): one coordinator thread owns all state
//! writes and scheduling decisions; workers are blocking `std::thread`
//! threads reporting back over an `mpsc` channel.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

use crate::agent::AgentCapability;
use crate::config::Config;
use crate::dag::model::Dag;
use crate::engine::dispatch;
use crate::engine::worker::{self, WorkerEvent, WorkerOutcome};
use crate::state::model::{MergeState, RunState, RunStatus, SpecState, SpecStatus};
use crate::state::store;
use crate::worktree::lock::is_stale;
use crate::worktree::manager::WorktreeManager;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub fresh: bool,
    pub fresh_keep_logs: bool,
    pub max_parallel_override: Option<u32>,
    pub fail_fast: bool,
    pub only: Option<Vec<String>>,
    pub clean: Vec<String>,
    pub autocommit_override: Option<bool>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self { fresh_keep_logs: true, ..Default::default() }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_status: RunStatus,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub blocked: Vec<String>,
}

pub struct Engine {
    dag_path: PathBuf,
    config: Config,
    agent: Arc<dyn AgentCapability>,
}

impl Engine {
    pub fn new(dag_path: PathBuf, config: Config, agent: Arc<dyn AgentCapability>) -> Self {
        Self { dag_path, config, agent }
    }

    pub fn run(&self, options: RunOptions) -> Result<RunSummary> {
        let loaded = store::load(&self.dag_path)?;
        let dag = loaded.dag;
        let manager = Arc::new(WorktreeManager::new(self.config.repo_root.clone(), self.config.worktrees_root()));

        let mut state = self.prepare_state(&dag, loaded.state, &options, &manager)?;

        if state.log_base.is_none() {
            let log_base = self.config.log_base(&self.config.project_id(), &dag.id);
            std::fs::create_dir_all(&log_base)
                .with_context(|| format!("failed to create log directory {}", log_base.display()))?;
            state.log_base = Some(log_base.to_string_lossy().to_string());
        }

        if options.dry_run {
            let plan = dispatch::compute(&dag, &state, self.effective_max_parallel(&options));
            info!(ready = ?plan.ready, "dry run: dispatch plan computed, no execution performed");
            return Ok(RunSummary {
                run_status: state.status,
                completed: Vec::new(),
                failed: Vec::new(),
                blocked: plan.newly_blocked,
            });
        }

        state.status = RunStatus::Running;
        if state.started_at.is_none() {
            state.started_at = Some(chrono::Utc::now());
        }
        store::save(&self.dag_path, &dag, Some(&state))?;

        let summary = self.drive(&dag, &mut state, &options, manager)?;
        Ok(summary)
    }

    fn effective_max_parallel(&self, options: &RunOptions) -> u32 {
        options.max_parallel_override.unwrap_or(self.config.max_parallel)
    }

    /// Build the run state for this invocation: fresh reset, resume recovery
    /// (§4.1.4), `--only`/`--clean` handling, and ensuring every feature has
    /// exactly one spec state (§3.3 invariant 1).
    fn prepare_state(
        &self,
        dag: &Dag,
        existing: Option<RunState>,
        options: &RunOptions,
        manager: &WorktreeManager,
    ) -> Result<RunState> {
        let mut state = if options.fresh {
            if let Some(existing) = &existing {
                for (id, spec) in &existing.specs {
                    if spec.worktree.is_some() {
                        let _ = manager.remove(&dag.id, id, true);
                    }
                }
            }
            let mut fresh = RunState::new(dag.id.clone());
            if options.fresh_keep_logs {
                fresh.log_base = existing.and_then(|s| s.log_base);
            }
            fresh
        } else {
            existing.unwrap_or_else(|| RunState::new(dag.id.clone()))
        };

        // Resume recovery (§4.1.4): stale locks on `running` specs.
        for (id, spec) in state.specs.iter_mut() {
            if spec.status != SpecStatus::Running {
                continue;
            }
            let Some(worktree) = &spec.worktree else { continue };
            let stale = is_stale(Path::new(worktree)).unwrap_or(true);
            if stale {
                spec.status = SpecStatus::Failed;
                spec.failure_reason = Some(crate::state::model::FailureReason::new(
                    "resume",
                    "stale process: worktree lock heartbeat expired",
                ));
                warn!(spec = id.as_str(), "resume: stale lock detected, marking failed");
            }
        }

        // `--force` on a failed spec: remove worktree, reset to pending.
        if options.force {
            let failed_ids: Vec<String> = state
                .specs
                .iter()
                .filter(|(_, s)| s.status == SpecStatus::Failed)
                .map(|(id, _)| id.clone())
                .collect();
            for id in failed_ids {
                let _ = manager.remove(&dag.id, &id, true);
                state.reset_spec(&id)?;
            }
        }

        // Ensure every feature has exactly one spec state.
        for (_, feature) in dag.features() {
            state.specs.entry(feature.id.clone()).or_insert_with(SpecState::new);
        }

        // `--only <ids> [--clean]` (§4.1.2).
        if let Some(only) = &options.only {
            let all_ids = dag.feature_ids();
            for id in only {
                if !all_ids.contains(id) {
                    bail!("--only references unknown feature '{id}'");
                }
            }
            let only_set: std::collections::HashSet<String> = only.iter().cloned().collect();
            for id in only {
                let (_, feature) = dag.find_feature(id).expect("validated above");
                for dep in &feature.depends_on {
                    if only_set.contains(dep) {
                        continue;
                    }
                    let dep_completed = state
                        .specs
                        .get(dep)
                        .map(|s| s.status == SpecStatus::Completed)
                        .unwrap_or(false);
                    if !dep_completed {
                        bail!("--only cannot run '{id}': dependency '{dep}' is not completed and not included");
                    }
                }
            }
            for id in &options.clean {
                let _ = manager.remove(&dag.id, id, true);
                state.reset_spec(id)?;
            }
            // Every feature not in --only is treated as already satisfied
            // (blocked from scheduling by marking it out of the dispatch
            // pool): we simulate this by forcing non-only pending specs to
            // `blocked` for the duration of this run's bookkeeping view.
            for (id, spec) in state.specs.iter_mut() {
                if !only_set.contains(id) && spec.status == SpecStatus::Pending {
                    spec.status = SpecStatus::Blocked;
                }
            }
        } else {
            for id in &options.clean {
                let _ = manager.remove(&dag.id, id, true);
                state.reset_spec(id)?;
            }
        }

        Ok(state)
    }

    fn drive(
        &self,
        dag: &Dag,
        state: &mut RunState,
        options: &RunOptions,
        manager: Arc<WorktreeManager>,
    ) -> Result<RunSummary> {
        let max_parallel = self.effective_max_parallel(options);
        let (tx, rx) = mpsc::channel::<WorkerEvent>();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut handles: HashMap<String, JoinHandle<()>> = HashMap::new();

        let mut effective_config = self.config.clone();
        if let Some(autocommit) = options.autocommit_override {
            effective_config.autocommit = autocommit;
        }
        let effective_config = Arc::new(effective_config);

        let log_base = PathBuf::from(state.log_base.clone().expect("log_base set before drive"));

        let sigint_cancel = cancel.clone();
        let ctrlc_installed = ctrlc::set_handler(move || {
            sigint_cancel.store(true, Ordering::SeqCst);
        });
        if ctrlc_installed.is_err() {
            warn!("failed to install SIGINT handler; cancellation via signal unavailable");
        }

        let mut fail_fast_triggered = false;

        loop {
            if cancel.load(Ordering::SeqCst) {
                break;
            }

            let plan = dispatch::compute(dag, state, max_parallel);
            for id in &plan.newly_blocked {
                if let Some(spec) = state.specs.get_mut(id) {
                    if spec.status == SpecStatus::Pending {
                        spec.transition(SpecStatus::Blocked).ok();
                    }
                }
            }
            if !plan.newly_blocked.is_empty() {
                store::save(&self.dag_path, dag, Some(state))?;
            }

            for id in &plan.ready {
                let (_, feature) = dag.find_feature(id).expect("ready spec exists");
                let log_file = log_base.join(format!("{id}.log"));
                let spec = state.specs.get_mut(id).expect("ready spec has state");
                spec.transition(SpecStatus::Running)?;
                spec.branch = Some(WorktreeManager::branch_name(&dag.id, id));
                spec.worktree = Some(manager.worktree_path(&dag.id, id).to_string_lossy().to_string());
                spec.log_file = Some(log_file.to_string_lossy().to_string());
                store::save(&self.dag_path, dag, Some(state))?;

                let handle = worker::run_spawned(
                    id.clone(),
                    dag.id.clone(),
                    feature.description.clone(),
                    log_file,
                    effective_config.clone(),
                    self.agent.clone(),
                    manager.clone(),
                    options.force,
                    cancel.clone(),
                    tx.clone(),
                );
                handles.insert(id.clone(), handle);
            }

            if handles.is_empty() && dispatch::is_run_terminal(dag, state) {
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(WorkerEvent::StageUpdate { spec_id, stage }) => {
                    if let Some(spec) = state.specs.get_mut(&spec_id) {
                        spec.current_stage = Some(stage);
                    }
                    store::save(&self.dag_path, dag, Some(state))?;
                }
                Ok(WorkerEvent::Finished { spec_id, outcome }) => {
                    handles.remove(&spec_id).map(|h| h.join().ok());
                    self.apply_outcome(dag, state, &spec_id, outcome, options, &cancel, &mut fail_fast_triggered)?;
                    store::save(&self.dag_path, dag, Some(state))?;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        // Drain any in-flight workers after a cancellation request.
        if cancel.load(Ordering::SeqCst) {
            while !handles.is_empty() {
                match rx.recv_timeout(Duration::from_secs(5)) {
                    Ok(WorkerEvent::Finished { spec_id, outcome }) => {
                        handles.remove(&spec_id).map(|h| h.join().ok());
                        self.apply_outcome(dag, state, &spec_id, outcome, options, &cancel, &mut fail_fast_triggered)?;
                    }
                    Ok(WorkerEvent::StageUpdate { .. }) => continue,
                    Err(_) => break,
                }
            }
            // `--fail-fast` drives the run to `failed` once in-flight work
            // drains (§4.1.2); `interrupted` is reserved for a real SIGINT.
            state.status = if fail_fast_triggered { RunStatus::Failed } else { RunStatus::Interrupted };
            state.completed_at = Some(chrono::Utc::now());
            store::save(&self.dag_path, dag, Some(state))?;

            return Ok(RunSummary {
                run_status: state.status,
                completed: spec_ids_with(state, SpecStatus::Completed),
                failed: spec_ids_with(state, SpecStatus::Failed),
                blocked: spec_ids_with(state, SpecStatus::Blocked),
            });
        }

        let succeeded = dispatch::run_succeeded(state);
        state.status = if succeeded { RunStatus::Completed } else { RunStatus::Failed };
        state.completed_at = Some(chrono::Utc::now());
        store::save(&self.dag_path, dag, Some(state))?;

        Ok(RunSummary {
            run_status: state.status,
            completed: spec_ids_with(state, SpecStatus::Completed),
            failed: spec_ids_with(state, SpecStatus::Failed),
            blocked: spec_ids_with(state, SpecStatus::Blocked),
        })
    }

    fn apply_outcome(
        &self,
        _dag: &Dag,
        state: &mut RunState,
        spec_id: &str,
        outcome: WorkerOutcome,
        options: &RunOptions,
        cancel: &Arc<AtomicBool>,
        fail_fast_triggered: &mut bool,
    ) -> Result<()> {
        let spec = state
            .specs
            .get_mut(spec_id)
            .with_context(|| format!("worker reported result for unknown spec '{spec_id}'"))?;

        match outcome {
            WorkerOutcome::Completed { branch, worktree, commit } => {
                spec.branch = Some(branch);
                spec.worktree = Some(worktree.to_string_lossy().to_string());
                spec.commit = Some(commit);
                spec.transition(SpecStatus::Completed)?;
                spec.merge = Some(MergeState::default());
            }
            WorkerOutcome::Failed { reason, branch, worktree } => {
                if let Some(b) = branch {
                    spec.branch = Some(b);
                }
                if let Some(w) = worktree {
                    spec.worktree = Some(w.to_string_lossy().to_string());
                }
                spec.failure_reason = Some(reason);
                spec.transition(SpecStatus::Failed)?;
                if options.fail_fast && !*fail_fast_triggered {
                    *fail_fast_triggered = true;
                    cancel.store(true, Ordering::SeqCst);
                }
            }
            WorkerOutcome::Cancelled => {
                spec.failure_reason = Some(crate::state::model::FailureReason::new("cancelled", "cancelled"));
                spec.transition(SpecStatus::Failed)?;
            }
        }
        Ok(())
    }
}

fn spec_ids_with(state: &RunState, status: SpecStatus) -> Vec<String> {
    let mut ids: Vec<String> = state
        .specs
        .iter()
        .filter(|(_, s)| s.status == status)
        .map(|(id, _)| id.clone())
        .collect();
    ids.sort();
    ids
}
