//! Per-spec worker pipeline (§4.1.3): worktree acquisition, lock + heartbeat,
//! sequential stage execution, commit verification, release.
//!
//! One worker owns one worktree and blocks through its stages sequentially;
//! there is no cross-worker shared mutable state below the coordinator.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::agent::AgentCapability;
use crate::commit::post_execution_commit_flow;
use crate::config::Config;
use crate::state::model::{CommitState, FailureReason};
use crate::worktree::lock::{Acquisition, WorktreeLock};
use crate::worktree::manager::WorktreeManager;

pub enum WorkerEvent {
    StageUpdate { spec_id: String, stage: String },
    Finished { spec_id: String, outcome: WorkerOutcome },
}

pub enum WorkerOutcome {
    Completed { branch: String, worktree: PathBuf, commit: CommitState },
    Failed { reason: FailureReason, branch: Option<String>, worktree: Option<PathBuf> },
    Cancelled,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    spec_id: String,
    dag_id: String,
    description: String,
    log_file: PathBuf,
    config: Arc<Config>,
    agent: Arc<dyn AgentCapability>,
    manager: Arc<WorktreeManager>,
    force: bool,
    cancel: Arc<AtomicBool>,
    events: Sender<WorkerEvent>,
) {
    let outcome =
        run_inner(&spec_id, &dag_id, &description, &log_file, &config, &*agent, &manager, force, &cancel, &events);
    let _ = events.send(WorkerEvent::Finished { spec_id, outcome });
}

/// Spawn [`run`] on its own OS thread, returning the handle so the
/// coordinator can join it after receiving its `Finished` event.
#[allow(clippy::too_many_arguments)]
pub fn run_spawned(
    spec_id: String,
    dag_id: String,
    description: String,
    log_file: PathBuf,
    config: Arc<Config>,
    agent: Arc<dyn AgentCapability>,
    manager: Arc<WorktreeManager>,
    force: bool,
    cancel: Arc<AtomicBool>,
    events: Sender<WorkerEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        run(spec_id, dag_id, description, log_file, config, agent, manager, force, cancel, events)
    })
}

#[allow(clippy::too_many_arguments)]
fn run_inner(
    spec_id: &str,
    dag_id: &str,
    description: &str,
    log_file: &PathBuf,
    config: &Config,
    agent: &dyn AgentCapability,
    manager: &WorktreeManager,
    force: bool,
    cancel: &Arc<AtomicBool>,
    events: &Sender<WorkerEvent>,
) -> WorkerOutcome {
    let worktree = match manager.get_or_create(dag_id, spec_id, &config.base_branch, force) {
        Ok(w) => w,
        Err(e) => {
            return WorkerOutcome::Failed {
                reason: FailureReason::new("worktree-acquisition", e.to_string()),
                branch: None,
                worktree: None,
            }
        }
    };

    let lock = match WorktreeLock::acquire(&worktree.path) {
        Ok(Acquisition::Acquired(l)) | Ok(Acquisition::Stolen(l)) => l,
        Ok(Acquisition::Contended) => {
            return WorkerOutcome::Failed {
                reason: FailureReason::new("lock-acquisition", "worktree lock is held by a live process"),
                branch: Some(worktree.branch.clone()),
                worktree: Some(worktree.path.clone()),
            }
        }
        Err(e) => {
            return WorkerOutcome::Failed {
                reason: FailureReason::new("lock-acquisition", e.to_string()),
                branch: Some(worktree.branch.clone()),
                worktree: Some(worktree.path.clone()),
            }
        }
    };

    let stop_heartbeat = Arc::new(AtomicBool::new(false));
    let heartbeat_handle = {
        let stop = stop_heartbeat.clone();
        let path = worktree.path.clone();
        let interval = config.heartbeat_interval();
        thread::spawn(move || heartbeat_loop(&path, interval, &stop))
    };

    let outcome = drive_stages(spec_id, description, log_file, config, agent, &worktree.path, cancel, events)
        .map(|()| verify_commit(spec_id, config, &worktree))
        .unwrap_or_else(|cancelled| cancelled);

    stop_heartbeat.store(true, Ordering::SeqCst);
    let _ = heartbeat_handle.join();
    let _ = lock.release();

    match outcome {
        StageOutcome::Completed(commit) => {
            WorkerOutcome::Completed { branch: worktree.branch, worktree: worktree.path, commit }
        }
        StageOutcome::Failed(reason) => {
            WorkerOutcome::Failed { reason, branch: Some(worktree.branch), worktree: Some(worktree.path) }
        }
        StageOutcome::Cancelled => WorkerOutcome::Cancelled,
    }
}

enum StageOutcome {
    Completed(CommitState),
    Failed(FailureReason),
    Cancelled,
}

fn drive_stages(
    spec_id: &str,
    description: &str,
    log_file: &PathBuf,
    config: &Config,
    agent: &dyn AgentCapability,
    workspace: &PathBuf,
    cancel: &Arc<AtomicBool>,
    events: &Sender<WorkerEvent>,
) -> Result<(), StageOutcome> {
    for stage in &config.stages {
        if cancel.load(Ordering::SeqCst) {
            return Err(StageOutcome::Cancelled);
        }
        let _ = events.send(WorkerEvent::StageUpdate { spec_id: spec_id.to_string(), stage: stage.clone() });

        match agent.execute_stage(workspace, description, stage) {
            Ok(result) if result.success => {
                append_stage_log(log_file, stage, &result.message);
            }
            Ok(result) => {
                append_stage_log(log_file, stage, &result.message);
                return Err(StageOutcome::Failed(FailureReason::new(stage.clone(), result.message)));
            }
            Err(e) => {
                append_stage_log(log_file, stage, &e.to_string());
                return Err(StageOutcome::Failed(FailureReason::new(stage.clone(), e.to_string())));
            }
        }
    }
    Ok(())
}

/// Append one stage's captured output to the spec's per-spec log file
/// (§6.3); best-effort, since a log write failure should not fail the run.
fn append_stage_log(log_file: &PathBuf, stage: &str, message: &str) {
    use std::io::Write;

    if let Some(parent) = log_file.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(log_file) {
        let _ = writeln!(file, "=== {stage} ===");
        let _ = writeln!(file, "{message}");
    }
}

fn verify_commit(
    _spec_id: &str,
    config: &Config,
    worktree: &crate::worktree::manager::Worktree,
) -> StageOutcome {
    match post_execution_commit_flow(
        &worktree.branch,
        &worktree.path,
        &worktree.branch,
        &config.base_branch,
        config.autocommit,
        config.autocommit_retries,
        config.autocommit_cmd.as_deref(),
    ) {
        Ok(outcome) if outcome.state.status == crate::state::model::CommitStatus::Failed => {
            StageOutcome::Failed(FailureReason::new("commit-verification", "commit verification failed after exhausting retries"))
        }
        Ok(outcome) => StageOutcome::Completed(outcome.state),
        Err(e) => StageOutcome::Failed(FailureReason::new("commit-verification", e.to_string())),
    }
}

fn heartbeat_loop(worktree_path: &PathBuf, interval: Duration, stop: &Arc<AtomicBool>) {
    let tick = Duration::from_millis(100);
    let mut elapsed = Duration::ZERO;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        if elapsed >= interval {
            rewrite_heartbeat(worktree_path);
            elapsed = Duration::ZERO;
        }
        thread::sleep(tick);
        elapsed += tick;
    }
}

fn rewrite_heartbeat(worktree_path: &PathBuf) {
    let path = WorktreeLock::lock_path(worktree_path);
    if let Ok(serialized) = serde_json::to_string_pretty(&crate::worktree::lock::Heartbeat::now()) {
        let _ = std::fs::write(path, serialized);
    }
}
