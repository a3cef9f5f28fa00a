//! Scenario: a run interrupted partway through resumes and finishes the
//! remaining specs without re-running the ones already completed.

use tempfile::TempDir;
use weft::engine::{Engine, RunOptions};
use weft::state::model::{RunState, RunStatus, SpecState, SpecStatus};
use weft::state::{save, Loaded};

use crate::helpers::*;

#[test]
fn resume_picks_up_from_interrupted_state() {
    let repo = create_temp_git_repo();
    let dag_path = write_dag_file(repo.path(), "dag.yaml", linear_dag_yaml());
    let cache = TempDir::new().unwrap();
    let config = test_config(repo.path(), cache.path());

    let Loaded { dag, .. } = weft::state::load(&dag_path).unwrap();

    // Simulate a prior run interrupted after `a` completed but before `b`
    // started: no worktree, no branch recorded for `b` yet.
    let mut state = RunState::new(dag.id.clone());
    let mut a = SpecState::new();
    a.status = SpecStatus::Completed;
    state.specs.insert("a".into(), a);
    state.specs.insert("b".into(), SpecState::new());
    state.status = RunStatus::Interrupted;
    save(&dag_path, &dag, Some(&state)).unwrap();

    let engine = Engine::new(dag_path.clone(), config, noop_agent());
    let summary = engine.run(RunOptions::new()).expect("resume succeeds");

    assert_eq!(summary.run_status, RunStatus::Completed);
    assert_eq!(summary.completed, vec!["a".to_string(), "b".to_string()]);

    let resumed = load_state(&dag_path);
    // `a` never got a worktree assigned by this run since it was already
    // completed going in.
    assert!(resumed.specs["a"].worktree.is_none());
    assert!(resumed.specs["b"].worktree.is_some());
}

#[test]
fn stale_running_spec_is_marked_failed_on_resume() {
    let repo = create_temp_git_repo();
    let dag_path = write_dag_file(repo.path(), "dag.yaml", linear_dag_yaml());
    let cache = TempDir::new().unwrap();
    let config = test_config(repo.path(), cache.path());

    let Loaded { dag, .. } = weft::state::load(&dag_path).unwrap();
    let manager = weft::worktree::WorktreeManager::new(repo.path().to_path_buf(), config.worktrees_root());
    let worktree = manager.create(&dag.id, "a", "main").unwrap();

    let mut state = RunState::new(dag.id.clone());
    let mut a = SpecState::new();
    a.status = SpecStatus::Running;
    a.worktree = Some(worktree.path.to_string_lossy().to_string());
    a.branch = Some(worktree.branch.clone());
    state.specs.insert("a".into(), a);
    state.specs.insert("b".into(), SpecState::new());
    state.status = RunStatus::Interrupted;
    save(&dag_path, &dag, Some(&state)).unwrap();

    // No heartbeat/lock file was ever written at `worktree.path`, so it
    // reads as stale immediately; resume must not silently keep waiting on
    // a process that's gone.
    let engine = Engine::new(dag_path.clone(), config, noop_agent());
    engine.run(RunOptions::new()).expect("resume treats the stale spec as failed, not an error");

    let resumed = load_state(&dag_path);
    assert_eq!(resumed.specs["a"].status, SpecStatus::Failed);
    assert_eq!(resumed.specs["a"].failure_reason.as_ref().unwrap().stage, "resume");
}
