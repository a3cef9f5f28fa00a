//! Scenario: completed specs merge into the base branch in dependency order.

use tempfile::TempDir;
use weft::engine::{Engine, RunOptions};
use weft::merge::{self, MergeOptions};
use weft::state::model::MergeStatus;
use weft::state::{load, Loaded};
use weft::worktree::WorktreeManager;

use crate::helpers::*;

#[test]
fn merge_runs_completed_specs_in_dependency_order() {
    let repo = create_temp_git_repo();
    let dag_path = write_dag_file(repo.path(), "dag.yaml", linear_dag_yaml());
    let cache = TempDir::new().unwrap();
    let config = test_config(repo.path(), cache.path());

    let engine = Engine::new(dag_path.clone(), config.clone(), noop_agent());
    let summary = engine.run(RunOptions::new()).expect("run completes");
    assert_eq!(summary.completed, vec!["a".to_string(), "b".to_string()]);

    // The no-op agent leaves both branches with no commits ahead of `main`;
    // give each branch a real commit so there's something to merge.
    for spec in ["a", "b"] {
        let branch = WorktreeManager::branch_name("test-dag", spec);
        let worktree_path = config.worktrees_root().join("test-dag").join(spec);
        std::fs::write(worktree_path.join(format!("{spec}.txt")), "content").unwrap();
        std::process::Command::new("git").args(["add", "."]).current_dir(&worktree_path).output().unwrap();
        std::process::Command::new("git")
            .args(["commit", "-m", &format!("work for {branch}")])
            .current_dir(&worktree_path)
            .output()
            .unwrap();
    }

    let Loaded { dag, state } = load(&dag_path).unwrap();
    let mut state = state.unwrap();
    let manager = WorktreeManager::new(repo.path().to_path_buf(), config.worktrees_root());
    let options = MergeOptions { cleanup: true, ..Default::default() };
    let merge_summary = merge::run(&dag_path, &dag, &mut state, &manager, &options).expect("merge succeeds");

    assert_eq!(merge_summary.merged, vec!["a".to_string(), "b".to_string()]);
    assert!(merge_summary.failed.is_empty());

    for spec in ["a", "b"] {
        assert_eq!(state.specs[spec].merge.as_ref().unwrap().status, MergeStatus::Merged);
        assert!(state.specs[spec].merge.as_ref().unwrap().sha.is_some());
    }

    // `cleanup: true` removed both worktrees after their merges landed.
    assert!(!config.worktrees_root().join("test-dag").join("a").exists());
    assert!(!config.worktrees_root().join("test-dag").join("b").exists());

    // `b`'s content landed on main only after `a`'s, confirming ordering.
    let log = std::process::Command::new("git")
        .args(["log", "--format=%s", "main"])
        .current_dir(repo.path())
        .output()
        .unwrap();
    let subjects = String::from_utf8_lossy(&log.stdout);
    let a_pos = subjects.find("dag/test-dag/a").unwrap();
    let b_pos = subjects.find("dag/test-dag/b").unwrap();
    assert!(b_pos < a_pos, "git log lists newest first, so b (merged second) should appear first");
}
