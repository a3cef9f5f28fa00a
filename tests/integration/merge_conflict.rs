//! Scenario: the merge executor, the worktree manager, and real git conflict
//! resolution interacting the way the CLI's `merge` command does.

use std::collections::HashMap;

use weft::git;
use weft::merge::{self, MergeOptions};
use weft::state::model::{MergeStatus, RunState, SpecState, SpecStatus};
use weft::worktree::WorktreeManager;

use crate::helpers::*;

fn diverge_file_txt(repo_root: &std::path::Path, branch: &str, contents: &str) {
    run_git(repo_root, &["checkout", "-b", branch, "main"]);
    std::fs::write(repo_root.join("file.txt"), contents).unwrap();
    run_git(repo_root, &["commit", "-am", &format!("{branch} change")]);
    run_git(repo_root, &["checkout", "main"]);
}

fn completed_spec(branch: &str) -> SpecState {
    let mut spec = SpecState::new();
    spec.status = SpecStatus::Completed;
    spec.branch = Some(branch.to_string());
    spec
}

/// Two independent specs both edit `file.txt` from `main`; `a` sorts first
/// (topological tie-break is alphabetical) and merges cleanly, `b` then
/// conflicts with the result and is left for the operator to resolve.
#[test]
fn conflicting_merge_is_left_unresolved_for_the_operator() {
    let repo = init_repo();
    let dag = flat_dag("d", &["a", "b"]);

    diverge_file_txt(repo.path(), "dag/d/a", "a change\n");
    diverge_file_txt(repo.path(), "dag/d/b", "b change\n");

    let mut specs = HashMap::new();
    specs.insert("a".to_string(), completed_spec("dag/d/a"));
    specs.insert("b".to_string(), completed_spec("dag/d/b"));
    let mut state = RunState { specs, ..RunState::new(dag.id.clone()) };

    let manager = WorktreeManager::new(repo.path().to_path_buf(), repo.path().join("worktrees"));
    let options = MergeOptions::default();
    // `merge::run` rewrites this file from `dag`/`state` on every observable
    // event; it just needs to exist as a writable path.
    let dag_path = repo.path().join("dag.yaml");

    let summary = merge::run(&dag_path, &dag, &mut state, &manager, &options).expect("merge run itself does not error");

    assert_eq!(summary.merged, vec!["a".to_string()]);
    assert_eq!(summary.failed, vec!["b".to_string()]);
    assert!(summary.skipped.is_empty());

    assert_eq!(state.specs["a"].merge.as_ref().unwrap().status, MergeStatus::Merged);
    let b_merge = state.specs["b"].merge.as_ref().unwrap();
    assert_eq!(b_merge.status, MergeStatus::Failed);
    let error = b_merge.error.as_ref().unwrap();
    assert!(error.contains("weft merge <dag> --continue"), "should point the operator at --continue: {error}");

    // The conflict was left in place, not aborted: main still has unmerged
    // paths for file.txt.
    assert!(git::get_conflicting_files(repo.path()).unwrap().contains(&"file.txt".to_string()));
}

/// With `--skip-failed`, a conflicted merge must not block the rest of the
/// run: the executor aborts it before moving on to the next mergeable spec.
#[test]
fn skip_failed_aborts_the_conflict_and_continues() {
    let repo = init_repo();
    let dag = flat_dag("d", &["a", "b", "c"]);

    diverge_file_txt(repo.path(), "dag/d/a", "a change\n");
    diverge_file_txt(repo.path(), "dag/d/b", "b change\n");
    // `c` touches an unrelated file, so its merge is clean regardless of
    // what happened to `file.txt` on main.
    run_git(repo.path(), &["checkout", "-b", "dag/d/c", "main"]);
    std::fs::write(repo.path().join("other.txt"), "c content\n").unwrap();
    run_git(repo.path(), &["add", "."]);
    run_git(repo.path(), &["commit", "-m", "c change"]);
    run_git(repo.path(), &["checkout", "main"]);

    let mut specs = HashMap::new();
    specs.insert("a".to_string(), completed_spec("dag/d/a"));
    specs.insert("b".to_string(), completed_spec("dag/d/b"));
    specs.insert("c".to_string(), completed_spec("dag/d/c"));
    let mut state = RunState { specs, ..RunState::new(dag.id.clone()) };

    let manager = WorktreeManager::new(repo.path().to_path_buf(), repo.path().join("worktrees"));
    let options = MergeOptions { skip_failed: true, ..Default::default() };
    let dag_path = repo.path().join("dag.yaml");

    let summary = merge::run(&dag_path, &dag, &mut state, &manager, &options).expect("merge run succeeds");

    assert_eq!(summary.merged, vec!["a".to_string(), "c".to_string()]);
    assert_eq!(summary.failed, vec!["b".to_string()]);

    // The abort left main clean, so `c`'s merge could actually land.
    assert!(git::get_conflicting_files(repo.path()).unwrap().is_empty());
    assert!(repo.path().join("other.txt").exists());
}
