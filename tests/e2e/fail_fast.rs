//! Scenario: `--fail-fast` cancels in-flight specs once one has failed.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use weft::agent::{AgentCapability, StageResult};
use weft::engine::{Engine, RunOptions};
use weft::state::model::{RunStatus, SpecStatus};

use crate::helpers::*;

/// Fails instantly for the spec whose description names it as the trigger;
/// every other spec's first stage sleeps long enough for the cancellation
/// to land before its second stage starts.
struct CascadeAgent;

impl AgentCapability for CascadeAgent {
    fn execute_stage(&self, _workspace: &Path, spec_description: &str, _stage: &str) -> Result<StageResult> {
        if spec_description.contains("trigger failure") {
            return Ok(StageResult { success: false, message: "boom".into() });
        }
        std::thread::sleep(Duration::from_millis(400));
        Ok(StageResult { success: true, message: String::new() })
    }
}

#[test]
fn failing_spec_cancels_its_siblings() {
    let repo = create_temp_git_repo();
    let layers = "  - id: l0\n    features:\n      - id: a\n        description: \"trigger failure\"\n      - id: b\n        description: \"steady work\"\n";
    let dag_path = write_dag_file(repo.path(), "dag.yaml", layers);
    let cache = TempDir::new().unwrap();
    let config = test_config(repo.path(), cache.path());

    let engine = Engine::new(dag_path.clone(), config, Arc::new(CascadeAgent));
    let options = RunOptions { fail_fast: true, ..RunOptions::new() };
    let summary = engine.run(options).expect("run completes with failures, not an error");

    assert_eq!(summary.run_status, RunStatus::Failed);
    assert!(summary.completed.is_empty());
    assert_eq!(summary.failed.len(), 2, "both the trigger and its cancelled sibling count as failed");

    let state = load_state(&dag_path);
    assert_eq!(state.specs["a"].status, SpecStatus::Failed);
    assert_eq!(state.specs["a"].failure_reason.as_ref().unwrap().stage, "specify");
    assert_eq!(state.specs["b"].status, SpecStatus::Failed);
    assert_eq!(state.specs["b"].failure_reason.as_ref().unwrap().stage, "cancelled");
}

#[test]
fn without_fail_fast_siblings_keep_running() {
    let repo = create_temp_git_repo();
    let layers = "  - id: l0\n    features:\n      - id: a\n        description: \"trigger failure\"\n      - id: b\n        description: \"steady work\"\n";
    let dag_path = write_dag_file(repo.path(), "dag.yaml", layers);
    let cache = TempDir::new().unwrap();
    let config = test_config(repo.path(), cache.path());

    let engine = Engine::new(dag_path.clone(), config, Arc::new(CascadeAgent));
    let summary = engine.run(RunOptions::new()).expect("run completes");

    assert_eq!(summary.completed, vec!["b".to_string()]);
    assert_eq!(summary.failed, vec!["a".to_string()]);
}
