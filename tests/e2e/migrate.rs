//! Scenario: a legacy sibling `<dag>.state.yaml` file is migrated into the
//! DAG file's inline state on first load, then deleted.

use tempfile::TempDir;
use weft::state::model::SpecStatus;

use crate::helpers::*;

#[test]
fn legacy_sibling_state_file_migrates_into_inline_state() {
    let repo = create_temp_git_repo();
    let dag_path = write_dag_file(repo.path(), "dag.yaml", linear_dag_yaml());

    let legacy_path = dag_path.with_extension("state.yaml");
    std::fs::write(
        &legacy_path,
        "run:\n  status: completed\n  dag_id: test-dag\nspecs:\n  a:\n    status: completed\n  b:\n    status: completed\n",
    )
    .unwrap();

    let loaded = weft::state::load(&dag_path).expect("migration succeeds");
    assert!(loaded.has_inline_state());
    assert_eq!(loaded.state.as_ref().unwrap().specs["a"].status, SpecStatus::Completed);
    assert_eq!(loaded.state.as_ref().unwrap().specs["b"].status, SpecStatus::Completed);
    assert!(!legacy_path.exists(), "legacy file is deleted once migrated");

    // The migration was persisted inline; a fresh engine run sees it without
    // the legacy file being present at all.
    let cache = TempDir::new().unwrap();
    let config = test_config(repo.path(), cache.path());
    let engine = weft::engine::Engine::new(dag_path.clone(), config, noop_agent());
    let summary = engine.run(weft::engine::RunOptions::new()).expect("nothing left to do, run is a no-op");
    assert_eq!(summary.completed, vec!["a".to_string(), "b".to_string()]);
    assert!(summary.failed.is_empty());
}
