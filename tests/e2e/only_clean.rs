//! Scenario: `--only` restricts execution to named specs (with their
//! completed dependencies as the only other requirement), and `--clean`
//! resets a spec back to pending before the restricted run.

use tempfile::TempDir;
use weft::engine::{Engine, RunOptions};
use weft::state::model::SpecStatus;
use weft::state::Loaded;

use crate::helpers::*;

#[test]
fn only_runs_just_the_named_spec_once_its_dependency_is_complete() {
    let repo = create_temp_git_repo();
    let dag_path = write_dag_file(repo.path(), "dag.yaml", linear_dag_yaml());
    let cache = TempDir::new().unwrap();
    let config = test_config(repo.path(), cache.path());

    // First, complete `a` on a full run.
    let engine = Engine::new(dag_path.clone(), config.clone(), noop_agent());
    engine.run(RunOptions::new()).expect("first run completes");

    // Reset `b` to pending by hand, then rerun restricted to `--only b`.
    let mut state = load_state(&dag_path);
    state.specs.get_mut("b").unwrap().status = SpecStatus::Pending;
    let Loaded { dag, .. } = weft::state::load(&dag_path).unwrap();
    weft::state::save(&dag_path, &dag, Some(&state)).unwrap();

    let engine = Engine::new(dag_path.clone(), config, noop_agent());
    let options = RunOptions { only: Some(vec!["b".to_string()]), ..RunOptions::new() };
    let summary = engine.run(options).expect("restricted run succeeds");

    assert_eq!(summary.completed, vec!["b".to_string()]);
    let state = load_state(&dag_path);
    assert_eq!(state.specs["a"].status, SpecStatus::Completed);
    assert_eq!(state.specs["b"].status, SpecStatus::Completed);
}

#[test]
fn only_rejects_a_dependency_that_is_not_completed_and_not_included() {
    let repo = create_temp_git_repo();
    let dag_path = write_dag_file(repo.path(), "dag.yaml", linear_dag_yaml());
    let cache = TempDir::new().unwrap();
    let config = test_config(repo.path(), cache.path());

    let engine = Engine::new(dag_path, config, noop_agent());
    let options = RunOptions { only: Some(vec!["b".to_string()]), ..RunOptions::new() };
    let result = engine.run(options);

    assert!(result.is_err(), "b depends on a, which hasn't run and isn't in --only");
}

#[test]
fn clean_resets_a_completed_spec_before_rerunning_it() {
    let repo = create_temp_git_repo();
    let dag_path = write_dag_file(repo.path(), "dag.yaml", linear_dag_yaml());
    let cache = TempDir::new().unwrap();
    let config = test_config(repo.path(), cache.path());

    let engine = Engine::new(dag_path.clone(), config.clone(), noop_agent());
    engine.run(RunOptions::new()).expect("first run completes");

    let engine = Engine::new(dag_path.clone(), config, noop_agent());
    let options = RunOptions { clean: vec!["a".to_string()], ..RunOptions::new() };
    let summary = engine.run(options).expect("cleaned rerun succeeds");

    assert_eq!(summary.completed, vec!["a".to_string(), "b".to_string()]);
}
