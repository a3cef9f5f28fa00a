//! Scenario: `Config` loading (including `WEFT_CACHE_ROOT`) wired through to
//! where the engine actually writes per-spec log files.

use std::sync::Arc;

use serial_test::serial;
use tempfile::TempDir;
use weft::agent::{AgentConfig, AgentKind, CommandAgent};
use weft::config::Config;
use weft::engine::{Engine, RunOptions};

use crate::helpers::*;

#[test]
fn project_id_is_derived_from_the_repo_root_basename() {
    let repo = init_repo();
    let config = Config::load(repo.path()).unwrap();
    let expected = repo.path().file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(config.project_id(), expected);
}

#[test]
#[serial]
fn weft_cache_root_env_override_relocates_worktrees_and_logs() {
    let repo = init_repo();
    let dag_path = repo.path().join("dag.yaml");
    std::fs::write(
        &dag_path,
        "schema_version: \"1.0\"\ndag:\n  id: d\n  name: d\nlayers:\n  - id: l0\n    features:\n      - id: a\n        description: \"do a\"\n",
    )
    .unwrap();

    let cache = TempDir::new().unwrap();
    std::env::set_var("WEFT_CACHE_ROOT", cache.path());
    let config = Config::load(repo.path()).unwrap();
    std::env::remove_var("WEFT_CACHE_ROOT");

    assert_eq!(config.cache_root, cache.path());
    assert_eq!(config.worktrees_root(), cache.path().join("worktrees"));

    let agent = Arc::new(CommandAgent::new(AgentConfig { kind: AgentKind::Command { program: "true".into(), args: vec![] } }));
    let engine = Engine::new(dag_path.clone(), config.clone(), agent);
    let summary = engine.run(RunOptions::new()).expect("run completes");
    assert_eq!(summary.completed, vec!["a".to_string()]);

    // The worktree landed under the overridden cache root, not the default
    // `~/.cache/weft`.
    assert!(cache.path().join("worktrees").join("d").join("a").exists());

    let project_id = config.project_id();
    let log_path = config.log_base(&project_id, "d").join("a.log");
    assert!(log_path.exists(), "expected a log file at {}", log_path.display());
}
