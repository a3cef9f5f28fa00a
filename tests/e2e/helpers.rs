//! Shared scaffolding for end-to-end tests: a real git repo in a temp
//! directory, a minimal two-layer DAG file, and a `Config` pointed at an
//! isolated cache root so runs never touch the operator's real `~/.cache`.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;
use weft::agent::{AgentConfig, AgentKind, CommandAgent};
use weft::config::Config;
use weft::state::store;

/// Creates a temporary git repository with an initial commit on `main`.
///
/// Returns the `TempDir` that must be kept in scope for the test's lifetime.
pub fn create_temp_git_repo() -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    let root = dir.path();
    for args in [
        vec!["init", "-b", "main"],
        vec!["config", "user.email", "test@weft.dev"],
        vec!["config", "user.name", "Weft Test"],
    ] {
        run_git(root, &args);
    }
    std::fs::write(root.join("README.md"), "# test repo\n").unwrap();
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-m", "initial commit"]);
    dir
}

fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git").args(args).current_dir(dir).output().expect("run git");
    assert!(output.status.success(), "git {args:?} failed: {}", String::from_utf8_lossy(&output.stderr));
}

/// Writes a DAG YAML file at `repo_root/<name>` with the given raw layer
/// definitions (already-formatted YAML block, indented to match the file).
pub fn write_dag_file(repo_root: &Path, name: &str, layers_yaml: &str) -> PathBuf {
    let path = repo_root.join(name);
    let contents = format!(
        "schema_version: \"1.0\"\ndag:\n  id: test-dag\n  name: test dag\nlayers:\n{layers_yaml}"
    );
    std::fs::write(&path, contents).expect("write dag file");
    path
}

/// A two-layer linear DAG: `a` with no dependencies, `b` depending on `a`.
pub fn linear_dag_yaml() -> &'static str {
    "  - id: l0\n    features:\n      - id: a\n        description: \"implement a\"\n  - id: l1\n    features:\n      - id: b\n        description: \"implement b\"\n        depends_on: [a]\n"
}

/// A single layer with two independent features, for fan-out/parallel tests.
pub fn parallel_dag_yaml() -> &'static str {
    "  - id: l0\n    features:\n      - id: a\n        description: \"implement a\"\n      - id: b\n        description: \"implement b\"\n"
}

/// A `Config` rooted at `repo_root` with `cache_root` redirected under
/// `cache_dir` so worktrees and logs land in a scratch directory, and the
/// agent set to the `true` no-op placeholder (every stage trivially succeeds).
pub fn test_config(repo_root: &Path, cache_dir: &Path) -> Config {
    let mut config = Config::load(repo_root).expect("load default config");
    config.cache_root = cache_dir.to_path_buf();
    config
}

pub fn noop_agent() -> Arc<CommandAgent> {
    Arc::new(CommandAgent::new(AgentConfig { kind: AgentKind::Command { program: "true".into(), args: vec![] } }))
}

/// A `CommandAgent` whose stage command always fails (`false`), for
/// failure-path scenarios.
pub fn failing_agent() -> Arc<CommandAgent> {
    Arc::new(CommandAgent::new(AgentConfig { kind: AgentKind::Command { program: "false".into(), args: vec![] } }))
}

pub fn load_state(dag_path: &Path) -> weft::state::model::RunState {
    store::load(dag_path).expect("load dag state").state.expect("run has state")
}
