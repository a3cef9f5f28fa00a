//! Shared scaffolding for integration tests: a real git repo and a hand-built
//! `Dag` value (bypassing the YAML parser, since these scenarios care about
//! module interaction, not parsing).

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;
use weft::dag::model::{Dag, DagIdentity, Feature, Layer};

pub fn init_repo() -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    let root = dir.path();
    for args in [
        vec!["init", "-b", "main"],
        vec!["config", "user.email", "test@weft.dev"],
        vec!["config", "user.name", "Weft Test"],
    ] {
        run_git(root, &args);
    }
    std::fs::write(root.join("file.txt"), "base\n").unwrap();
    run_git(root, &["add", "."]);
    run_git(root, &["commit", "-m", "initial commit"]);
    dir
}

pub fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git").args(args).current_dir(dir).output().expect("run git");
    assert!(output.status.success(), "git {args:?} failed: {}", String::from_utf8_lossy(&output.stderr));
}

/// A single-layer DAG with `ids.len()` independent features (no `depends_on`),
/// in declaration order.
pub fn flat_dag(id: &str, ids: &[&str]) -> Dag {
    Dag {
        schema_version: "1.0".into(),
        identity: DagIdentity { id: Some(id.into()), name: id.into() },
        layers: vec![Layer {
            id: "l0".into(),
            features: ids
                .iter()
                .map(|&fid| Feature { id: fid.into(), description: String::new(), depends_on: vec![] })
                .collect(),
        }],
        id: id.into(),
    }
}
