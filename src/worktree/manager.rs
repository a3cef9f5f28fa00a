//! Worktree creation, enumeration, and safe removal (§4.3). Branches follow
//! the `dag/<dag_id>/<spec_id>` naming scheme.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::git;

#[derive(Debug, Clone)]
pub struct Worktree {
    pub path: PathBuf,
    pub branch: String,
}

pub struct WorktreeManager {
    /// The base repository's root (where `git worktree` commands run).
    repo_root: PathBuf,
    /// Parent directory under which each spec's worktree is created.
    worktrees_root: PathBuf,
}

impl WorktreeManager {
    pub fn new(repo_root: PathBuf, worktrees_root: PathBuf) -> Self {
        Self { repo_root, worktrees_root }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn branch_name(dag_id: &str, spec_id: &str) -> String {
        format!("dag/{dag_id}/{spec_id}")
    }

    pub fn worktree_path(&self, dag_id: &str, spec_id: &str) -> PathBuf {
        self.worktrees_root.join(dag_id).join(spec_id)
    }

    /// `Create(name, branch, parent_path?)`: create a new worktree rooted in
    /// the configured directory; the branch is created from `base_branch` if
    /// it does not already exist.
    pub fn create(&self, dag_id: &str, spec_id: &str, base_branch: &str) -> Result<Worktree> {
        let branch = Self::branch_name(dag_id, spec_id);
        let path = self.worktree_path(dag_id, spec_id);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        if !git::branch_exists(&self.repo_root, &branch)? {
            git::create_branch(&self.repo_root, &branch, base_branch)?;
        }

        let output = Command::new("git")
            .args(["worktree", "add", &path.to_string_lossy(), &branch])
            .current_dir(&self.repo_root)
            .output()
            .with_context(|| format!("failed to create worktree for branch {branch}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git worktree add failed: {stderr}");
        }

        Ok(Worktree { path, branch })
    }

    /// Reuse an existing worktree whose directory and branch both exist and
    /// match; otherwise create a fresh one. A mismatched worktree (wrong
    /// branch checked out) is torn down first only when `force` is set.
    pub fn get_or_create(
        &self,
        dag_id: &str,
        spec_id: &str,
        base_branch: &str,
        force: bool,
    ) -> Result<Worktree> {
        let expected_branch = Self::branch_name(dag_id, spec_id);
        let path = self.worktree_path(dag_id, spec_id);

        if path.exists() {
            let current = git::current_branch(&path).unwrap_or_default();
            if current == expected_branch {
                return Ok(Worktree { path, branch: expected_branch });
            }
            if !force {
                bail!(
                    "worktree at {} exists but is on branch '{}', expected '{}' (pass --force to recreate)",
                    path.display(),
                    current,
                    expected_branch
                );
            }
            self.remove_by_path(&path, true)?;
        }

        self.create(dag_id, spec_id, base_branch)
    }

    pub fn list(&self) -> Result<Vec<Worktree>> {
        let output = Command::new("git")
            .args(["worktree", "list", "--porcelain"])
            .current_dir(&self.repo_root)
            .output()
            .context("failed to list worktrees")?;
        if !output.status.success() {
            bail!("git worktree list failed: {}", String::from_utf8_lossy(&output.stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut worktrees = Vec::new();
        let mut path: Option<PathBuf> = None;
        for line in stdout.lines() {
            if let Some(rest) = line.strip_prefix("worktree ") {
                path = Some(PathBuf::from(rest));
            } else if let Some(rest) = line.strip_prefix("branch refs/heads/") {
                if let Some(p) = path.take() {
                    worktrees.push(Worktree { path: p, branch: rest.to_string() });
                }
            }
        }
        Ok(worktrees)
    }

    /// `Remove(name, force)` with safety (§4.3, P6): without `force`, refuse
    /// removal if the worktree has uncommitted changes or unpushed commits.
    pub fn remove(&self, dag_id: &str, spec_id: &str, force: bool) -> Result<()> {
        let path = self.worktree_path(dag_id, spec_id);
        self.remove_by_path(&path, force)
    }

    fn remove_by_path(&self, path: &Path, force: bool) -> Result<()> {
        if !force && path.exists() {
            if git::has_uncommitted_changes(path)? {
                bail!("worktree {} has uncommitted changes; refusing removal (use --force)", path.display());
            }
            let branch = git::current_branch(path)?;
            if git::has_unpushed_commits(path, &branch)? {
                bail!("worktree {} has unpushed commits on '{}'; refusing removal (use --force)", path.display(), branch);
            }
        }

        let mut args = vec!["worktree".to_string(), "remove".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(path.to_string_lossy().to_string());

        let output = Command::new("git")
            .args(&args)
            .current_dir(&self.repo_root)
            .output()
            .with_context(|| format!("failed to remove worktree {}", path.display()))?;
        if !output.status.success() {
            bail!("git worktree remove failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }

    /// `Prune()`: remove Git's record of worktrees whose directories no
    /// longer exist.
    pub fn prune(&self) -> Result<()> {
        let output = Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(&self.repo_root)
            .output()
            .context("failed to prune worktrees")?;
        if !output.status.success() {
            bail!("git worktree prune failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }
}
