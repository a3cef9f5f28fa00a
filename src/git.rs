//! Git subprocess helpers: branch status, worktree plumbing, merge execution.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

pub fn has_uncommitted_changes(repo_root: &Path) -> Result<bool> {
    let output = run(repo_root, &["status", "--porcelain"])?;
    Ok(output.lines().any(|line| !line.starts_with("??") && !line.is_empty()))
}

pub fn current_branch(repo_root: &Path) -> Result<String> {
    Ok(run(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
}

pub fn branch_exists(repo_root: &Path, branch: &str) -> Result<bool> {
    let output = Command::new("git")
        .args(["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")])
        .current_dir(repo_root)
        .status()
        .with_context(|| format!("failed to check existence of branch {branch}"))?;
    Ok(output.success())
}

pub fn create_branch(repo_root: &Path, name: &str, base: &str) -> Result<()> {
    run(repo_root, &["branch", name, base])?;
    Ok(())
}

pub fn delete_branch(repo_root: &Path, name: &str, force: bool) -> Result<()> {
    let flag = if force { "-D" } else { "-d" };
    run(repo_root, &["branch", flag, name])?;
    Ok(())
}

/// Whether `branch` has commits not on `base` (used by merge pre-flight and
/// commit verification, §4.4/§4.5).
pub fn is_ahead_of(repo_root: &Path, branch: &str, base: &str) -> Result<bool> {
    let count = run(repo_root, &["rev-list", "--count", &format!("{base}..{branch}")])?;
    Ok(count.trim().parse::<u32>().unwrap_or(0) > 0)
}

pub fn head_sha(repo_root: &Path) -> Result<String> {
    Ok(run(repo_root, &["rev-parse", "HEAD"])?.trim().to_string())
}

pub fn has_unpushed_commits(repo_root: &Path, branch: &str) -> Result<bool> {
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", &format!("{branch}@{{upstream}}")])
        .current_dir(repo_root)
        .output()
        .with_context(|| "failed to check upstream tracking branch")?;
    if !output.status.success() {
        // No upstream configured: treat local-only commits as "unpushed".
        let count = run(repo_root, &["rev-list", "--count", branch])?;
        return Ok(count.trim().parse::<u32>().unwrap_or(0) > 0);
    }
    let upstream = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let count = run(repo_root, &["rev-list", "--count", &format!("{upstream}..{branch}")])?;
    Ok(count.trim().parse::<u32>().unwrap_or(0) > 0)
}

#[derive(Debug, Clone)]
pub enum MergeResult {
    Success { files_changed: u32, insertions: u32, deletions: u32 },
    Conflict { conflicting_files: Vec<String> },
    FastForward,
    AlreadyUpToDate,
}

pub fn checkout_branch(repo_root: &Path, branch: &str) -> Result<()> {
    run(repo_root, &["checkout", branch])?;
    Ok(())
}

pub fn abort_merge(repo_root: &Path) -> Result<()> {
    run(repo_root, &["merge", "--abort"])?;
    Ok(())
}

pub fn get_conflicting_files(repo_root: &Path) -> Result<Vec<String>> {
    let output = run(repo_root, &["diff", "--name-only", "--diff-filter=U"])?;
    Ok(output.lines().map(|l| l.to_string()).filter(|l| !l.is_empty()).collect())
}

/// Merge `spec_branch` into whatever branch is currently checked out
/// (caller is expected to have already `checkout_branch`'d the target).
pub fn merge_stage(repo_root: &Path, spec_branch: &str, message: &str) -> Result<MergeResult> {
    let output = Command::new("git")
        .args(["merge", "--no-ff", "-m", message, spec_branch])
        .current_dir(repo_root)
        .output()
        .with_context(|| format!("failed to run git merge for {spec_branch}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = format!("{stdout}\n{stderr}");

    if !output.status.success() {
        if combined.contains("CONFLICT") {
            let conflicting_files = get_conflicting_files(repo_root)?;
            return Ok(MergeResult::Conflict { conflicting_files });
        }
        bail!("git merge failed: {stderr}");
    }

    if combined.contains("Already up to date") {
        return Ok(MergeResult::AlreadyUpToDate);
    }
    if combined.contains("Fast-forward") {
        return Ok(MergeResult::FastForward);
    }

    let (files_changed, insertions, deletions) = parse_merge_stats(&combined);
    Ok(MergeResult::Success { files_changed, insertions, deletions })
}

fn parse_merge_stats(text: &str) -> (u32, u32, u32) {
    // e.g. " 3 files changed, 10 insertions(+), 2 deletions(-)"
    let mut files = 0;
    let mut insertions = 0;
    let mut deletions = 0;
    for line in text.lines() {
        if !line.contains("changed") {
            continue;
        }
        let tokens: Vec<&str> = line.split(',').collect();
        for token in tokens {
            let token = token.trim();
            if let Some(n) = token.split_whitespace().next() {
                let value: u32 = n.parse().unwrap_or(0);
                if token.contains("file") {
                    files = value;
                } else if token.contains("insertion") {
                    insertions = value;
                } else if token.contains("deletion") {
                    deletions = value;
                }
            }
        }
    }
    (files, insertions, deletions)
}

pub fn conflict_resolution_instructions(spec_id: &str, branch: &str) -> String {
    format!(
        "Merge of '{spec_id}' (branch '{branch}') produced conflicts.\n\
         Resolve them in the base repository, then run:\n  \
         weft merge <dag> --continue\n\
         or run `weft merge <dag> --skip-failed` to leave it unmerged and continue with the rest."
    )
}

fn run(repo_root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .output()
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {stderr}", args.join(" "));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
