//! Commit verification and bounded-retry autocommit (§4.5).

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::warn;

use crate::git;
use crate::state::model::{CommitState, CommitStatus};

pub struct CommitOutcome {
    pub state: CommitState,
}

/// Default autocommit command: stage everything, commit with a fixed
/// message. Overridable via `--cmd` / config.
pub const DEFAULT_AUTOCOMMIT_CMD: &str = "git add -A && git commit -m 'weft: autocommit'";

#[allow(clippy::too_many_arguments)]
pub fn post_execution_commit_flow(
    spec_id: &str,
    worktree: &Path,
    branch: &str,
    base_branch: &str,
    autocommit: bool,
    autocommit_retries: u32,
    autocommit_cmd: Option<&str>,
) -> Result<CommitOutcome> {
    let mut attempts = 0u32;
    let mut uncommitted = git::has_uncommitted_changes(worktree)?;

    if uncommitted && !autocommit {
        return Ok(CommitOutcome {
            state: CommitState { status: CommitStatus::Failed, sha: None, attempts },
        });
    }

    if uncommitted && autocommit {
        let cmd = autocommit_cmd.unwrap_or(DEFAULT_AUTOCOMMIT_CMD);
        while uncommitted && attempts < autocommit_retries {
            attempts += 1;
            if let Err(e) = run_autocommit(worktree, cmd) {
                warn!(spec = spec_id, attempt = attempts, error = %e, "autocommit attempt failed");
            }
            uncommitted = git::has_uncommitted_changes(worktree)?;
        }
        if uncommitted {
            return Ok(CommitOutcome {
                state: CommitState { status: CommitStatus::Failed, sha: None, attempts },
            });
        }
    }

    let ahead = git::is_ahead_of(worktree, branch, base_branch)?;
    if !ahead {
        return Ok(CommitOutcome { state: CommitState { status: CommitStatus::Pending, sha: None, attempts } });
    }

    let sha = git::head_sha(worktree)?;
    Ok(CommitOutcome { state: CommitState { status: CommitStatus::Committed, sha: Some(sha), attempts } })
}

fn run_autocommit(worktree: &Path, cmd: &str) -> Result<()> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(worktree)
        .status()
        .with_context(|| format!("failed to run autocommit command '{cmd}'"))?;
    if !status.success() {
        anyhow::bail!("autocommit command '{cmd}' exited with {status}");
    }
    Ok(())
}
