//! Merge executor (§4.4): merges completed specs into a target branch in
//! dependency order, persisting per-spec merge status after every outcome.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::dag::model::Dag;
use crate::dag::topological_sort;
use crate::git;
use crate::state::model::{MergeState, MergeStatus, RunState, SpecStatus};
use crate::state::store;
use crate::worktree::manager::WorktreeManager;

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub target_branch: Option<String>,
    pub continue_: bool,
    pub skip_failed: bool,
    pub skip_no_commits: bool,
    pub force: bool,
    pub cleanup: bool,
    pub reset: bool,
}

#[derive(Debug)]
pub struct MergeSummary {
    pub merged: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

pub fn run(
    dag_path: &Path,
    dag: &Dag,
    state: &mut RunState,
    manager: &WorktreeManager,
    options: &MergeOptions,
) -> Result<MergeSummary> {
    let target_branch = options.target_branch.clone().unwrap_or_else(|| "main".to_string());

    if options.reset {
        for spec in state.specs.values_mut() {
            spec.merge = None;
        }
        store::save(dag_path, dag, Some(state))?;
    }

    let mergeable: HashSet<String> = state
        .specs
        .iter()
        .filter(|(_, s)| {
            s.status == SpecStatus::Completed
                && matches!(
                    s.merge.as_ref().map(|m| m.status),
                    None | Some(MergeStatus::Pending) | Some(MergeStatus::Failed) | Some(MergeStatus::Skipped)
                )
        })
        .map(|(id, _)| id.clone())
        .collect();

    let order = topological_sort(dag, &mergeable)?;

    let mut summary = MergeSummary { merged: Vec::new(), failed: Vec::new(), skipped: Vec::new() };

    for spec_id in order {
        let spec = state.specs.get(&spec_id).expect("in mergeable set");
        let branch = spec
            .branch
            .clone()
            .unwrap_or_else(|| WorktreeManager::branch_name(&dag.id, &spec_id));
        let worktree_path = spec.worktree.clone();

        // Pre-flight (§4.4 step 1).
        if !git::branch_exists(&manager_repo_root(manager), &branch)? {
            mark(state, &spec_id, MergeStatus::Skipped, None, Some("branch does not exist".into()));
            summary.skipped.push(spec_id.clone());
            store::save(dag_path, dag, Some(state))?;
            continue;
        }

        let ahead = git::is_ahead_of(&manager_repo_root(manager), &branch, &target_branch)?;
        if !ahead {
            if options.skip_no_commits {
                mark(state, &spec_id, MergeStatus::Skipped, None, None);
                summary.skipped.push(spec_id.clone());
                store::save(dag_path, dag, Some(state))?;
                continue;
            }
            mark(state, &spec_id, MergeStatus::Failed, None, Some("branch has no commits ahead of target".into()));
            summary.failed.push(spec_id.clone());
            store::save(dag_path, dag, Some(state))?;
            if !options.skip_failed {
                break;
            }
            continue;
        }

        if !options.force {
            if let Some(path) = &worktree_path {
                if git::has_uncommitted_changes(Path::new(path)).unwrap_or(false) {
                    mark(state, &spec_id, MergeStatus::Failed, None, Some("worktree has uncommitted changes".into()));
                    summary.failed.push(spec_id.clone());
                    store::save(dag_path, dag, Some(state))?;
                    if !options.skip_failed {
                        break;
                    }
                    continue;
                }
            }
        }

        let repo_root = manager_repo_root(manager);
        git::checkout_branch(&repo_root, &target_branch)
            .with_context(|| format!("failed to check out target branch {target_branch}"))?;

        let message = format!("merge: {spec_id}");
        match git::merge_stage(&repo_root, &branch, &message)? {
            git::MergeResult::Success { .. } | git::MergeResult::FastForward | git::MergeResult::AlreadyUpToDate => {
                let sha = git::head_sha(&repo_root)?;
                mark(state, &spec_id, MergeStatus::Merged, Some(sha), None);
                summary.merged.push(spec_id.clone());
                store::save(dag_path, dag, Some(state))?;

                if options.cleanup && worktree_path.is_some() {
                    if manager.remove(&dag.id, &spec_id, false).is_err() && options.force {
                        let _ = manager.remove(&dag.id, &spec_id, true);
                    }
                }
            }
            git::MergeResult::Conflict { conflicting_files } => {
                if options.continue_ {
                    if conflicting_files.is_empty() {
                        let sha = git::head_sha(&repo_root)?;
                        mark(state, &spec_id, MergeStatus::Merged, Some(sha), None);
                        summary.merged.push(spec_id.clone());
                        store::save(dag_path, dag, Some(state))?;
                        continue;
                    }
                    mark(state, &spec_id, MergeStatus::Failed, None, Some("conflict markers remain".into()));
                    summary.failed.push(spec_id.clone());
                    store::save(dag_path, dag, Some(state))?;
                    if !options.skip_failed {
                        break;
                    }
                    continue;
                }

                let instructions = git::conflict_resolution_instructions(&spec_id, &branch);
                mark(state, &spec_id, MergeStatus::Failed, None, Some(instructions));
                summary.failed.push(spec_id.clone());
                store::save(dag_path, dag, Some(state))?;
                if !options.skip_failed {
                    break;
                }
                // Leaving the conflict unresolved would make every later
                // checkout/merge in this loop fail too; abort so the next
                // spec gets a clean tree to merge into.
                git::abort_merge(&repo_root)?;
            }
        }
    }

    Ok(summary)
}

fn mark(state: &mut RunState, spec_id: &str, status: MergeStatus, sha: Option<String>, error: Option<String>) {
    if let Some(spec) = state.specs.get_mut(spec_id) {
        spec.merge = Some(MergeState { status, sha, error });
    }
}

fn manager_repo_root(manager: &WorktreeManager) -> std::path::PathBuf {
    manager.repo_root().to_path_buf()
}
