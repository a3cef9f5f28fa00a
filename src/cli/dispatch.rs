//! Command wiring: translate parsed [`Commands`] into calls against
//! `engine`, `merge`, `commit`, `watch`, and `state::store`.
//!
//! Argument/parse errors surface as [`CliError::Validation`] (exit `3`);
//! everything else the engine or git reports surfaces as
//! [`CliError::Runtime`] (exit `1`).

use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::agent::{AgentCapability, AgentConfig, AgentKind, CommandAgent};
use crate::commit::post_execution_commit_flow;
use crate::config::Config;
use crate::dag::Dag;
use crate::engine::{Engine, RunOptions, RunSummary};
use crate::git;
use crate::merge::{self, MergeOptions};
use crate::state::model::{RunState, SpecStatus};
use crate::state::store;
use crate::watch::LogTailer;
use crate::worktree::manager::WorktreeManager;

use super::types::Commands;

/// Distinguishes argument/parse failures (exit `3`) from everything else
/// the engine or Git surfaces at runtime (exit `1`).
pub enum CliError {
    Validation(anyhow::Error),
    Runtime(anyhow::Error),
}

impl<E: Into<anyhow::Error>> From<E> for CliError {
    fn from(e: E) -> Self {
        CliError::Runtime(e.into())
    }
}

pub type CliResult = Result<i32, CliError>;

pub fn dispatch(command: Commands) -> CliResult {
    let repo_root = std::env::current_dir().map_err(anyhow::Error::from)?;
    let config = Config::load(&repo_root).map_err(CliError::Validation)?;

    match command {
        Commands::Run {
            dag,
            dry_run,
            force,
            fresh,
            max_parallel,
            fail_fast,
            only,
            clean,
            merge: auto_merge,
            no_merge_prompt,
            autocommit,
            no_autocommit,
        } => {
            let dag_path = PathBuf::from(dag);
            let loaded = load_validated(&dag_path)?;
            if let Some(only) = &only {
                validate_only_ids(&loaded.dag, only)?;
            }

            let options = RunOptions {
                dry_run,
                force,
                fresh,
                max_parallel_override: max_parallel,
                fail_fast,
                only,
                clean,
                autocommit_override: autocommit_override(autocommit, no_autocommit),
                ..RunOptions::new()
            };

            let agent = build_agent(&config);
            let engine = Engine::new(dag_path.clone(), config.clone(), agent);
            let summary = engine.run(options).map_err(CliError::Runtime)?;
            print_run_summary(&summary);

            if auto_merge && !dry_run && !summary.completed.is_empty() {
                if no_merge_prompt || confirm("run a merge of the completed specs now?") {
                    run_merge(&dag_path, &config, MergeOptions { cleanup: true, ..Default::default() })?;
                }
            }

            Ok(exit_code_for_summary(&summary))
        }

        Commands::Resume { dag, force, fail_fast } => {
            let dag_path = PathBuf::from(dag);
            load_validated(&dag_path)?;
            let options = RunOptions { force, fail_fast, ..RunOptions::new() };
            let agent = build_agent(&config);
            let engine = Engine::new(dag_path, config.clone(), agent);
            let summary = engine.run(options).map_err(CliError::Runtime)?;
            print_run_summary(&summary);
            Ok(exit_code_for_summary(&summary))
        }

        Commands::Merge { dag, branch, r#continue, skip_failed, skip_no_commits, force, cleanup, reset } => {
            let dag_path = PathBuf::from(dag);
            load_validated(&dag_path)?;
            let options = MergeOptions {
                target_branch: branch,
                continue_: r#continue,
                skip_failed,
                skip_no_commits,
                force,
                cleanup,
                reset,
            };
            let summary = run_merge(&dag_path, &config, options)?;
            println!(
                "{} merged, {} failed, {} skipped",
                summary.merged.len().to_string().green(),
                summary.failed.len().to_string().red(),
                summary.skipped.len().to_string().yellow()
            );
            Ok(if summary.failed.is_empty() { 0 } else { 1 })
        }

        Commands::Cleanup { dag, all, force, keep_state } => {
            let dag_path = PathBuf::from(dag);
            let loaded = load_validated(&dag_path)?;
            let manager = WorktreeManager::new(config.repo_root.clone(), config.worktrees_root());
            let mut kept_uncleaned = 0usize;

            if let Some(mut state) = loaded.state.clone() {
                let targets: Vec<String> = state
                    .specs
                    .iter()
                    .filter(|(_, s)| {
                        all || s.merge.as_ref().map(|m| m.status == crate::state::model::MergeStatus::Merged).unwrap_or(false)
                    })
                    .map(|(id, _)| id.clone())
                    .collect();

                for id in &targets {
                    match manager.remove(&loaded.dag.id, id, force) {
                        Ok(()) => {
                            if let Some(spec) = state.specs.get_mut(id) {
                                spec.worktree = None;
                            }
                        }
                        Err(e) => {
                            kept_uncleaned += 1;
                            eprintln!("{} worktree for '{id}' kept: {e}", "warning:".yellow());
                        }
                    }
                }

                if keep_state {
                    store::save(&dag_path, &loaded.dag, Some(&state)).map_err(CliError::Runtime)?;
                } else {
                    store::clear_state(&dag_path, &loaded.dag).map_err(CliError::Runtime)?;
                }
            }

            Ok(if kept_uncleaned == 0 { 0 } else { 1 })
        }

        Commands::Status { dag } => {
            let dag_path = PathBuf::from(dag);
            let loaded = load_validated(&dag_path)?;
            print_status(&loaded.dag, loaded.state.as_ref());
            Ok(0)
        }

        Commands::List { path } => {
            let search_dir = path.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            list_dags(&search_dir)?;
            Ok(0)
        }

        Commands::Watch { dag } => {
            let dag_path = PathBuf::from(dag);
            load_validated(&dag_path)?;
            let cancel = Arc::new(AtomicBool::new(false));
            crate::watch::watch(&dag_path, &cancel).map_err(CliError::Runtime)?;
            Ok(0)
        }

        Commands::Logs { dag, spec, no_follow, latest } => {
            let dag_path = PathBuf::from(dag);
            let loaded = load_validated(&dag_path)?;
            let state = loaded.state.ok_or_else(|| CliError::Validation(anyhow::anyhow!("no run has started for this DAG yet")))?;
            let spec_state = state
                .specs
                .get(&spec)
                .ok_or_else(|| CliError::Validation(anyhow::anyhow!("no such spec '{spec}'")))?;
            let log_path = spec_state
                .log_file
                .as_ref()
                .ok_or_else(|| CliError::Runtime(anyhow::anyhow!("spec '{spec}' has not produced a log file yet")))?;
            let tailer = LogTailer::new(PathBuf::from(log_path));
            let cancel = Arc::new(AtomicBool::new(false));
            if no_follow {
                for line in tailer.read_once(&cancel).map_err(CliError::Runtime)? {
                    println!("{line}");
                }
            } else {
                tailer
                    .follow(&cancel, latest, |line| println!("{line}"))
                    .map_err(CliError::Runtime)?;
            }
            Ok(0)
        }

        Commands::Commit { dag, only, dry_run, cmd } => {
            let dag_path = PathBuf::from(dag);
            let loaded = load_validated(&dag_path)?;
            let mut state = loaded.state.unwrap_or_else(|| RunState::new(loaded.dag.id.clone()));

            let ids: Vec<String> = match &only {
                Some(ids) => ids.clone(),
                None => state.specs.keys().cloned().collect(),
            };

            let mut any_failed = false;
            for id in ids {
                let Some(spec) = state.specs.get(&id) else { continue };
                let Some(worktree) = &spec.worktree else { continue };
                let worktree_path = Path::new(worktree);
                if !git::has_uncommitted_changes(worktree_path).unwrap_or(false) {
                    continue;
                }
                if dry_run {
                    println!("{id}: would commit uncommitted changes in {worktree}");
                    continue;
                }
                let branch = spec.branch.clone().unwrap_or_else(|| WorktreeManager::branch_name(&loaded.dag.id, &id));
                match post_execution_commit_flow(
                    &id,
                    worktree_path,
                    &branch,
                    &config.base_branch,
                    true,
                    config.autocommit_retries,
                    cmd.as_deref().or(config.autocommit_cmd.as_deref()),
                ) {
                    Ok(outcome) => {
                        if let Some(s) = state.specs.get_mut(&id) {
                            s.commit = Some(outcome.state);
                        }
                    }
                    Err(e) => {
                        any_failed = true;
                        eprintln!("{} commit flow failed for '{id}': {e}", "error:".red());
                    }
                }
            }
            if !dry_run {
                store::save(&dag_path, &loaded.dag, Some(&state)).map_err(CliError::Runtime)?;
            }
            Ok(if any_failed { 1 } else { 0 })
        }

        Commands::MigrateState { dag } => {
            let dag_path = PathBuf::from(dag);
            // `store::load` performs legacy migration as a side effect when
            // no inline state is present yet; calling it is the whole flow.
            let loaded = store::load(&dag_path).map_err(CliError::Validation)?;
            println!("{} {}", "migrated:".green(), loaded.has_inline_state());
            Ok(0)
        }
    }
}

fn load_validated(dag_path: &Path) -> Result<store::Loaded, CliError> {
    store::load(dag_path).map_err(CliError::Validation)
}

fn validate_only_ids(dag: &Dag, only: &[String]) -> Result<(), CliError> {
    let all_ids = dag.feature_ids();
    for id in only {
        if !all_ids.contains(id) {
            return Err(CliError::Validation(anyhow::anyhow!("--only references unknown feature '{id}'")));
        }
    }
    Ok(())
}

fn autocommit_override(autocommit: bool, no_autocommit: bool) -> Option<bool> {
    if autocommit {
        Some(true)
    } else if no_autocommit {
        Some(false)
    } else {
        None
    }
}

fn build_agent(config: &Config) -> Arc<dyn AgentCapability> {
    Arc::new(CommandAgent::new(AgentConfig {
        kind: AgentKind::Command { program: config.agent_program.clone(), args: config.agent_args.clone() },
    }))
}

fn run_merge(dag_path: &Path, config: &Config, options: MergeOptions) -> Result<merge::MergeSummary, CliError> {
    let loaded = load_validated(dag_path)?;
    let mut state = loaded.state.unwrap_or_else(|| RunState::new(loaded.dag.id.clone()));
    let manager = WorktreeManager::new(config.repo_root.clone(), config.worktrees_root());
    let options = MergeOptions { target_branch: options.target_branch.or_else(|| Some(config.base_branch.clone())), ..options };
    let summary = merge::run(dag_path, &loaded.dag, &mut state, &manager, &options).map_err(CliError::Runtime)?;
    Ok(summary)
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut input = String::new();
    if std::io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_run_summary(summary: &RunSummary) {
    println!(
        "run {}: {} completed, {} failed, {} blocked",
        summary.run_status,
        summary.completed.len().to_string().green(),
        summary.failed.len().to_string().red(),
        summary.blocked.len().to_string().yellow(),
    );
}

fn exit_code_for_summary(summary: &RunSummary) -> i32 {
    if summary.failed.is_empty() {
        0
    } else {
        1
    }
}

fn print_status(dag: &Dag, state: Option<&RunState>) {
    println!("{}: {}", "dag".bold(), dag.id);
    let Some(state) = state else {
        println!("no run has started yet");
        return;
    };
    println!("run status: {}", state.status);

    for status in [SpecStatus::Running, SpecStatus::Pending, SpecStatus::Blocked, SpecStatus::Completed, SpecStatus::Failed] {
        let mut ids: Vec<&String> = state.specs.iter().filter(|(_, s)| s.status == status).map(|(id, _)| id).collect();
        if ids.is_empty() {
            continue;
        }
        ids.sort();
        println!("  {}: {}", format!("{status}"), ids.iter().cloned().cloned().collect::<Vec<_>>().join(", "));

        if status == SpecStatus::Failed {
            for id in ids {
                if let Some(reason) = state.specs.get(id).and_then(|s| s.failure_reason.as_ref()) {
                    println!("    {id} [{}]: {}", reason.stage, reason.message);
                }
            }
        }
    }
}

fn list_dags(dir: &Path) -> Result<(), CliError> {
    let entries = std::fs::read_dir(dir).map_err(anyhow::Error::from)?;
    let mut found = false;
    for entry in entries {
        let entry = entry.map_err(anyhow::Error::from)?;
        let path = entry.path();
        let is_yaml = path.extension().and_then(|e| e.to_str()).map(|e| e == "yaml" || e == "yml").unwrap_or(false);
        if !is_yaml {
            continue;
        }
        match store::load(&path) {
            Ok(loaded) => {
                found = true;
                let status = loaded.state.as_ref().map(|s| s.status.to_string()).unwrap_or_else(|| "never run".to_string());
                println!("{:<24} {}", loaded.dag.id, status);
            }
            Err(_) => continue,
        }
    }
    if !found {
        println!("no DAG files found in {}", dir.display());
    }
    Ok(())
}
