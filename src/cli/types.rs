//! Argument types for the `weft` binary.

use clap::{Parser, Subcommand};

use crate::validation::clap_id_validator;

const HELP_TEMPLATE: &str = "
  ╭─╮┬ ┬┌─┐┌─┐┌┬┐
  │││├─┤├┤ ├┤  │
  ╰─╯┴ ┴└  └   ┴

{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}";

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Dependency-ordered orchestration of specs across isolated git worktrees", long_about = None)]
#[command(version)]
#[command(help_template = HELP_TEMPLATE)]
#[command(subcommand_help_heading = "Commands")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive a DAG to completion (§4.1).
    Run {
        /// Path to the DAG YAML file.
        dag: String,

        /// Compute and print the dispatch plan without executing anything.
        #[arg(long)]
        dry_run: bool,

        /// Tear down mismatched/stale worktrees instead of failing fast.
        #[arg(long)]
        force: bool,

        /// Discard all prior state for this DAG and start a new run.
        #[arg(long)]
        fresh: bool,

        /// Maximum number of specs executed concurrently.
        #[arg(long)]
        max_parallel: Option<u32>,

        /// Cancel all in-flight specs on the first failure.
        #[arg(long)]
        fail_fast: bool,

        /// Restrict this run to the given comma-separated feature ids.
        #[arg(long, value_delimiter = ',')]
        only: Option<Vec<String>>,

        /// Reset the given comma-separated feature ids to pending first.
        #[arg(long, value_delimiter = ',')]
        clean: Vec<String>,

        /// Automatically merge completed specs into the base branch after the run.
        #[arg(long)]
        merge: bool,

        /// Skip the confirmation prompt before an automatic post-run merge.
        #[arg(long)]
        no_merge_prompt: bool,

        /// Force autocommit on, overriding configuration.
        #[arg(long, conflicts_with = "no_autocommit")]
        autocommit: bool,

        /// Force autocommit off, overriding configuration.
        #[arg(long)]
        no_autocommit: bool,
    },

    /// Resume a previously interrupted or partially-completed run.
    Resume {
        /// Path to the DAG YAML file.
        dag: String,

        /// Tear down mismatched/stale worktrees instead of failing fast.
        #[arg(long)]
        force: bool,

        /// Cancel all in-flight specs on the first failure.
        #[arg(long)]
        fail_fast: bool,
    },

    /// Merge completed specs into a target branch in dependency order (§4.4).
    Merge {
        /// Path to the DAG YAML file.
        dag: String,

        /// Target branch to merge into (default: the configured base branch).
        #[arg(long)]
        branch: Option<String>,

        /// Resume a previously interrupted merge after conflicts are resolved.
        #[arg(long)]
        r#continue: bool,

        /// Continue past a failed spec instead of stopping the run.
        #[arg(long)]
        skip_failed: bool,

        /// Treat a branch with no commits ahead of the target as skipped, not failed.
        #[arg(long)]
        skip_no_commits: bool,

        /// Merge even if the spec's worktree has uncommitted changes.
        #[arg(long)]
        force: bool,

        /// Remove each spec's worktree after a successful merge.
        #[arg(long)]
        cleanup: bool,

        /// Clear all recorded merge status and start over.
        #[arg(long)]
        reset: bool,
    },

    /// Remove worktrees for merged (or, with `--all`, all) specs.
    Cleanup {
        /// Path to the DAG YAML file.
        dag: String,

        /// Remove every spec's worktree, not just merged ones.
        #[arg(long)]
        all: bool,

        /// Remove worktrees even with uncommitted or unpushed changes.
        #[arg(long)]
        force: bool,

        /// Leave the inline run state untouched.
        #[arg(long)]
        keep_state: bool,
    },

    /// Print a grouped per-status view of a DAG's specs.
    Status {
        /// Path to the DAG YAML file.
        dag: String,
    },

    /// Enumerate DAG files under a directory and their latest status.
    List {
        /// Directory to search for `*.yaml`/`*.yml` DAG files (default: current directory).
        path: Option<String>,
    },

    /// Live-watch a run's per-spec table until it terminates or 'q' is pressed.
    Watch {
        /// Path to the DAG YAML file.
        dag: String,
    },

    /// Print or follow a spec's per-stage log file (§6.3).
    Logs {
        /// Path to the DAG YAML file.
        dag: String,

        /// Feature/spec id whose log to read.
        #[arg(value_parser = clap_id_validator)]
        spec: String,

        /// Print current contents and exit instead of following new output.
        #[arg(long)]
        no_follow: bool,

        /// Skip output from earlier attempts already in the log file and
        /// only stream what's produced from this invocation onward.
        #[arg(long)]
        latest: bool,
    },

    /// Run the commit-verification flow across worktrees with uncommitted changes (§4.5).
    Commit {
        /// Path to the DAG YAML file.
        dag: String,

        /// Restrict to the given comma-separated feature ids.
        #[arg(long, value_delimiter = ',')]
        only: Option<Vec<String>>,

        /// Report what would be committed without running anything.
        #[arg(long)]
        dry_run: bool,

        /// Override the configured autocommit command.
        #[arg(long)]
        cmd: Option<String>,
    },

    /// Force migration of a legacy sibling state file into inline form (§4.2).
    MigrateState {
        /// Path to the DAG YAML file.
        dag: String,
    },
}
