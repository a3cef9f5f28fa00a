//! The engine's external configuration: passed into the engine at
//! construction rather than read from process-wide mutable state, so a
//! single process can drive more than one config without global state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_max_parallel() -> u32 {
    4
}

fn default_autocommit_retries() -> u32 {
    3
}

fn default_lock_stale_after_secs() -> u64 {
    120
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_base_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub repo_root: PathBuf,
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: u32,
    #[serde(default)]
    pub autocommit: bool,
    #[serde(default = "default_autocommit_retries")]
    pub autocommit_retries: u32,
    #[serde(default)]
    pub autocommit_cmd: Option<String>,
    #[serde(default = "default_lock_stale_after_secs")]
    pub lock_stale_after_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    /// Program invoked by the default `CommandAgent` for every stage.
    #[serde(default = "default_agent_program")]
    pub agent_program: String,
    #[serde(default)]
    pub agent_args: Vec<String>,
}

fn default_stages() -> Vec<String> {
    vec!["specify".into(), "plan".into(), "tasks".into(), "implement".into()]
}

fn default_agent_program() -> String {
    "true".to_string()
}

impl Config {
    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Load from a `weft.toml` in `repo_root`, falling back to defaults for
    /// anything unset; `WEFT_CACHE_ROOT` overrides `cache_root` (§6.5).
    pub fn load(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join("weft.toml");
        let mut config: Config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", config_path.display()))?
        } else {
            Config {
                repo_root: repo_root.to_path_buf(),
                cache_root: default_cache_root(),
                max_parallel: default_max_parallel(),
                autocommit: false,
                autocommit_retries: default_autocommit_retries(),
                autocommit_cmd: None,
                lock_stale_after_secs: default_lock_stale_after_secs(),
                heartbeat_interval_secs: default_heartbeat_interval_secs(),
                base_branch: default_base_branch(),
                stages: default_stages(),
                agent_program: default_agent_program(),
                agent_args: Vec::new(),
            }
        };

        config.repo_root = repo_root.to_path_buf();
        if let Ok(cache_override) = std::env::var("WEFT_CACHE_ROOT") {
            config.cache_root = PathBuf::from(cache_override);
        }

        if config.max_parallel == 0 {
            anyhow::bail!("max_parallel must be at least 1");
        }

        Ok(config)
    }

    pub fn worktrees_root(&self) -> PathBuf {
        self.cache_root.join("worktrees")
    }

    pub fn log_base(&self, project_id: &str, dag_id: &str) -> PathBuf {
        self.cache_root.join(project_id).join(dag_id)
    }

    /// Derived from the repo root's directory name; used as the first path
    /// segment under `cache_root` for logs (§6.3).
    pub fn project_id(&self) -> String {
        self.repo_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "default".to_string())
    }
}

fn default_cache_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".cache").join("weft"))
        .unwrap_or_else(|| PathBuf::from(".weft-cache"))
}
