//! The coding-agent capability seam.
//!
//! The capability method is the only polymorphic surface; different agents
//! are distinct configs selected at construction time, not a
//! runtime-reflective class hierarchy.

use anyhow::Result;
use std::path::Path;

/// Result of executing a single stage for a single spec.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub success: bool,
    pub message: String,
}

/// The single polymorphic surface the engine calls through. Implementors
/// block the calling worker thread for the duration of the stage.
pub trait AgentCapability: Send + Sync {
    fn execute_stage(&self, workspace: &Path, spec_description: &str, stage: &str) -> Result<StageResult>;
}

/// Tagged-variant agent selection, injected at configuration time. Kept flat
/// (no trait-object inheritance chain) per the design note.
#[derive(Debug, Clone)]
pub enum AgentKind {
    /// Runs a configured shell command per stage; the command receives the
    /// workspace path, stage name, and spec description as arguments.
    Command { program: String, args: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub kind: AgentKind,
}

pub struct CommandAgent {
    config: AgentConfig,
}

impl CommandAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }
}

impl AgentCapability for CommandAgent {
    fn execute_stage(&self, workspace: &Path, spec_description: &str, stage: &str) -> Result<StageResult> {
        let AgentKind::Command { program, args } = &self.config.kind;
        let output = std::process::Command::new(program)
            .args(args)
            .arg(stage)
            .arg(spec_description)
            .current_dir(workspace)
            .output()
            .map_err(|e| anyhow::anyhow!("failed to invoke agent '{program}': {e}"))?;

        let message = if output.status.success() {
            String::from_utf8_lossy(&output.stdout).to_string()
        } else {
            String::from_utf8_lossy(&output.stderr).to_string()
        };

        Ok(StageResult { success: output.status.success(), message })
    }
}
