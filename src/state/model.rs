//! Status enums and state structs for `run`, `specs`, `staging`.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_yaml::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecStatus {
    Pending,
    Running,
    Blocked,
    Completed,
    Failed,
}

impl SpecStatus {
    /// Edges from §4.1.1. `blocked -> pending` and `failed -> pending` are
    /// user-driven resets; `completed -> pending` is the merge `--reset` path.
    pub fn valid_transitions(&self) -> &'static [SpecStatus] {
        use SpecStatus::*;
        match self {
            Pending => &[Running, Blocked],
            Running => &[Completed, Failed],
            Blocked => &[Pending],
            Failed => &[Pending],
            Completed => &[Pending],
        }
    }

    pub fn can_transition_to(&self, next: SpecStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn try_transition(&mut self, next: SpecStatus) -> Result<()> {
        if !self.can_transition_to(next) {
            bail!("invalid spec status transition: {:?} -> {:?}", self, next);
        }
        *self = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SpecStatus::Completed | SpecStatus::Failed | SpecStatus::Blocked)
    }
}

impl fmt::Display for SpecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_yaml::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStatus {
    Pending,
    Merged,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitStatus {
    Pending,
    Committed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReason {
    pub stage: String,
    pub message: String,
    pub detected_at: DateTime<Utc>,
}

impl FailureReason {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self { stage: stage.into(), message: message.into(), detected_at: Utc::now() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeState {
    pub status: MergeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for MergeState {
    fn default() -> Self {
        Self { status: MergeStatus::Pending, sha: None, error: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitState {
    pub status: CommitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default)]
    pub attempts: u32,
}

impl Default for CommitState {
    fn default() -> Self {
        Self { status: CommitStatus::Pending, sha: None, attempts: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecState {
    pub status: SpecStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitState>,
}

impl SpecState {
    pub fn new() -> Self {
        Self {
            status: SpecStatus::Pending,
            started_at: None,
            completed_at: None,
            current_stage: None,
            failure_reason: None,
            branch: None,
            worktree: None,
            log_file: None,
            merge: None,
            commit: None,
        }
    }

    pub fn transition(&mut self, next: SpecStatus) -> Result<()> {
        self.status.try_transition(next)?;
        match next {
            SpecStatus::Running => self.started_at = Some(Utc::now()),
            SpecStatus::Completed | SpecStatus::Failed => self.completed_at = Some(Utc::now()),
            SpecStatus::Pending => {
                self.started_at = None;
                self.completed_at = None;
                self.current_stage = None;
                self.failure_reason = None;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for SpecState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub dag_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_base: Option<String>,
    #[serde(default)]
    pub specs: HashMap<String, SpecState>,
    #[serde(default, skip_serializing_if = "serde_yaml::Value::is_null")]
    pub staging: serde_yaml::Value,
}

impl RunState {
    pub fn new(dag_id: String) -> Self {
        Self {
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            dag_id,
            log_base: None,
            specs: HashMap::new(),
            staging: serde_yaml::Value::Null,
        }
    }

    /// P3: a spec's status never leaves `completed`/`failed` except via an
    /// explicit reset. This resets to `pending`, clearing timestamps.
    pub fn reset_spec(&mut self, id: &str) -> Result<()> {
        let spec = self
            .specs
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("no such spec '{id}'"))?;
        spec.transition(SpecStatus::Pending)?;
        spec.merge = None;
        spec.commit = None;
        Ok(())
    }
}
