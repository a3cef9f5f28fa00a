//! Atomic load/save of the inline state sections of a DAG file, plus legacy
//! state-file migration and checksum-drift detection.
//!
//! Every save is a full-file replace: write to a temp file in the same
//! directory, fsync it, rename over the target, then fsync the directory —
//! a reader never observes a half-written file.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::dag::model::{Dag, DagIdentity, Feature, Layer};
use crate::dag::parser::derive_dag_id;
use crate::state::model::RunState;

/// The full on-disk shape of a DAG file: definition keys plus optional
/// inline state keys. `run`/`specs`/`staging` are absent on a fresh,
/// never-run DAG (§6.1).
#[derive(Debug, Deserialize, Serialize)]
struct RawFile {
    schema_version: String,
    dag: DagIdentity,
    layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run: Option<RawRun>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    specs: Option<std::collections::HashMap<String, crate::state::model::SpecState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    staging: Option<serde_yaml::Value>,
    /// Content hash of the definition section at last save, used to detect
    /// concurrent external edits (Open Question 3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    definition_checksum: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
struct RawRun {
    status: crate::state::model::RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    dag_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_base: Option<String>,
}

/// Legacy sibling state file schema (superset of inline state, §6.2).
#[derive(Debug, Deserialize)]
struct LegacyState {
    run: RawRun,
    specs: std::collections::HashMap<String, crate::state::model::SpecState>,
    #[serde(default)]
    staging: Option<serde_yaml::Value>,
}

pub struct Loaded {
    pub dag: Dag,
    pub state: Option<RunState>,
    definition_checksum: u64,
}

impl Loaded {
    pub fn has_inline_state(&self) -> bool {
        self.state.is_some()
    }
}

fn definition_checksum(dag: &Dag) -> u64 {
    // FNV-1a over the canonical serialization of the definition section.
    // Non-cryptographic by design: this guards against accidental concurrent
    // edits, not adversarial tampering, so no extra crate is warranted.
    let bytes = serde_yaml::to_string(&(&dag.schema_version, &dag.identity, &dag.layers))
        .unwrap_or_default();
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn legacy_path(dag_path: &Path) -> PathBuf {
    dag_path.with_extension("state.yaml")
}

/// `Load(path) -> (DAG, State)`. Migrates a legacy sibling state file into
/// inline form and deletes it if no inline state is present yet.
pub fn load(path: &Path) -> Result<Loaded> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open DAG file {}", path.display()))?;
    file.lock_shared().context("failed to acquire shared lock on DAG file")?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    FileExt::unlock(&file).ok();

    let raw: RawFile = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse DAG file {}", path.display()))?;

    let id = derive_dag_id(&raw.dag, path);
    let dag = Dag {
        schema_version: raw.schema_version.clone(),
        identity: raw.dag,
        layers: raw.layers,
        id: id.clone(),
    };
    dag.validate_structure()?;
    crate::dag::graph::detect_cycles(&dag)?;

    let mut state = match (raw.run, raw.specs) {
        (Some(run), Some(specs)) => Some(RunState {
            status: run.status,
            started_at: run.started_at,
            completed_at: run.completed_at,
            dag_id: run.dag_id,
            log_base: run.log_base,
            specs,
            staging: raw.staging.unwrap_or(serde_yaml::Value::Null),
        }),
        _ => None,
    };

    if state.is_none() {
        let legacy = legacy_path(path);
        if legacy.exists() {
            let legacy_contents = std::fs::read_to_string(&legacy)
                .with_context(|| format!("failed to read legacy state file {}", legacy.display()))?;
            let legacy_state: LegacyState = serde_yaml::from_str(&legacy_contents)
                .with_context(|| format!("failed to parse legacy state file {}", legacy.display()))?;
            let migrated = RunState {
                status: legacy_state.run.status,
                started_at: legacy_state.run.started_at,
                completed_at: legacy_state.run.completed_at,
                dag_id: legacy_state.run.dag_id,
                log_base: legacy_state.run.log_base,
                specs: legacy_state.specs,
                staging: legacy_state.staging.unwrap_or(serde_yaml::Value::Null),
            };
            save(path, &dag, Some(&migrated))?;
            std::fs::remove_file(&legacy)
                .with_context(|| format!("failed to delete migrated legacy state file {}", legacy.display()))?;
            state = Some(migrated);
        }
    }

    // P4: identity stability across loads.
    if let Some(s) = &state {
        if s.dag_id != dag.id {
            bail!(
                "DAG identity drift: stored run.dag_id '{}' does not match resolved id '{}'; explicit reset required",
                s.dag_id,
                dag.id
            );
        }
    }

    let checksum = definition_checksum(&dag);
    if let Some(stored) = raw.definition_checksum {
        if stored != checksum {
            bail!(
                "DAG file {} was modified externally since last load; refusing to proceed",
                path.display()
            );
        }
    }

    Ok(Loaded { dag, state, definition_checksum: checksum })
}

/// `Save(path, DAG, State)`: serialises definition first, then run/specs/
/// staging, atomically (write temp, fsync, rename).
pub fn save(path: &Path, dag: &Dag, state: Option<&RunState>) -> Result<()> {
    let checksum = definition_checksum(dag);

    let raw = RawFile {
        schema_version: dag.schema_version.clone(),
        dag: dag.identity.clone(),
        layers: dag.layers.clone(),
        run: state.map(|s| RawRun {
            status: s.status,
            started_at: s.started_at,
            completed_at: s.completed_at,
            dag_id: s.dag_id.clone(),
            log_base: s.log_base.clone(),
        }),
        specs: state.map(|s| s.specs.clone()),
        staging: state.map(|s| s.staging.clone()),
        definition_checksum: Some(checksum),
    };

    let serialized = serde_yaml::to_string(&raw).context("failed to serialize DAG file")?;
    atomic_write(path, serialized.as_bytes())
}

/// `ClearState`: removes `run`/`specs`/`staging`, leaving only the
/// definition on next save.
pub fn clear_state(path: &Path, dag: &Dag) -> Result<()> {
    save(path, dag, None)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    {
        let mut f = tmp.as_file();
        f.write_all(bytes)?;
        f.sync_all().context("failed to fsync temp file")?;
    }
    tmp.persist(path)
        .map_err(|e| anyhow::anyhow!("failed to rename temp file into place: {e}"))?;

    if let Ok(dir_file) = OpenOptions::new().read(true).open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}
