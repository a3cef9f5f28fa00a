//! DAG file definition parsing: id derivation and structural parse.
//!
//! This module parses only the immutable `schema_version` / `dag` / `layers`
//! keys of a DAG file; `state::store` owns parsing the full file including
//! the inline `run`/`specs`/`staging` state sections, reusing the types here.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::model::{Dag, DagIdentity, Layer};

#[derive(Debug, Deserialize, Serialize)]
struct DefinitionOnly {
    schema_version: String,
    dag: DagIdentity,
    layers: Vec<Layer>,
}

/// Derive a stable slug from an arbitrary name: lowercase, non-alphanumeric
/// runs collapsed to a single `-`, trimmed of leading/trailing `-`.
pub fn slugify(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9]+").expect("static regex");
    let slug = re.replace_all(name, "-").to_lowercase();
    slug.trim_matches('-').to_string()
}

/// Resolve a DAG's stable id: explicit `dag.id`, else slug of `dag.name`,
/// else basename of the source file (§3.1).
pub fn derive_dag_id(identity: &DagIdentity, source_path: &Path) -> String {
    if let Some(id) = &identity.id {
        if !id.trim().is_empty() {
            return id.clone();
        }
    }
    let slug = slugify(&identity.name);
    if !slug.is_empty() {
        return slug;
    }
    source_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dag".to_string())
}

/// Parse a DAG file's definition section and validate its structure
/// (duplicate ids, cross-layer dependency direction, unknown deps) plus
/// cycle detection. Does not touch inline state.
pub fn load_dag_file(path: &Path) -> Result<Dag> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read DAG file {}", path.display()))?;
    parse_dag_definition(&contents, path)
}

pub fn parse_dag_definition(contents: &str, source_path: &Path) -> Result<Dag> {
    let raw: DefinitionOnly = serde_yaml::from_str(contents)
        .with_context(|| format!("failed to parse DAG file {}", source_path.display()))?;

    if raw.layers.is_empty() {
        bail!("DAG file has no layers");
    }

    let id = derive_dag_id(&raw.dag, source_path);
    let dag = Dag {
        schema_version: raw.schema_version,
        identity: raw.dag,
        layers: raw.layers,
        id,
    };
    dag.validate_structure()?;
    super::graph::detect_cycles(&dag)?;
    Ok(dag)
}
