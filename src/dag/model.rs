//! The immutable DAG definition: schema_version, dag identity, layers, features.
//!
//! Every cross-reference is by id, never by pointer, so the whole thing
//! round-trips through `serde_yaml` without cycles.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::validation::{validate_description, validate_id};

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagIdentity {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub features: Vec<Feature>,
}

/// The parsed, validated DAG definition. `id` has already been resolved
/// (explicit, else slug of name, else basename of the source file) by the
/// time a `Dag` exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    pub schema_version: String,
    #[serde(rename = "dag")]
    pub identity: DagIdentity,
    pub layers: Vec<Layer>,

    /// Resolved identity, not itself serialized under a top-level key;
    /// mirrors `identity.id` once resolution has happened. Kept out of the
    /// serialized form so a fresh parse always re-resolves it.
    #[serde(skip)]
    pub id: String,
}

impl Dag {
    /// All features across all layers, in layer-then-declaration order.
    pub fn features(&self) -> impl Iterator<Item = (&Layer, &Feature)> {
        self.layers.iter().flat_map(|l| l.features.iter().map(move |f| (l, f)))
    }

    pub fn feature_ids(&self) -> HashSet<String> {
        self.features().map(|(_, f)| f.id.clone()).collect()
    }

    pub fn find_feature(&self, id: &str) -> Option<(&Layer, &Feature)> {
        self.features().find(|(_, f)| f.id == id)
    }

    /// Layer index (0-based) of a feature, used for dispatch tie-breaking.
    pub fn layer_index_of(&self, feature_id: &str) -> Option<usize> {
        self.layers
            .iter()
            .position(|l| l.features.iter().any(|f| f.id == feature_id))
    }

    /// Validate structural invariants: feature id shape and uniqueness,
    /// description length, dependencies only crossing layers
    /// backward-or-same (L_i depends only on L_j, j<=i), dependency targets
    /// exist. Cycle detection lives in `dag::graph`.
    pub fn validate_structure(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            bail!(
                "unsupported schema_version '{}', expected '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        let mut seen = HashSet::new();
        for (_, feature) in self.features() {
            validate_id(&feature.id)?;
            validate_description(&feature.description)?;
            if !seen.insert(feature.id.clone()) {
                bail!("duplicate feature id '{}'", feature.id);
            }
        }

        let all_ids = self.feature_ids();
        for (layer, feature) in self.features() {
            let layer_idx = self.layer_index_of(&layer.id).expect("layer exists");
            for dep in &feature.depends_on {
                if !all_ids.contains(dep) {
                    bail!(
                        "feature '{}' depends on unknown feature '{}'",
                        feature.id,
                        dep
                    );
                }
                let dep_layer_idx = self
                    .layer_index_of(dep)
                    .expect("dependency resolved above");
                if dep_layer_idx > layer_idx {
                    bail!(
                        "feature '{}' (layer {}) depends on '{}' (layer {}): dependencies may only cross layers backward",
                        feature.id,
                        layer_idx,
                        dep,
                        dep_layer_idx
                    );
                }
            }
        }

        Ok(())
    }
}
