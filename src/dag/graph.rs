//! Ready-set computation, cycle detection, topological sort.
//!
//! Cycle detection is a DFS over `visited`/`rec_stack`/path; topological
//! sort is Kahn's in-degree algorithm with alphabetical tie-breaking.

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::dag::model::Dag;
use crate::state::model::{RunState, SpecStatus};

/// Detect a cycle in the feature dependency graph, returning a readable path
/// through the cycle if one exists.
pub fn detect_cycles(dag: &Dag) -> Result<()> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    for (_, feature) in dag.features() {
        if !visited.contains(&feature.id) {
            let mut path = Vec::new();
            if let Some(cycle) = dfs_detect_cycle(dag, &feature.id, &mut visited, &mut rec_stack, &mut path) {
                bail!("Circular dependency detected: {}", cycle.join(" -> "));
            }
        }
    }
    Ok(())
}

fn dfs_detect_cycle(
    dag: &Dag,
    id: &str,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(id.to_string());
    rec_stack.insert(id.to_string());
    path.push(id.to_string());

    if let Some((_, feature)) = dag.find_feature(id) {
        for dep in &feature.depends_on {
            if rec_stack.contains(dep) {
                let start = path.iter().position(|p| p == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].to_vec();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_detect_cycle(dag, dep, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    rec_stack.remove(id);
    None
}

/// Kahn's algorithm topological sort over a subset of feature ids (used by
/// the merge executor to restrict to `completed` specs).
pub fn topological_sort(dag: &Dag, subset: &HashSet<String>) -> Result<Vec<String>> {
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for id in subset {
        in_degree.entry(id.clone()).or_insert(0);
        adjacency.entry(id.clone()).or_default();
    }

    for (_, feature) in dag.features() {
        if !subset.contains(&feature.id) {
            continue;
        }
        for dep in &feature.depends_on {
            if !subset.contains(dep) {
                continue;
            }
            adjacency.get_mut(dep).unwrap().push(feature.id.clone());
            *in_degree.get_mut(&feature.id).unwrap() += 1;
        }
    }

    let mut queue: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut sorted: Vec<String> = Vec::from(queue.clone());
    queue.make_contiguous().sort();
    sorted.sort();
    let mut queue: VecDeque<String> = sorted.into();

    let mut result = Vec::new();
    while let Some(id) = queue.pop_front() {
        result.push(id.clone());
        let mut next_ready = Vec::new();
        if let Some(dependents) = adjacency.get(&id) {
            for dependent in dependents {
                let deg = in_degree.get_mut(dependent).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    next_ready.push(dependent.clone());
                }
            }
        }
        next_ready.sort();
        for id in next_ready {
            queue.push_back(id);
        }
    }

    if result.len() != subset.len() {
        bail!("Cycle detected in graph");
    }

    Ok(result)
}

/// Specs that are pending with every dependency completed, ready to dispatch.
/// Tie-broken by (layer index, declaration order, feature id).
pub fn ready_set(dag: &Dag, state: &RunState) -> Vec<String> {
    let mut ready: Vec<(usize, usize, String)> = Vec::new();
    for (layer_idx, layer) in dag.layers.iter().enumerate() {
        for (decl_idx, feature) in layer.features.iter().enumerate() {
            let Some(spec) = state.specs.get(&feature.id) else { continue };
            if spec.status != SpecStatus::Pending {
                continue;
            }
            let deps_satisfied = feature.depends_on.iter().all(|dep| {
                state
                    .specs
                    .get(dep)
                    .map(|s| s.status == SpecStatus::Completed)
                    .unwrap_or(false)
            });
            if deps_satisfied {
                ready.push((layer_idx, decl_idx, feature.id.clone()));
            }
        }
    }
    ready.sort();
    ready.into_iter().map(|(_, _, id)| id).collect()
}

/// Specs that are pending with some dependency failed or blocked.
pub fn blocked_set(dag: &Dag, state: &RunState) -> Vec<String> {
    let mut blocked = Vec::new();
    for (_, feature) in dag.features() {
        let Some(spec) = state.specs.get(&feature.id) else { continue };
        if spec.status != SpecStatus::Pending {
            continue;
        }
        let has_bad_dep = feature.depends_on.iter().any(|dep| {
            state
                .specs
                .get(dep)
                .map(|s| matches!(s.status, SpecStatus::Failed | SpecStatus::Blocked))
                .unwrap_or(false)
        });
        if has_bad_dep {
            blocked.push(feature.id.clone());
        }
    }
    blocked
}
