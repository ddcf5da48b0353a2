//! Dependency graph validation and repair.
//!
//! Edges are ground truth; `implementationOrder` is a hint. Every graph that
//! leaves this module satisfies:
//! - each node's order is strictly greater than every dependency's order
//! - nodes without dependencies have order 1
//! - graph `(path, name)` pairs equal the folder tree's leaf files
//! - `dependents` is the transpose of `dependencies`

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::PipelineError;
use crate::pipeline::types::{FileNode, GraphRepair, IntegratedArchitecture};

/// Canonical path form: forward slashes, no leading `./` or `/`
pub fn normalize_path(path: &str) -> String {
    let mut p = path.trim().replace('\\', "/");
    loop {
        if let Some(rest) = p.strip_prefix("./") {
            p = rest.to_string();
        } else if let Some(rest) = p.strip_prefix('/') {
            p = rest.to_string();
        } else {
            break;
        }
    }
    while p.contains("//") {
        p = p.replace("//", "/");
    }
    p
}

/// Longest-path level of every node, by index: 1 for no dependencies,
/// otherwise one more than the deepest dependency.
///
/// Dependencies must already resolve to node paths.
pub fn compute_levels(nodes: &[FileNode]) -> Result<Vec<u32>, PipelineError> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.path.as_str(), i))
        .collect();

    let mut indegree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for (i, node) in nodes.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &node.dependencies {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            let Some(&d) = index.get(dep.as_str()) else {
                return Err(PipelineError::inconsistent(
                    &node.path,
                    "dependencies",
                    format!("unknown dependency '{}'", dep),
                ));
            };
            indegree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut levels = vec![1u32; nodes.len()];
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut processed = 0;

    while let Some(i) = queue.pop_front() {
        processed += 1;
        for &j in &dependents[i] {
            levels[j] = levels[j].max(levels[i] + 1);
            indegree[j] -= 1;
            if indegree[j] == 0 {
                queue.push_back(j);
            }
        }
    }

    if processed < nodes.len() {
        let nodes = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] > 0)
            .map(|(_, n)| n.path.clone())
            .collect();
        return Err(PipelineError::CyclicDependency { nodes });
    }

    Ok(levels)
}

/// Paths whose `implementationOrder` breaks the ordering invariant
pub fn order_violations(nodes: &[FileNode]) -> Vec<String> {
    let order: HashMap<&str, u32> = nodes
        .iter()
        .map(|n| (n.path.as_str(), n.implementation_order))
        .collect();

    nodes
        .iter()
        .filter(|node| {
            if node.implementation_order == 0 {
                return true;
            }
            if node.dependencies.is_empty() {
                return node.implementation_order != 1;
            }
            node.dependencies.iter().any(|dep| {
                order
                    .get(dep.as_str())
                    .map_or(true, |&dep_order| node.implementation_order <= dep_order)
            })
        })
        .map(|node| node.path.clone())
        .collect()
}

/// Rebuild every node's `dependents` from the `dependencies` edges
pub fn materialize_dependents(nodes: &mut [FileNode]) {
    let mut transpose: HashMap<String, Vec<String>> = HashMap::new();
    for node in nodes.iter() {
        for dep in &node.dependencies {
            transpose
                .entry(dep.clone())
                .or_default()
                .push(node.path.clone());
        }
    }
    for node in nodes.iter_mut() {
        node.dependents = transpose.remove(&node.path).unwrap_or_default();
    }
}

/// Validate the integrated architecture, repairing what can be repaired.
///
/// Repairs: path normalization, names taken from the folder tree, duplicate
/// edges dropped, implementation order recomputed from edges when the hint is
/// inconsistent, dependents rebuilt. Anything else is an error.
pub fn validate_and_repair(
    architecture: &mut IntegratedArchitecture,
) -> Result<GraphRepair, PipelineError> {
    let mut repair = GraphRepair::default();
    let root_name = architecture.root_folder.name.trim_matches('/').to_string();

    let tree: HashMap<String, String> = architecture
        .root_folder
        .file_entries()
        .into_iter()
        .map(|(path, name)| (normalize_path(&path), name))
        .collect();

    let canonical = |raw: &str| -> String {
        let path = normalize_path(raw);
        if tree.contains_key(&path) || root_name.is_empty() {
            return path;
        }
        match path.strip_prefix(&format!("{}/", root_name)) {
            Some(stripped) if tree.contains_key(stripped) => stripped.to_string(),
            _ => path,
        }
    };

    let nodes = &mut architecture.dependency_graph;

    for node in nodes.iter_mut() {
        let path = canonical(&node.path);
        if path != node.path {
            repair.normalized_paths += 1;
            node.path = path;
        }

        let mut seen = HashSet::new();
        let before = node.dependencies.len();
        node.dependencies = node
            .dependencies
            .iter()
            .map(|d| canonical(d))
            .filter(|d| seen.insert(d.clone()))
            .collect();
        repair.deduplicated_edges += before - node.dependencies.len();
    }

    let mut paths = HashSet::new();
    for node in nodes.iter() {
        if !paths.insert(node.path.as_str()) {
            return Err(PipelineError::inconsistent(
                &node.path,
                "path",
                "duplicate node in dependency graph",
            ));
        }
    }

    for node in nodes.iter() {
        for dep in &node.dependencies {
            if dep == &node.path {
                return Err(PipelineError::CyclicDependency {
                    nodes: vec![node.path.clone()],
                });
            }
            if !paths.contains(dep.as_str()) {
                return Err(PipelineError::inconsistent(
                    &node.path,
                    "dependencies",
                    format!("dependency '{}' is not a node of the graph", dep),
                ));
            }
        }
    }

    for node in nodes.iter_mut() {
        match tree.get(&node.path) {
            Some(name) => {
                if &node.name != name {
                    repair.renamed_nodes += 1;
                    node.name = name.clone();
                }
            }
            None => {
                return Err(PipelineError::inconsistent(
                    &node.path,
                    "path",
                    "graph node has no file in the folder tree",
                ))
            }
        }
    }

    let graph_paths: HashSet<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
    let mut orphans: Vec<&String> = tree
        .keys()
        .filter(|p| !graph_paths.contains(p.as_str()))
        .collect();
    orphans.sort();
    if let Some(orphan) = orphans.first() {
        return Err(PipelineError::inconsistent(
            orphan.as_str(),
            "dependencyGraph",
            "planned file has no dependency graph node",
        ));
    }

    let levels = compute_levels(nodes)?;
    let violations = order_violations(nodes);
    if !violations.is_empty() {
        tracing::warn!(
            violations = ?violations,
            "implementation order disagrees with dependency edges, recomputing"
        );
        for (node, level) in nodes.iter_mut().zip(levels) {
            node.implementation_order = level;
        }
        repair.reordered = true;
    }

    materialize_dependents(nodes);

    if !repair.is_clean() {
        tracing::debug!(?repair, "dependency graph repaired");
    }
    Ok(repair)
}
