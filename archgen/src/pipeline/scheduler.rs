//! Dependency-ordered scheduling and the write-once ledger of completed units.

use std::collections::{HashMap, HashSet};

use crate::error::PipelineError;
use crate::pipeline::graph::{compute_levels, order_violations};
use crate::pipeline::types::{DependencyContext, FileNode, GeneratedUnit};

/// Nodes in generation order: ascending `implementationOrder`, ties in
/// emitted order.
///
/// An order hint that contradicts the edges is recomputed first; a graph with
/// no topological order fails with [`PipelineError::CyclicDependency`]. A path
/// listed twice is rejected here, before any unit is generated.
pub fn schedule(graph: &[FileNode]) -> Result<Vec<FileNode>, PipelineError> {
    let mut paths = HashSet::new();
    for node in graph {
        if !paths.insert(node.path.as_str()) {
            return Err(PipelineError::inconsistent(
                &node.path,
                "path",
                "duplicate node in dependency graph",
            ));
        }
    }

    let levels = compute_levels(graph)?;
    let mut nodes = graph.to_vec();

    if !order_violations(&nodes).is_empty() {
        tracing::warn!("schedule received an inconsistent order hint, using edge levels");
        for (node, level) in nodes.iter_mut().zip(levels) {
            node.implementation_order = level;
        }
    }

    // sort_by_key is stable
    nodes.sort_by_key(|n| n.implementation_order);
    Ok(nodes)
}

/// Completed units keyed by path.
///
/// Only `complete` units enter the ledger and an entry is never replaced, so
/// dependency context handed to later nodes is stable.
#[derive(Debug, Default, Clone)]
pub struct UnitLedger {
    units: HashMap<String, GeneratedUnit>,
    order: Vec<String>,
}

impl UnitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished unit
    pub fn record(&mut self, unit: GeneratedUnit) -> Result<(), PipelineError> {
        if !unit.complete {
            return Err(PipelineError::MissingPrecondition(format!(
                "unit '{}' is not complete and cannot be recorded",
                unit.path
            )));
        }
        if self.units.contains_key(&unit.path) {
            return Err(PipelineError::MissingPrecondition(format!(
                "unit '{}' was already completed",
                unit.path
            )));
        }
        self.order.push(unit.path.clone());
        self.units.insert(unit.path.clone(), unit);
        Ok(())
    }

    pub fn is_complete(&self, path: &str) -> bool {
        self.units.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&GeneratedUnit> {
        self.units.get(path)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Context for `node`: one entry per declared dependency, in declaration
    /// order, with content cut to `excerpt_chars`.
    ///
    /// Fails if any dependency has not completed yet.
    pub fn dependency_context(
        &self,
        node: &FileNode,
        excerpt_chars: usize,
    ) -> Result<Vec<DependencyContext>, PipelineError> {
        node.dependencies
            .iter()
            .map(|dep| {
                let unit = self.units.get(dep).ok_or_else(|| {
                    PipelineError::MissingPrecondition(format!(
                        "'{}' scheduled before its dependency '{}' completed",
                        node.path, dep
                    ))
                })?;
                Ok(DependencyContext {
                    name: dep.rsplit('/').next().unwrap_or(dep).to_string(),
                    path: unit.path.clone(),
                    purpose: unit.purpose.clone(),
                    content: excerpt(&unit.content, excerpt_chars),
                })
            })
            .collect()
    }

    /// Paths of completed units, in completion order
    pub fn completed_paths(&self) -> &[String] {
        &self.order
    }

    /// Completed units in completion order
    pub fn into_units(mut self) -> Vec<GeneratedUnit> {
        self.order
            .iter()
            .filter_map(|path| self.units.remove(path))
            .collect()
    }

    pub fn units(&self) -> Vec<GeneratedUnit> {
        self.order
            .iter()
            .filter_map(|path| self.units.get(path).cloned())
            .collect()
    }
}

/// First `max_chars` characters, with a truncation note when cut
pub fn excerpt(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let head: String = content.chars().take(max_chars).collect();
    format!("{}\n... [truncated]", head)
}

/// Last `max_chars` characters
pub fn tail(content: &str, max_chars: usize) -> String {
    let total = content.chars().count();
    if total <= max_chars {
        return content.to_string();
    }
    content.chars().skip(total - max_chars).collect()
}
