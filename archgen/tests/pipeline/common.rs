//! Common fixtures for pipeline tests

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use archgen::config::PipelineConfig;
use archgen::gateway::{GatewayError, ScriptedGateway};
use archgen::pipeline::types::*;
use archgen::pipeline::GenerationObserver;
use archgen::workflow_utils::{ResilientExecutor, RetryPolicy};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const TRACKER_REQUIREMENT: &str = "Build a task tracker with user accounts";

/// Default config with zero backoff
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: fast_policy(),
        ..PipelineConfig::default()
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 0,
    }
}

pub fn executor(gateway: Arc<ScriptedGateway>) -> ResilientExecutor {
    ResilientExecutor::new(gateway, fast_policy())
}

pub fn requirements() -> RequirementSet {
    RequirementSet::new([TRACKER_REQUIREMENT])
}

/// Planned file for graph fixtures: (path, dependencies, implementationOrder)
pub struct NodeSpec {
    pub path: &'static str,
    pub deps: &'static [&'static str],
    pub order: u32,
}

pub fn spec(path: &'static str, deps: &'static [&'static str], order: u32) -> NodeSpec {
    NodeSpec { path, deps, order }
}

/// Folder tree JSON containing exactly `paths`
pub fn tree_json(name: &str, paths: &[&str]) -> Value {
    let mut files = Vec::new();
    let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in paths {
        match path.split_once('/') {
            Some((dir, rest)) => children
                .entry(dir.to_string())
                .or_default()
                .push(rest.to_string()),
            None => files.push(json!({
                "name": path,
                "description": format!("{} file", path),
                "purpose": format!("Implements {}", path),
            })),
        }
    }
    let subfolders: Vec<Value> = children
        .iter()
        .map(|(dir, rest)| {
            let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
            tree_json(dir, &rest)
        })
        .collect();

    json!({
        "name": name,
        "description": format!("{} folder", name),
        "purpose": "",
        "files": files,
        "subfolders": subfolders,
    })
}

/// Integrated architecture JSON for the given nodes, with a vision paragraph per file
pub fn architecture_json(nodes: &[NodeSpec]) -> String {
    let paths: Vec<&str> = nodes.iter().map(|n| n.path).collect();
    let graph: Vec<Value> = nodes
        .iter()
        .map(|n| {
            json!({
                "name": n.path.rsplit('/').next().unwrap_or(n.path),
                "path": n.path,
                "description": format!("{} description", n.path),
                "purpose": format!("{} purpose", n.path),
                "type": "rust",
                "dependencies": n.deps,
                "dependents": [],
                "implementationOrder": n.order,
            })
        })
        .collect();

    let vision = std::iter::once("A layered task tracker.".to_string())
        .chain(paths.iter().map(|p| format!("{} holds its own layer.", p)))
        .collect::<Vec<_>>()
        .join("\n\n");

    json!({
        "integratedVision": vision,
        "resolutionNotes": ["Backend and security agreed on session tokens"],
        "rootFolder": tree_json("tracker", &paths),
        "dependencyGraph": graph,
    })
    .to_string()
}

/// Tracker graph used by end-to-end runs
pub fn tracker_nodes() -> Vec<NodeSpec> {
    vec![
        spec("src/models.rs", &[], 1),
        spec("src/db.rs", &["src/models.rs"], 2),
        spec("src/auth.rs", &["src/models.rs", "src/db.rs"], 3),
        spec("src/main.rs", &["src/db.rs", "src/auth.rs"], 4),
    ]
}

pub fn abc_nodes_swapped() -> Vec<NodeSpec> {
    vec![
        spec("a.rs", &[], 1),
        spec("b.rs", &["a.rs"], 3),
        spec("c.rs", &["a.rs", "b.rs"], 2),
    ]
}

pub fn vision_response(role: &str) -> String {
    let body = json!({
        "visionText": format!("As {} I would keep modules small.\n\nEvery layer is tested.", role),
        "proposedTree": tree_json("tracker", &["src/main.rs"]),
    });
    format!("Here is my vision as {}:\n```json\n{}\n```\nLet me know if you need more.", role, body)
}

pub fn unit_response(path: &str) -> String {
    json!({
        "content": format!("// {}\npub fn run() {{}}\n", path),
        "language": "rust",
    })
    .to_string()
}

/// Role name from a vision system prompt ("You are a <role> reviewing ...")
pub fn role_from_system(system: &str) -> Option<String> {
    let rest = system.strip_prefix("You are a ")?;
    rest.split(" reviewing").next().map(|s| s.to_string())
}

/// Unit path from a generation prompt ("Implement <path> now.")
pub fn unit_path(user: &str) -> Option<String> {
    user.rsplit("Implement ")
        .next()?
        .strip_suffix(" now.")
        .map(|s| s.to_string())
}

pub fn is_vision_call(system: &str) -> bool {
    system.contains("reviewing a new software project")
}

pub fn is_integration_call(system: &str) -> bool {
    system.contains("Several specialists")
}

pub fn is_unit_call(system: &str) -> bool {
    system.contains("implementing one file")
}

/// Gateway that answers every pipeline phase; `failing_unit` is rejected permanently
pub fn pipeline_gateway(architecture: String, failing_unit: Option<&str>) -> ScriptedGateway {
    let failing_unit = failing_unit.map(|s| s.to_string());
    ScriptedGateway::with_responder(move |system, user| {
        if is_vision_call(system) {
            let role = role_from_system(system).unwrap_or_default();
            return Ok(vision_response(&role));
        }
        if is_integration_call(system) {
            return Ok(format!(
                "Merged architecture below.\n\n```json\n{}\n```",
                architecture
            ));
        }
        if is_unit_call(system) {
            let path = unit_path(user).unwrap_or_default();
            if failing_unit.as_deref() == Some(path.as_str()) {
                return Err(GatewayError::config(format!("model refused {}", path)));
            }
            return Ok(unit_response(&path));
        }
        Err(GatewayError::config("unexpected request"))
    })
}

/// Phase 1 output with a single vision, for integration-only tests
pub fn level1_fixture() -> Level1Output {
    let roles = archgen::pipeline::RoleTable::default().select_roles(&requirements());
    Level1Output {
        requirements: requirements(),
        roles,
        visions: vec![SpecialistVision {
            role: "Backend Engineer".to_string(),
            expertise: "APIs".to_string(),
            vision_text: "Keep it small.".to_string(),
            proposed_tree: serde_json::from_value(tree_json("tracker", &["src/main.rs"])).unwrap(),
        }],
        failures: vec![],
    }
}

/// Observer that records what was complete when each unit started
#[derive(Default)]
pub struct RecordingObserver {
    pub started: Mutex<Vec<(String, Vec<String>)>>,
    pub completed: Mutex<Vec<String>>,
    pub scheduled: Mutex<Option<usize>>,
}

impl RecordingObserver {
    pub fn started(&self) -> Vec<(String, Vec<String>)> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationObserver for RecordingObserver {
    async fn on_schedule(&self, total_units: usize) {
        *self.scheduled.lock().unwrap() = Some(total_units);
    }

    async fn on_unit_started(&self, node: &FileNode, completed: &[String]) {
        self.started
            .lock()
            .unwrap()
            .push((node.path.clone(), completed.to_vec()));
    }

    async fn on_unit_completed(&self, unit: &GeneratedUnit, _completed: usize, _total: usize) {
        self.completed.lock().unwrap().push(unit.path.clone());
    }
}
