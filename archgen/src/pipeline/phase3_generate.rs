//! Phase 3: Per-unit generation in dependency order
//!
//! The scheduler fixes the order; each node gets the completed content of
//! its dependencies, the requirements, and the part of the integrated vision
//! that talks about it.

use archgen_sdk::{
    log_phase_complete, log_phase_complete_console, log_phase_failed, log_phase_start,
    log_phase_start_console, log_progress, log_unit_complete, log_unit_failed, log_unit_start,
};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ContextLimits;
use crate::error::PipelineError;
use crate::pipeline::scheduler::{excerpt, schedule, UnitLedger};
use crate::pipeline::types::{
    DependencyContext, FileNode, GeneratedUnit, Level2Output, Level3Output, RequirementSet,
    UnitKind,
};
use crate::workflow_utils::{ResilientExecutor, ResponseShape};

const PHASE: usize = 3;

/// Hooks into the generation loop; used for job progress and ordering checks
#[async_trait]
pub trait GenerationObserver: Send + Sync {
    /// Called once the schedule is known
    async fn on_schedule(&self, _total_units: usize) {}

    /// Called right before a unit's first model call, with the paths that are
    /// complete at that moment
    async fn on_unit_started(&self, _node: &FileNode, _completed: &[String]) {}

    /// Called after a unit is recorded as complete
    async fn on_unit_completed(&self, _unit: &GeneratedUnit, _completed: usize, _total: usize) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

#[async_trait]
impl GenerationObserver for NoopObserver {}

#[derive(Debug, Deserialize)]
struct UnitPayload {
    content: String,
    #[serde(default)]
    language: Option<String>,
}

fn unit_shape() -> ResponseShape {
    ResponseShape::new("file implementation").require("content")
}

const SYSTEM_PROMPT: &str = r#"You are a senior software engineer implementing one file of a larger project.

Key instructions:
- Write the COMPLETE file; no placeholders, no "rest omitted" comments
- Use only the interfaces your dependencies actually expose (their content is provided)
- Follow the architecture described in the vision excerpt
- Match the file's declared type and purpose

Respond with JSON only:
{
  "content": "full file content",
  "language": "language of the file"
}"#;

/// The paragraphs of `vision` that mention this node, bounded by `max_chars`.
///
/// Falls back to the head of the vision when no paragraph mentions the node.
pub fn relevant_vision_slice(vision: &str, node: &FileNode, max_chars: usize) -> String {
    let name = node.name.to_lowercase();
    let stem = name.split('.').next().unwrap_or(&name).to_string();
    let path = node.path.to_lowercase();

    let mut slice = String::new();
    for paragraph in vision.split("\n\n") {
        let lower = paragraph.to_lowercase();
        let mentions = lower.contains(&path)
            || lower.contains(&name)
            || (stem.len() > 3 && lower.contains(&stem));
        if !mentions {
            continue;
        }
        if slice.chars().count() + paragraph.chars().count() > max_chars {
            break;
        }
        if !slice.is_empty() {
            slice.push_str("\n\n");
        }
        slice.push_str(paragraph.trim());
    }

    if slice.is_empty() {
        excerpt(vision, max_chars)
    } else {
        slice
    }
}

fn user_prompt(
    node: &FileNode,
    dependencies: &[DependencyContext],
    requirements: &RequirementSet,
    vision_slice: &str,
) -> String {
    let deps = if dependencies.is_empty() {
        "(none; this file has no dependencies)".to_string()
    } else {
        dependencies
            .iter()
            .map(|d| {
                format!(
                    "## {} ({})\nPurpose: {}\n```\n{}\n```",
                    d.name, d.path, d.purpose, d.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        r#"# File to implement

Name: {name}
Path: {path}
Type: {file_type}
Description: {description}
Purpose: {purpose}

# Requirements

{requirements}

# Architecture vision (excerpt)

{vision}

# Completed dependencies

{deps}

Implement {path} now."#,
        name = node.name,
        path = node.path,
        file_type = node.file_type,
        description = node.description,
        purpose = node.purpose,
        requirements = requirements.as_numbered_list(),
        vision = vision_slice,
        deps = deps
    )
}

/// Generate one file from its node and assembled context
pub async fn generate_unit(
    executor: &ResilientExecutor,
    node: &FileNode,
    dependencies: &[DependencyContext],
    requirements: &RequirementSet,
    vision_slice: &str,
) -> Result<GeneratedUnit, PipelineError> {
    let prompt = user_prompt(node, dependencies, requirements, vision_slice);
    let outcome = executor
        .execute_as::<UnitPayload>(
            &format!("unit:{}", node.path),
            SYSTEM_PROMPT,
            &prompt,
            &unit_shape(),
        )
        .await?;

    let payload = outcome.value;
    let language = payload
        .language
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| node.file_type.clone());

    Ok(GeneratedUnit {
        path: node.path.clone(),
        description: node.description.clone(),
        purpose: node.purpose.clone(),
        dependencies: node.dependencies.clone(),
        content: payload.content,
        language,
        kind: UnitKind::File,
        complete: true,
        possibly_incomplete: false,
    })
}

/// Generate every node of the graph in schedule order.
///
/// On failure the units completed so far travel inside
/// [`PipelineError::UnitGenerationFailed`].
pub async fn generate_all(
    executor: &ResilientExecutor,
    requirements: &RequirementSet,
    level2: &Level2Output,
    limits: &ContextLimits,
    observer: &dyn GenerationObserver,
) -> Result<Level3Output, PipelineError> {
    let architecture = &level2.architecture;
    if requirements.is_empty() {
        return Err(PipelineError::MissingPrecondition(
            "requirement list is empty".to_string(),
        ));
    }
    if architecture.dependency_graph.is_empty() {
        return Err(PipelineError::MissingPrecondition(
            "architecture has an empty dependency graph".to_string(),
        ));
    }

    let order = schedule(&architecture.dependency_graph)?;
    let total = order.len();

    log_phase_start!(PHASE, "Unit Generation", 3);
    log_phase_start_console!(
        PHASE,
        "Unit Generation",
        format!("{} file(s) in dependency order", total)
    );
    observer.on_schedule(total).await;

    let mut ledger = UnitLedger::new();

    for node in &order {
        let context = ledger.dependency_context(node, limits.excerpt_chars)?;
        let vision = relevant_vision_slice(
            &architecture.integrated_vision,
            node,
            limits.vision_slice_chars,
        );

        observer.on_unit_started(node, ledger.completed_paths()).await;
        log_unit_start!(PHASE, node.path, node.description, total);

        let generated = generate_unit(executor, node, &context, requirements, &vision)
            .await
            .and_then(|unit| ledger.record(unit.clone()).map(|_| unit));

        match generated {
            Ok(unit) => {
                log_unit_complete!(node.path, format!("{} chars", unit.content.chars().count()));
                log_progress!(ledger.len(), total, "files");
                observer.on_unit_completed(&unit, ledger.len(), total).await;
            }
            Err(source) => {
                log_unit_failed!(node.path, source);
                log_phase_failed!(PHASE, "Unit Generation", source);
                return Err(PipelineError::UnitGenerationFailed {
                    unit: node.path.clone(),
                    phase: PHASE,
                    completed: ledger.into_units(),
                    source: Box::new(source),
                });
            }
        }
    }

    log_phase_complete!(PHASE, "Unit Generation");
    log_phase_complete_console!(PHASE);
    Ok(Level3Output {
        units: ledger.into_units(),
    })
}
