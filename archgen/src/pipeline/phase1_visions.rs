//! Phase 1: Specialist visions
//!
//! One structured call per non-integrator role. Calls are isolated: a failing
//! role is recorded in [`Level1Output::failures`] and the other visions are kept.

use std::sync::Arc;

use archgen_sdk::{
    log_parallel_start, log_phase_complete, log_phase_complete_console, log_phase_start,
    log_phase_start_console, log_unit_complete, log_unit_failed, log_unit_start, log_warning,
};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::pipeline::roles::RoleSpec;
use crate::pipeline::types::{FolderNode, Level1Output, RequirementSet, RoleFailure, SpecialistVision};
use crate::workflow_utils::{execute_batch, ResilientExecutor, ResponseShape};

const PHASE: usize = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisionPayload {
    vision_text: String,
    proposed_tree: FolderNode,
}

fn vision_shape() -> ResponseShape {
    ResponseShape::new("specialist vision")
        .require("visionText")
        .require("proposedTree")
        .require("proposedTree.name")
}

fn system_prompt(role: &RoleSpec) -> String {
    format!(
        r#"You are a {name} reviewing a new software project.

Your expertise: {expertise}

Your goal is to describe how YOU would build this system from your specialist perspective and to propose the part of the file tree you are responsible for.

Key instructions:
- Stay inside your area of expertise; other specialists cover the rest
- Be concrete: name technologies, modules and responsibilities
- Every proposed file needs a name, a one-line description and its purpose
- Folder names are plain names, never paths

Respond with JSON only:
{{
  "visionText": "multi-paragraph vision",
  "proposedTree": {{
    "name": "project-root",
    "description": "...",
    "purpose": "...",
    "files": [{{"name": "...", "description": "...", "purpose": "..."}}],
    "subfolders": []
  }}
}}"#,
        name = role.name,
        expertise = role.expertise
    )
}

fn user_prompt(requirements: &RequirementSet) -> String {
    format!(
        "# Requirements\n\n{}\n\nWrite your specialist vision and proposed file tree.",
        requirements.as_numbered_list()
    )
}

/// Request one vision per non-integrator role.
///
/// With `concurrency > 1` the calls overlap; results keep role order either way.
pub async fn generate_visions(
    executor: &ResilientExecutor,
    requirements: &RequirementSet,
    roles: &[RoleSpec],
    concurrency: usize,
) -> Result<Level1Output, PipelineError> {
    if requirements.is_empty() {
        return Err(PipelineError::MissingPrecondition(
            "requirement list is empty".to_string(),
        ));
    }

    let specialists: Vec<RoleSpec> = roles.iter().filter(|r| !r.integrator).cloned().collect();
    if specialists.is_empty() {
        return Err(PipelineError::MissingPrecondition(
            "no specialist roles selected".to_string(),
        ));
    }

    log_phase_start!(PHASE, "Specialist Visions", 3);
    log_phase_start_console!(
        PHASE,
        "Specialist Visions",
        format!("{} specialist role(s)", specialists.len())
    );

    let executor = executor.clone();
    let prompt = Arc::new(user_prompt(requirements));
    let total = specialists.len();
    if concurrency > 1 {
        log_parallel_start!(total, "specialist calls");
    }

    let outcomes = execute_batch(PHASE, specialists.clone(), concurrency, move |role, ctx| {
        let executor = executor.clone();
        let prompt = prompt.clone();
        async move {
            log_unit_start!(ctx.phase, role.name, role.expertise, ctx.total_tasks);
            let call = format!("vision:{}", role.name);
            let payload = executor
                .execute_as::<VisionPayload>(&call, &system_prompt(&role), &prompt, &vision_shape())
                .await?;
            Ok::<_, PipelineError>(SpecialistVision {
                role: role.name.clone(),
                expertise: role.expertise.clone(),
                vision_text: payload.value.vision_text,
                proposed_tree: payload.value.proposed_tree,
            })
        }
    })
    .await;

    let mut visions = Vec::new();
    let mut failures = Vec::new();
    for (role, outcome) in specialists.iter().zip(outcomes) {
        match outcome {
            Ok(vision) => {
                log_unit_complete!(
                    role.name,
                    format!("{} planned file(s)", vision.proposed_tree.file_count())
                );
                visions.push(vision);
            }
            Err(e) => {
                log_unit_failed!(role.name, e);
                log_warning!("{} vision failed: {}", role.name, e);
                failures.push(RoleFailure {
                    role: role.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        visions = visions.len(),
        failures = failures.len(),
        total,
        "specialist visions collected"
    );
    log_phase_complete!(PHASE, "Specialist Visions");
    log_phase_complete_console!(PHASE);

    Ok(Level1Output {
        requirements: requirements.clone(),
        roles: roles.to_vec(),
        visions,
        failures,
    })
}
