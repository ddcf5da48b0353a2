//! Phase 2: Integration
//!
//! Merges every specialist vision into one architecture with a single call,
//! then validates the returned dependency graph against the folder tree and
//! repairs the implementation order from the edges where needed.

use archgen_sdk::{
    log_info, log_phase_complete, log_phase_complete_console, log_phase_start,
    log_phase_start_console, log_warning,
};

use crate::error::PipelineError;
use crate::pipeline::graph::validate_and_repair;
use crate::pipeline::roles::RoleSpec;
use crate::pipeline::types::{IntegratedArchitecture, Level2Output, RequirementSet, SpecialistVision};
use crate::workflow_utils::{ResilientExecutor, ResponseShape};

const PHASE: usize = 2;

fn architecture_shape() -> ResponseShape {
    ResponseShape::new("integrated architecture")
        .require("integratedVision")
        .require("rootFolder")
        .require("rootFolder.name")
        .require("dependencyGraph")
}

fn system_prompt(integrator: &RoleSpec) -> String {
    format!(
        r#"You are the {name}.

Your expertise: {expertise}

Several specialists have each proposed a vision and a partial file tree for the same project. Merge them into ONE coherent architecture.

Key instructions:
- Resolve every conflict between specialists and record each decision in resolutionNotes
- Produce one canonical folder tree containing every file the project needs
- Produce a dependency graph with exactly one node per file in the tree
- A node's path is relative to the root folder and does NOT include the root folder's name
- dependencies lists the paths of files that must exist before this file can be written
- implementationOrder is 1 for files without dependencies and otherwise greater than the order of every dependency
- Avoid circular dependencies

Respond with JSON only:
{{
  "integratedVision": "multi-paragraph architecture narrative",
  "resolutionNotes": ["..."],
  "rootFolder": {{
    "name": "project-root",
    "description": "...",
    "purpose": "...",
    "files": [{{"name": "...", "description": "...", "purpose": "..."}}],
    "subfolders": []
  }},
  "dependencyGraph": [
    {{
      "name": "main.rs",
      "path": "src/main.rs",
      "description": "...",
      "purpose": "...",
      "type": "rust",
      "dependencies": ["src/config.rs"],
      "dependents": [],
      "implementationOrder": 2
    }}
  ]
}}"#,
        name = integrator.name,
        expertise = integrator.expertise
    )
}

fn user_prompt(requirements: &RequirementSet, visions: &[SpecialistVision]) -> Result<String, PipelineError> {
    let visions_yaml = serde_yaml::to_string(visions).map_err(|e| {
        PipelineError::MissingPrecondition(format!("specialist visions are not serializable: {}", e))
    })?;

    Ok(format!(
        r#"# Requirements

{}

# Specialist Visions

```yaml
{}
```

Integrate these visions into a single architecture with a canonical folder tree and dependency graph."#,
        requirements.as_numbered_list(),
        visions_yaml
    ))
}

/// Integrate specialist visions into a validated architecture.
///
/// Fails with [`PipelineError::NoVisionsAvailable`] before any call when
/// `visions` is empty.
pub async fn integrate(
    executor: &ResilientExecutor,
    requirements: &RequirementSet,
    visions: &[SpecialistVision],
    integrator: &RoleSpec,
) -> Result<Level2Output, PipelineError> {
    if visions.is_empty() {
        return Err(PipelineError::NoVisionsAvailable);
    }
    if requirements.is_empty() {
        return Err(PipelineError::MissingPrecondition(
            "requirement list is empty".to_string(),
        ));
    }

    log_phase_start!(PHASE, "Integration", 3);
    log_phase_start_console!(
        PHASE,
        "Integration",
        format!("Merging {} specialist vision(s)", visions.len())
    );

    let prompt = user_prompt(requirements, visions)?;
    let outcome = executor
        .execute_as::<IntegratedArchitecture>(
            "integration",
            &system_prompt(integrator),
            &prompt,
            &architecture_shape(),
        )
        .await?;

    let mut architecture = outcome.value;
    let repair = validate_and_repair(&mut architecture)?;

    if repair.reordered {
        log_warning!("Implementation order recomputed from dependency edges");
    }
    log_info!(
        "Architecture has {} file(s) across {} order level(s)",
        architecture.dependency_graph.len(),
        architecture
            .dependency_graph
            .iter()
            .map(|n| n.implementation_order)
            .max()
            .unwrap_or(0)
    );
    log_phase_complete!(PHASE, "Integration");
    log_phase_complete_console!(PHASE);

    Ok(Level2Output {
        architecture,
        repair,
    })
}
