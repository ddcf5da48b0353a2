//! Error taxonomy for pipeline runs.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::pipeline::types::GeneratedUnit;

/// Errors surfaced by the pipeline phases
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport failure that survived the retry policy (or was not retryable)
    #[error("model call '{call}' failed after {attempts} attempt(s): {source}")]
    ModelCall {
        call: String,
        attempts: u32,
        #[source]
        source: GatewayError,
    },

    /// Extraction or shape validation failed; not retried by the executor
    #[error("malformed output from '{call}'{}: {message}", field_suffix(.field))]
    MalformedOutput {
        call: String,
        field: Option<String>,
        message: String,
        raw_preview: String,
    },

    /// Integration was asked to run without any specialist vision
    #[error("no specialist visions available for integration")]
    NoVisionsAvailable,

    /// Caller supplied incomplete prior-phase output
    #[error("missing precondition: {0}")]
    MissingPrecondition(String),

    /// The dependency graph disagrees with itself or with the folder tree
    #[error("inconsistent dependency graph at '{node}' ({field}): {message}")]
    InconsistentDependencyGraph {
        node: String,
        field: String,
        message: String,
    },

    /// No topological order exists
    #[error("cyclic dependency among: {}", .nodes.join(", "))]
    CyclicDependency { nodes: Vec<String> },

    /// A unit failed; units finished before it are kept in `completed`
    #[error("generation of '{unit}' failed in phase {phase}: {source}")]
    UnitGenerationFailed {
        unit: String,
        phase: usize,
        completed: Vec<GeneratedUnit>,
        #[source]
        source: Box<PipelineError>,
    },

    /// Job store failure
    #[error("job store error: {0}")]
    Job(String),
}

fn field_suffix(field: &Option<String>) -> String {
    match field {
        Some(f) => format!(" (field '{}')", f),
        None => String::new(),
    }
}

impl PipelineError {
    /// Whether a caller can reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ModelCall { source, .. } => source.is_retryable(),
            Self::UnitGenerationFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Short error code for logs and job records
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelCall { .. } => "model_call",
            Self::MalformedOutput { .. } => "malformed_output",
            Self::NoVisionsAvailable => "no_visions_available",
            Self::MissingPrecondition(_) => "missing_precondition",
            Self::InconsistentDependencyGraph { .. } => "inconsistent_dependency_graph",
            Self::CyclicDependency { .. } => "cyclic_dependency",
            Self::UnitGenerationFailed { .. } => "unit_generation_failed",
            Self::Job(_) => "job_store",
        }
    }

    /// Units that completed before the failure, if any
    pub fn completed_units(&self) -> &[GeneratedUnit] {
        match self {
            Self::UnitGenerationFailed { completed, .. } => completed,
            _ => &[],
        }
    }

    pub(crate) fn malformed(
        call: &str,
        field: Option<&str>,
        message: impl Into<String>,
        raw: &str,
    ) -> Self {
        Self::MalformedOutput {
            call: call.to_string(),
            field: field.map(str::to_string),
            message: message.into(),
            raw_preview: raw.chars().take(500).collect(),
        }
    }

    pub(crate) fn inconsistent(
        node: impl Into<String>,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::InconsistentDependencyGraph {
            node: node.into(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}
