//! Requirements-to-codebase generation pipeline
//!
//! Specialist visions, one integrated architecture with a dependency graph,
//! dependency-ordered file generation, and long-form output through the
//! continuation engine.

// CLI argument definitions
pub mod cli;

// Pipeline configuration
pub mod config;

// SQLite job store
pub mod database;

// Error taxonomy
pub mod error;

// Model gateway implementations
pub mod gateway;

// Job records and progress tracking
pub mod jobs;

// Pipeline phases and orchestrator
pub mod pipeline;

// File helpers for the CLI
pub mod utils;

// Reusable execution helpers
pub mod workflow_utils;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use gateway::{GatewayError, ModelGateway};
pub use jobs::{InMemoryJobStore, JobStore};
pub use pipeline::{Pipeline, PipelineRun};
