//! Workflow utilities shared by every pipeline phase
//!
//! - **batch**: Concurrent execution with a bounded worker pool
//! - **extract**: JSON recovery from free-form model output
//! - **executor**: Retry/backoff, extraction and shape validation around the gateway

pub mod batch;
pub mod executor;
pub mod extract;

pub use batch::{execute_batch, TaskContext};
pub use executor::{CallOutcome, ResilientExecutor, ResponseShape, RetryPolicy};
pub use extract::{extract_json, ExtractError};
