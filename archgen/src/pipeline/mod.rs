//! Requirements-to-codebase generation pipeline
//!
//! Three sequential phases:
//! 1. **Specialist Visions** - one vision and partial file tree per expert role
//! 2. **Integration** - one architecture, canonical tree and dependency graph
//! 3. **Unit Generation** - every planned file, in dependency order
//!
//! plus the optional long-form integration book, written chapter by chapter
//! through the continuation engine.

pub mod book;
pub mod continuation;
pub mod graph;
pub mod phase1_visions;
pub mod phase2_integrate;
pub mod phase3_generate;
pub mod roles;
pub mod scheduler;
pub mod types;
pub mod workflow;

pub use phase3_generate::{GenerationObserver, NoopObserver};
pub use roles::{ConditionalRole, RoleSpec, RoleTable};
pub use scheduler::{schedule, UnitLedger};
pub use types::*;
pub use workflow::{Pipeline, PipelineRun};
