//! CLI argument definitions for the `archgen` binary.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use archgen_sdk::JobStatus;
use clap::{Args as ClapArgs, Parser, Subcommand};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::pipeline::types::RequirementSet;
use crate::utils::load_requirements;

/// Requirements-to-codebase generation pipeline
///
/// Runs three phases against an OpenAI-compatible model endpoint:
///
/// - Phase 1: one vision and proposed file tree per specialist role
/// - Phase 2: integrate the visions into one architecture and dependency graph
/// - Phase 3: generate every planned file in dependency order
///
/// Each phase writes a YAML state file to the output directory so later
/// phases can be rerun on their own.
#[derive(Parser, Debug, Clone)]
#[command(name = "archgen")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a YAML config file
    ///
    /// Defaults to config.yaml in the per-user config directory when present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output directory for state files and generated units
    #[arg(long, global = true, value_name = "DIR", default_value = "archgen-output")]
    pub out: PathBuf,

    /// Model id, overriding config and ARCHGEN_MODEL
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// API base URL, overriding config and ARCHGEN_BASE_URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Concurrent specialist vision calls
    #[arg(long, global = true, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Continuation rounds allowed per long-form unit
    #[arg(long, global = true, value_name = "N")]
    pub max_rounds: Option<u32>,

    /// SQLite job database
    #[arg(long, global = true, value_name = "PATH")]
    pub jobs_db: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the roles selected for the requirements (no model calls)
    Roles(RequirementArgs),

    /// Phase 1: specialist visions
    Visions(RequirementArgs),

    /// Phase 2: integrate visions from a level 1 state file
    Integrate {
        #[command(flatten)]
        requirements: RequirementArgs,

        /// Level 1 state file (default: <out>/level1_visions.yaml)
        #[arg(long, value_name = "PATH")]
        level1: Option<PathBuf>,
    },

    /// Phase 3: generate files from a level 2 state file
    Generate {
        #[command(flatten)]
        requirements: RequirementArgs,

        /// Level 2 state file (default: <out>/level2_architecture.yaml)
        #[arg(long, value_name = "PATH")]
        level2: Option<PathBuf>,
    },

    /// All three phases
    Run(RequirementArgs),

    /// Write the integration book as a background job and wait for it
    Book {
        #[command(flatten)]
        requirements: RequirementArgs,

        /// Level 2 state file (default: <out>/level2_architecture.yaml)
        #[arg(long, value_name = "PATH")]
        level2: Option<PathBuf>,

        /// Seconds between job polls
        #[arg(long, default_value_t = 2)]
        poll_secs: u64,
    },

    /// Show one job record, or list recent jobs when no id is given
    Status {
        id: Option<Uuid>,

        /// Jobs to list
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only list jobs in this state (initializing, in-progress, complete, error)
        #[arg(long, value_name = "STATE", value_parser = parse_job_status)]
        state: Option<JobStatus>,
    },

    /// Delete finished jobs older than the given age from the job database
    Prune {
        /// Age in days
        #[arg(long, value_name = "DAYS", default_value_t = 30)]
        older_than_days: u32,
    },
}

fn parse_job_status(value: &str) -> Result<JobStatus, String> {
    JobStatus::parse(value).ok_or_else(|| format!("unknown job state '{}'", value))
}

/// Where the requirements come from
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RequirementArgs {
    /// Requirements file: a YAML list or one requirement per line
    #[arg(long, value_name = "PATH")]
    pub requirements: Option<PathBuf>,

    /// A single requirement; may be repeated
    #[arg(long = "requirement", value_name = "TEXT")]
    pub requirement: Vec<String>,
}

impl RequirementArgs {
    /// File entries first, then `--requirement` values
    pub fn load(&self) -> Result<RequirementSet> {
        let mut items: Vec<String> = Vec::new();
        if let Some(path) = &self.requirements {
            items.extend(load_requirements(path)?.iter().cloned());
        }
        items.extend(self.requirement.iter().cloned());

        let requirements = RequirementSet::new(items);
        if requirements.is_empty() {
            bail!("No requirements given; use --requirements PATH or --requirement TEXT");
        }
        Ok(requirements)
    }
}

impl Args {
    /// Apply CLI overrides on top of a loaded config
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(model) = &self.model {
            config.gateway.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.gateway.base_url = base_url.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.vision_concurrency = concurrency.max(1);
        }
        if let Some(max_rounds) = self.max_rounds {
            config.continuation.max_rounds = max_rounds;
        }
    }

    pub fn state_path(&self, file_name: &str) -> PathBuf {
        self.out.join(file_name)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.out.join("files")
    }

    pub fn book_dir(&self) -> PathBuf {
        self.out.join("book")
    }

    /// Explicit path, or the default state file in the output directory
    pub fn input_or_default(&self, explicit: &Option<PathBuf>, file_name: &str) -> PathBuf {
        explicit
            .clone()
            .unwrap_or_else(|| self.state_path(file_name))
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.jobs_db
            .clone()
            .unwrap_or_else(crate::config::default_jobs_db_path)
    }
}

/// Fail early with a readable message when a state file is missing
pub fn require_state_file(path: &Path, produced_by: &str) -> Result<()> {
    if !path.exists() {
        bail!(
            "State file not found: {} (run `archgen {}` first or pass its path)",
            path.display(),
            produced_by
        );
    }
    Ok(())
}
