//! Pipeline orchestrator: phase runs and background generation jobs

use std::sync::Arc;
use std::time::Duration;

use archgen_sdk::JobStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::gateway::ModelGateway;
use crate::jobs::{InMemoryJobStore, JobHandle, JobProgressObserver, JobStore};
use crate::pipeline::book::generate_book;
use crate::pipeline::phase1_visions::generate_visions;
use crate::pipeline::phase2_integrate::integrate;
use crate::pipeline::phase3_generate::{generate_all, GenerationObserver, NoopObserver};
use crate::pipeline::roles::RoleSpec;
use crate::pipeline::types::{
    GeneratedUnit, GenerationJob, JobKind, Level1Output, Level2Output, Level3Output,
    RequirementSet,
};
use crate::workflow_utils::ResilientExecutor;

/// Outputs of a full three-phase run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub level1: Level1Output,
    pub level2: Level2Output,
    pub level3: Level3Output,
}

/// Entry point for running phases against one model gateway
#[derive(Clone)]
pub struct Pipeline {
    executor: ResilientExecutor,
    config: Arc<PipelineConfig>,
    jobs: Arc<dyn JobStore>,
}

impl Pipeline {
    /// Pipeline with a process-local job store
    pub fn new(gateway: Arc<dyn ModelGateway>, config: PipelineConfig) -> Self {
        let executor = ResilientExecutor::new(gateway, config.retry.clone());
        Self {
            executor,
            config: Arc::new(config),
            jobs: Arc::new(InMemoryJobStore::new()),
        }
    }

    pub fn with_job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    pub fn select_roles(&self, requirements: &RequirementSet) -> Vec<RoleSpec> {
        self.config.role_table.select_roles(requirements)
    }

    /// Phase 1
    pub async fn run_visions(
        &self,
        requirements: &RequirementSet,
    ) -> Result<Level1Output, PipelineError> {
        let roles = self.select_roles(requirements);
        generate_visions(
            &self.executor,
            requirements,
            &roles,
            self.config.vision_concurrency.max(1),
        )
        .await
    }

    /// Phase 2, using the integrator selected in phase 1
    pub async fn run_integration(
        &self,
        requirements: &RequirementSet,
        level1: &Level1Output,
    ) -> Result<Level2Output, PipelineError> {
        if level1.visions.is_empty() {
            return Err(PipelineError::NoVisionsAvailable);
        }
        let integrator = level1
            .roles
            .iter()
            .find(|r| r.integrator)
            .cloned()
            .unwrap_or_else(|| self.config.role_table.integrator.clone());
        integrate(&self.executor, requirements, &level1.visions, &integrator).await
    }

    /// Phase 3
    pub async fn run_generation(
        &self,
        requirements: &RequirementSet,
        level2: &Level2Output,
    ) -> Result<Level3Output, PipelineError> {
        self.run_generation_observed(requirements, level2, &NoopObserver)
            .await
    }

    pub async fn run_generation_observed(
        &self,
        requirements: &RequirementSet,
        level2: &Level2Output,
        observer: &dyn GenerationObserver,
    ) -> Result<Level3Output, PipelineError> {
        generate_all(
            &self.executor,
            requirements,
            level2,
            &self.config.context,
            observer,
        )
        .await
    }

    /// All three phases back to back
    pub async fn run_all(&self, requirements: &RequirementSet) -> Result<PipelineRun, PipelineError> {
        let level1 = self.run_visions(requirements).await?;
        let level2 = self.run_integration(requirements, &level1).await?;
        let level3 = self.run_generation(requirements, &level2).await?;
        Ok(PipelineRun {
            level1,
            level2,
            level3,
        })
    }

    /// Write the integration book for an integrated architecture
    pub async fn run_book(
        &self,
        requirements: &RequirementSet,
        level2: &Level2Output,
        observer: &dyn GenerationObserver,
    ) -> Result<Vec<GeneratedUnit>, PipelineError> {
        generate_book(
            &self.executor,
            requirements,
            &level2.architecture,
            &self.config.continuation,
            &self.config.context,
            observer,
        )
        .await
    }

    /// Start phase 3 in the background; poll with [`Pipeline::job_status`]
    pub async fn spawn_generation_job(
        &self,
        requirements: RequirementSet,
        level2: Level2Output,
    ) -> Result<Uuid, PipelineError> {
        self.spawn_job(JobKind::Files, requirements, level2).await
    }

    /// Start the integration book in the background
    pub async fn spawn_book_job(
        &self,
        requirements: RequirementSet,
        level2: Level2Output,
    ) -> Result<Uuid, PipelineError> {
        self.spawn_job(JobKind::Book, requirements, level2).await
    }

    async fn spawn_job(
        &self,
        kind: JobKind,
        requirements: RequirementSet,
        level2: Level2Output,
    ) -> Result<Uuid, PipelineError> {
        let job = GenerationJob::new(kind);
        let id = job.id;
        self.jobs.create(job).await?;
        tracing::info!(job = %id, kind = kind.as_str(), "generation job created");

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.drive_job(id, kind, requirements, level2).await;
        });

        Ok(id)
    }

    async fn drive_job(
        &self,
        id: Uuid,
        kind: JobKind,
        requirements: RequirementSet,
        level2: Level2Output,
    ) {
        let handle = JobHandle::new(self.jobs.clone(), id);
        if let Err(e) = handle.modify(|job| job.status = JobStatus::InProgress).await {
            tracing::warn!(job = %id, error = %e, "could not start job");
            return;
        }

        let observer = JobProgressObserver::new(JobHandle::new(self.jobs.clone(), id));
        let outcome = match kind {
            JobKind::Files => self
                .run_generation_observed(&requirements, &level2, &observer)
                .await
                .map(|level3| level3.units),
            JobKind::Book => self.run_book(&requirements, &level2, &observer).await,
        };

        let recorded = match outcome {
            Ok(units) => {
                tracing::info!(job = %id, units = units.len(), "generation job complete");
                handle.complete(units).await
            }
            Err(e) => {
                tracing::error!(job = %id, error = %e, "generation job failed");
                handle.fail(&e).await
            }
        };
        if let Err(e) = recorded {
            tracing::warn!(job = %id, error = %e, "could not record job outcome");
        }
    }

    /// Current record of a job
    pub async fn job_status(&self, id: Uuid) -> Result<GenerationJob, PipelineError> {
        self.jobs
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::Job(format!("job {} not found", id)))
    }

    /// Poll until the job reaches a terminal state
    pub async fn wait_for_job(
        &self,
        id: Uuid,
        poll_interval: Duration,
    ) -> Result<GenerationJob, PipelineError> {
        loop {
            let job = self.job_status(id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
