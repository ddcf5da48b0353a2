//! Job store for long-running generation runs
//!
//! The driving task is the only writer of a job record; pollers only read.
//! Every store enforces the same transition rules through [`check_transition`]:
//! progress never decreases and terminal records never change.

use std::collections::HashMap;
use std::sync::Arc;

use archgen_sdk::JobStatus;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::phase3_generate::GenerationObserver;
use crate::pipeline::types::{FileNode, GeneratedUnit, GenerationJob};

/// Storage for [`GenerationJob`] records
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record; fails if the id exists
    async fn create(&self, job: GenerationJob) -> Result<(), PipelineError>;

    /// Replace an existing record, subject to [`check_transition`]
    async fn update(&self, job: GenerationJob) -> Result<(), PipelineError>;

    async fn get(&self, id: Uuid) -> Result<Option<GenerationJob>, PipelineError>;
}

/// Reject updates that would move a job backwards
pub fn check_transition(current: &GenerationJob, next: &GenerationJob) -> Result<(), PipelineError> {
    if current.status.is_terminal() {
        return Err(PipelineError::Job(format!(
            "job {} is already {} and cannot change",
            current.id, current.status
        )));
    }
    if next.status == JobStatus::Initializing && current.status != JobStatus::Initializing {
        return Err(PipelineError::Job(format!(
            "job {} cannot return to initializing",
            current.id
        )));
    }
    if next.completed_units < current.completed_units {
        return Err(PipelineError::Job(format!(
            "job {} progress cannot decrease ({} -> {})",
            current.id, current.completed_units, next.completed_units
        )));
    }
    if next.total_units > 0 && next.completed_units > next.total_units {
        return Err(PipelineError::Job(format!(
            "job {} reports {} of {} units",
            current.id, next.completed_units, next.total_units
        )));
    }
    Ok(())
}

/// Process-local job store
#[derive(Default, Clone)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<Uuid, GenerationJob>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: GenerationJob) -> Result<(), PipelineError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(PipelineError::Job(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn update(&self, job: GenerationJob) -> Result<(), PipelineError> {
        let mut jobs = self.jobs.write().await;
        let current = jobs
            .get(&job.id)
            .ok_or_else(|| PipelineError::Job(format!("job {} not found", job.id)))?;
        check_transition(current, &job)?;
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationJob>, PipelineError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }
}

/// Read-modify-write helper used by the driving task
pub struct JobHandle {
    store: Arc<dyn JobStore>,
    id: Uuid,
}

impl JobHandle {
    pub fn new(store: Arc<dyn JobStore>, id: Uuid) -> Self {
        Self { store, id }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Apply `change` to the stored record
    pub async fn modify<F>(&self, change: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut GenerationJob) + Send,
    {
        let mut job = self
            .store
            .get(self.id)
            .await?
            .ok_or_else(|| PipelineError::Job(format!("job {} not found", self.id)))?;
        change(&mut job);
        job.updated_at = Utc::now();
        self.store.update(job).await
    }

    pub async fn complete(&self, units: Vec<GeneratedUnit>) -> Result<(), PipelineError> {
        self.modify(move |job| {
            job.status = JobStatus::Complete;
            job.completed_units = units.len().max(job.completed_units);
            job.total_units = job.total_units.max(job.completed_units);
            job.current_unit_label = None;
            job.result = Some(units);
        })
        .await
    }

    /// Mark failed; completed units are kept as the partial result
    pub async fn fail(&self, error: &PipelineError) -> Result<(), PipelineError> {
        let message = error.to_string();
        let partial = error.completed_units().to_vec();
        self.modify(move |job| {
            job.status = JobStatus::Error;
            job.error = Some(message);
            if !partial.is_empty() {
                job.result = Some(partial);
            }
        })
        .await
    }
}

/// Observer that mirrors generation progress into the job record
pub struct JobProgressObserver {
    handle: JobHandle,
}

impl JobProgressObserver {
    pub fn new(handle: JobHandle) -> Self {
        Self { handle }
    }

    async fn apply<F>(&self, change: F)
    where
        F: FnOnce(&mut GenerationJob) + Send,
    {
        if let Err(e) = self.handle.modify(change).await {
            tracing::warn!(job = %self.handle.id(), error = %e, "job progress update rejected");
        }
    }
}

#[async_trait]
impl GenerationObserver for JobProgressObserver {
    async fn on_schedule(&self, total_units: usize) {
        self.apply(move |job| {
            job.status = JobStatus::InProgress;
            job.total_units = total_units;
        })
        .await;
    }

    async fn on_unit_started(&self, node: &FileNode, _completed: &[String]) {
        let label = if node.name.is_empty() {
            node.path.clone()
        } else {
            format!("{} ({})", node.name, node.path)
        };
        self.apply(move |job| job.current_unit_label = Some(label)).await;
    }

    async fn on_unit_completed(&self, _unit: &GeneratedUnit, completed: usize, _total: usize) {
        self.apply(move |job| job.completed_units = completed).await;
    }
}
