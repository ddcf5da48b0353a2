//! Background generation jobs and their progress records

use std::sync::{Arc, Mutex};
use std::time::Duration;

use archgen::database::SqliteJobStore;
use archgen::error::PipelineError;
use archgen::gateway::{GatewayError, ScriptedGateway};
use archgen::jobs::{InMemoryJobStore, JobStore};
use archgen::pipeline::types::{GenerationJob, UnitKind};
use archgen::pipeline::Pipeline;
use archgen_sdk::JobStatus;
use async_trait::async_trait;
use serde_json::json;
use tempfile::tempdir;
use uuid::Uuid;

use super::common::*;

const POLL: Duration = Duration::from_millis(5);

/// Store wrapper that keeps every accepted update
#[derive(Default)]
struct HistoryStore {
    inner: InMemoryJobStore,
    history: Mutex<Vec<GenerationJob>>,
}

impl HistoryStore {
    fn history(&self) -> Vec<GenerationJob> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for HistoryStore {
    async fn create(&self, job: GenerationJob) -> Result<(), PipelineError> {
        self.inner.create(job.clone()).await?;
        self.history.lock().unwrap().push(job);
        Ok(())
    }

    async fn update(&self, job: GenerationJob) -> Result<(), PipelineError> {
        self.inner.update(job.clone()).await?;
        self.history.lock().unwrap().push(job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationJob>, PipelineError> {
        self.inner.get(id).await
    }
}

async fn integrated(pipeline: &Pipeline) -> archgen::pipeline::types::Level2Output {
    pipeline
        .run_integration(&requirements(), &level1_fixture())
        .await
        .unwrap()
}

fn assert_monotonic(history: &[GenerationJob]) {
    let mut last_completed = 0;
    for job in history {
        assert!(job.completed_units >= last_completed);
        last_completed = job.completed_units;
    }
    let terminal: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, j)| j.status.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminal, vec![history.len() - 1]);
}

#[tokio::test]
async fn test_generation_job_reports_monotonic_progress() {
    let gateway = Arc::new(pipeline_gateway(architecture_json(&tracker_nodes()), None));
    let store = Arc::new(HistoryStore::default());
    let pipeline = Pipeline::new(gateway, fast_config()).with_job_store(store.clone());
    let level2 = integrated(&pipeline).await;

    let id = pipeline
        .spawn_generation_job(requirements(), level2)
        .await
        .unwrap();
    let job = pipeline.wait_for_job(id, POLL).await.unwrap();

    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.total_units, 4);
    assert_eq!(job.completed_units, 4);
    assert_eq!(job.result.as_ref().map(Vec::len), Some(4));
    assert!(job.current_unit_label.is_none());

    let history = store.history();
    assert_eq!(history[0].status, JobStatus::Initializing);
    assert!(history
        .iter()
        .any(|j| j.current_unit_label.as_deref() == Some("main.rs (src/main.rs)")));
    assert_monotonic(&history);
}

#[tokio::test]
async fn test_failed_job_ends_in_error_with_partial_result() {
    let gateway = Arc::new(pipeline_gateway(
        architecture_json(&tracker_nodes()),
        Some("src/main.rs"),
    ));
    let store = Arc::new(HistoryStore::default());
    let pipeline = Pipeline::new(gateway, fast_config()).with_job_store(store.clone());
    let level2 = integrated(&pipeline).await;

    let id = pipeline
        .spawn_generation_job(requirements(), level2)
        .await
        .unwrap();
    let job = pipeline.wait_for_job(id, POLL).await.unwrap();

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap().contains("src/main.rs"));
    assert_eq!(job.completed_units, 3);
    assert_eq!(job.result.map(|units| units.len()), Some(3));
    assert_monotonic(&store.history());
}

fn book_gateway() -> ScriptedGateway {
    let architecture = architecture_json(&tracker_nodes());
    let outline = json!({
        "title": "Tracker Internals",
        "chapters": [
            {"id": "ch2", "title": "Storage", "summary": "db layer",
             "sections": ["Schema Layout"], "dependencies": ["ch1"]},
            {"id": "ch1", "title": "Domain", "summary": "models",
             "sections": ["Task Model"], "dependencies": []}
        ]
    })
    .to_string();

    ScriptedGateway::with_responder(move |system, user| {
        if is_integration_call(system) {
            return Ok(architecture.clone());
        }
        if system.contains("planning an integration book") {
            return Ok(format!("```json\n{}\n```", outline));
        }
        if system.contains("one chapter of an integration book") {
            let body = if user.contains("# Chapter: Domain") {
                "## Task Model\nTasks have owners."
            } else {
                "## Schema Layout\nOne table per aggregate."
            };
            return Ok(format!("{}\n\n[[UNIT_COMPLETE]]", body));
        }
        Err(GatewayError::config("unexpected request"))
    })
}

#[tokio::test]
async fn test_book_job_writes_chapters_in_dependency_order() {
    let gateway = Arc::new(book_gateway());
    let pipeline = Pipeline::new(gateway, fast_config());
    let level2 = integrated(&pipeline).await;

    let id = pipeline.spawn_book_job(requirements(), level2).await.unwrap();
    let job = pipeline.wait_for_job(id, POLL).await.unwrap();

    assert_eq!(job.status, JobStatus::Complete);
    let chapters = job.result.unwrap();
    let ids: Vec<&str> = chapters.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(ids, vec!["ch1", "ch2"]);
    assert!(chapters.iter().all(|c| c.kind == UnitKind::Chapter));
    assert!(chapters[0].content.starts_with("# Domain\n\n## Task Model"));
    assert!(!chapters[1].possibly_incomplete);
}

#[tokio::test]
async fn test_sqlite_store_backs_a_job() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("jobs.db");

    let gateway = Arc::new(pipeline_gateway(architecture_json(&tracker_nodes()), None));
    let store = Arc::new(SqliteJobStore::open(&db_path).unwrap());
    let pipeline = Pipeline::new(gateway, fast_config()).with_job_store(store);
    let level2 = integrated(&pipeline).await;

    let id = pipeline
        .spawn_generation_job(requirements(), level2)
        .await
        .unwrap();
    pipeline.wait_for_job(id, POLL).await.unwrap();

    let reader = SqliteJobStore::open(&db_path).unwrap();
    let job = reader.get_job(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.progress(), 1.0);
    assert_eq!(job.result.unwrap()[3].path, "src/main.rs");
}

#[tokio::test]
async fn test_unknown_job_is_an_error() {
    let gateway = Arc::new(ScriptedGateway::new());
    let pipeline = Pipeline::new(gateway, fast_config());
    assert!(matches!(
        pipeline.job_status(Uuid::new_v4()).await,
        Err(PipelineError::Job(_))
    ));
}
