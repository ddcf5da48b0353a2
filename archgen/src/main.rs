use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use archgen::cli::{require_state_file, Args, Command};
use archgen::config::PipelineConfig;
use archgen::database::SqliteJobStore;
use archgen::error::PipelineError;
use archgen::gateway::HttpGateway;
use archgen::pipeline::{GeneratedUnit, Level1Output, Level2Output, Pipeline};
use archgen::utils::{load_yaml, save_yaml, write_units};
use archgen_sdk::{log_found, log_info, log_progress, log_warning, JobStatus};
use clap::Parser;
use tracing_subscriber::EnvFilter;

const LEVEL1_FILE: &str = "level1_visions.yaml";
const LEVEL2_FILE: &str = "level2_architecture.yaml";
const LEVEL3_FILE: &str = "level3_units.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("archgen=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);

    match &args.command {
        Command::Roles(requirements) => {
            let requirements = requirements.load()?;
            for role in config.role_table.select_roles(&requirements) {
                let marker = if role.integrator { " (integrator)" } else { "" };
                println!("{}{}: {}", role.name, marker, role.expertise);
            }
            Ok(())
        }
        Command::Status { id, limit, state } => match id {
            Some(id) => show_status(&args, *id),
            None => list_jobs(&args, *limit, *state),
        },
        Command::Prune { older_than_days } => prune_jobs(&args, *older_than_days),
        Command::Visions(requirements) => {
            let requirements = requirements.load()?;
            let pipeline = build_pipeline(config)?;
            let level1 = pipeline.run_visions(&requirements).await?;
            save_level1(&args, &level1)
        }
        Command::Integrate {
            requirements,
            level1,
        } => {
            let requirements = requirements.load()?;
            let path = args.input_or_default(level1, LEVEL1_FILE);
            require_state_file(&path, "visions")?;
            let level1: Level1Output = load_yaml(&path)?;

            let pipeline = build_pipeline(config)?;
            let level2 = pipeline.run_integration(&requirements, &level1).await?;
            save_level2(&args, &level2)
        }
        Command::Generate {
            requirements,
            level2,
        } => {
            let requirements = requirements.load()?;
            let path = args.input_or_default(level2, LEVEL2_FILE);
            require_state_file(&path, "integrate")?;
            let level2: Level2Output = load_yaml(&path)?;

            let pipeline = build_pipeline(config)?;
            match pipeline.run_generation(&requirements, &level2).await {
                Ok(level3) => save_units(&args, &level3.units),
                Err(e) => Err(keep_partial(&args, e)),
            }
        }
        Command::Run(requirements) => {
            let requirements = requirements.load()?;
            let pipeline = build_pipeline(config)?;

            let level1 = pipeline.run_visions(&requirements).await?;
            save_level1(&args, &level1)?;
            let level2 = pipeline.run_integration(&requirements, &level1).await?;
            save_level2(&args, &level2)?;
            match pipeline.run_generation(&requirements, &level2).await {
                Ok(level3) => save_units(&args, &level3.units),
                Err(e) => Err(keep_partial(&args, e)),
            }
        }
        Command::Book {
            requirements,
            level2,
            poll_secs,
        } => {
            let requirements = requirements.load()?;
            let path = args.input_or_default(level2, LEVEL2_FILE);
            require_state_file(&path, "integrate")?;
            let level2: Level2Output = load_yaml(&path)?;

            let store = SqliteJobStore::open(&args.jobs_db_path())?;
            let pipeline = build_pipeline(config)?.with_job_store(Arc::new(store));
            run_book_job(&args, &pipeline, requirements, level2, *poll_secs).await
        }
    }
}

fn build_pipeline(config: PipelineConfig) -> Result<Pipeline> {
    let gateway = HttpGateway::from_settings(&config.gateway)
        .context("Failed to configure the model gateway")?;
    Ok(Pipeline::new(Arc::new(gateway), config))
}

fn save_level1(args: &Args, level1: &Level1Output) -> Result<()> {
    log_found!(level1.visions.len(), "specialist visions");
    for failure in &level1.failures {
        log_warning!("{} produced no vision: {}", failure.role, failure.error);
    }
    save_yaml(&args.state_path(LEVEL1_FILE), level1, 1, "Specialist visions")
}

fn save_level2(args: &Args, level2: &Level2Output) -> Result<()> {
    log_found!(level2.architecture.dependency_graph.len(), "planned files");
    if !level2.repair.is_clean() {
        log_info!("Dependency graph repaired: {:?}", level2.repair);
    }
    save_yaml(&args.state_path(LEVEL2_FILE), level2, 2, "Integrated architecture")
}

fn save_units(args: &Args, units: &[GeneratedUnit]) -> Result<()> {
    save_yaml(&args.state_path(LEVEL3_FILE), &units, 3, "Generated units")?;
    let written = write_units(&args.files_dir(), units)?;
    log_info!("Wrote {} file(s) to {}", written.len(), args.files_dir().display());
    Ok(())
}

/// Write whatever completed before a failure, then hand the error back
fn keep_partial(args: &Args, error: PipelineError) -> anyhow::Error {
    let completed = error.completed_units();
    if !completed.is_empty() {
        log_warning!("Keeping {} unit(s) completed before the failure", completed.len());
        if let Err(e) = save_units(args, completed) {
            log_warning!("Could not save partial output: {:#}", e);
        }
    }
    error.into()
}

async fn run_book_job(
    args: &Args,
    pipeline: &Pipeline,
    requirements: archgen::pipeline::RequirementSet,
    level2: Level2Output,
    poll_secs: u64,
) -> Result<()> {
    let id = pipeline.spawn_book_job(requirements, level2).await?;
    log_info!("Started book job {}", id);

    let mut reported = 0;
    let job = loop {
        let job = pipeline.job_status(id).await?;
        if job.completed_units > reported {
            reported = job.completed_units;
            log_progress!(job.completed_units, job.total_units, "chapters");
        }
        if job.status.is_terminal() {
            break job;
        }
        tokio::time::sleep(Duration::from_secs(poll_secs.max(1))).await;
    };

    let chapters = job.result.clone().unwrap_or_default();
    if !chapters.is_empty() {
        let written = write_units(&args.book_dir(), &chapters)?;
        log_info!("Wrote {} chapter(s) to {}", written.len(), args.book_dir().display());
    }

    match job.status {
        JobStatus::Complete => Ok(()),
        _ => anyhow::bail!(
            "Book job {} failed: {}",
            id,
            job.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

fn show_status(args: &Args, id: uuid::Uuid) -> Result<()> {
    let store = SqliteJobStore::open(&args.jobs_db_path())?;
    let job = store
        .get_job(&id)?
        .with_context(|| format!("No job with id {}", id))?;

    println!("Job:       {}", job.id);
    println!("Kind:      {}", job.kind.as_str());
    println!("Status:    {}", job.status);
    println!(
        "Progress:  {}/{} ({:.0}%)",
        job.completed_units,
        job.total_units,
        job.progress() * 100.0
    );
    if let Some(label) = &job.current_unit_label {
        println!("Current:   {}", label);
    }
    if let Some(error) = &job.error {
        println!("Error:     {}", error);
    }
    println!("Updated:   {}", job.updated_at.to_rfc3339());
    Ok(())
}

fn list_jobs(args: &Args, limit: usize, state: Option<JobStatus>) -> Result<()> {
    let store = SqliteJobStore::open(&args.jobs_db_path())?;
    let jobs = store.list_jobs(limit, state)?;
    if jobs.is_empty() {
        log_info!("No jobs found");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:<5}  {:<12}  {}/{}  {}",
            job.id,
            job.kind.as_str(),
            job.status.as_str(),
            job.completed_units,
            job.total_units,
            job.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn prune_jobs(args: &Args, older_than_days: u32) -> Result<()> {
    let store = SqliteJobStore::open(&args.jobs_db_path())?;
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(older_than_days));
    let deleted = store.delete_jobs_before(cutoff)?;
    log_info!("Deleted {} finished job(s) created before {}", deleted, cutoff.to_rfc3339());
    Ok(())
}
