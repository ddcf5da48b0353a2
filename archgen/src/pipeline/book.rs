//! Integration book: a long-form, multi-chapter guide to the architecture.
//!
//! One structured call plans the outline. Chapters are ordered through the
//! same graph machinery as files (chapter ids act as paths) and each chapter
//! is written through the continuation engine.

use std::collections::HashSet;

use archgen_sdk::{
    log_phase_complete, log_phase_complete_console, log_phase_failed, log_phase_start,
    log_phase_start_console, log_progress, log_unit_complete, log_unit_failed, log_unit_start,
    log_warning,
};

use crate::config::{ContextLimits, ContinuationSettings};
use crate::error::PipelineError;
use crate::pipeline::continuation::{write_long_form, LongFormRequest};
use crate::pipeline::graph::compute_levels;
use crate::pipeline::phase3_generate::GenerationObserver;
use crate::pipeline::scheduler::{excerpt, schedule, UnitLedger};
use crate::pipeline::types::{
    BookOutline, ChapterPlan, DependencyContext, FileNode, GeneratedUnit, IntegratedArchitecture,
    RequirementSet, UnitKind,
};
use crate::workflow_utils::{ResilientExecutor, ResponseShape};

const PHASE: usize = 4;

const OUTLINE_PROMPT: &str = r#"You are a technical writer planning an integration book for a software project.

The book explains how the planned files fit together, in the order a developer should read them.

Key instructions:
- 3 to 8 chapters, each with a short id (e.g. "ch1"), a title, a summary and 2-6 section titles
- dependencies lists the ids of chapters a reader must finish first
- The first chapter has no dependencies; avoid circular dependencies

Respond with JSON only:
{
  "title": "book title",
  "chapters": [
    {"id": "ch1", "title": "...", "summary": "...", "sections": ["..."], "dependencies": []}
  ]
}"#;

const CHAPTER_PROMPT: &str = r#"You are a technical writer producing one chapter of an integration book in Markdown.

Key instructions:
- Write every listed section as a `##` heading using the exact section title
- Reference concrete files and paths from the architecture
- Build on the earlier chapters you are given instead of repeating them"#;

fn outline_shape() -> ResponseShape {
    ResponseShape::new("book outline")
        .require("title")
        .require("chapters")
}

/// Plan the book from the integrated architecture
pub async fn generate_outline(
    executor: &ResilientExecutor,
    requirements: &RequirementSet,
    architecture: &IntegratedArchitecture,
    limits: &ContextLimits,
) -> Result<BookOutline, PipelineError> {
    let files = architecture
        .dependency_graph
        .iter()
        .map(|n| format!("- {} (order {}): {}", n.path, n.implementation_order, n.purpose))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "# Requirements\n\n{}\n\n# Architecture\n\n{}\n\n# Files\n\n{}\n\nPlan the integration book.",
        requirements.as_numbered_list(),
        excerpt(&architecture.integrated_vision, limits.vision_slice_chars),
        files
    );

    let outcome = executor
        .execute_as::<BookOutline>("book:outline", OUTLINE_PROMPT, &prompt, &outline_shape())
        .await?;

    let outline = outcome.value;
    if outline.chapters.is_empty() {
        return Err(PipelineError::malformed(
            "book:outline",
            Some("chapters"),
            "outline has no chapters",
            "",
        ));
    }
    Ok(outline)
}

/// Chapters as graph nodes with levels computed from chapter dependencies
pub fn chapters_to_graph(outline: &BookOutline) -> Result<Vec<FileNode>, PipelineError> {
    let mut ids = HashSet::new();
    for chapter in &outline.chapters {
        if !ids.insert(chapter.id.as_str()) {
            return Err(PipelineError::inconsistent(
                &chapter.id,
                "id",
                "duplicate chapter id",
            ));
        }
    }

    let mut nodes: Vec<FileNode> = outline
        .chapters
        .iter()
        .map(|chapter| {
            let mut seen = HashSet::new();
            FileNode {
                name: chapter.title.clone(),
                path: chapter.id.clone(),
                description: chapter.summary.clone(),
                purpose: chapter.summary.clone(),
                file_type: "markdown".to_string(),
                dependencies: chapter
                    .dependencies
                    .iter()
                    .filter(|d| seen.insert(d.as_str()))
                    .cloned()
                    .collect(),
                dependents: vec![],
                implementation_order: 0,
            }
        })
        .collect();

    let levels = compute_levels(&nodes)?;
    for (node, level) in nodes.iter_mut().zip(levels) {
        node.implementation_order = level;
    }
    Ok(nodes)
}

fn chapter_brief(
    chapter: &ChapterPlan,
    book_title: &str,
    requirements: &RequirementSet,
    vision: &str,
    earlier: &[DependencyContext],
) -> String {
    let sections = chapter
        .sections
        .iter()
        .map(|s| format!("- {}", s))
        .collect::<Vec<_>>()
        .join("\n");
    let earlier = if earlier.is_empty() {
        "(this chapter does not build on earlier chapters)".to_string()
    } else {
        earlier
            .iter()
            .map(|c| format!("### {}\n{}", c.name, c.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        r#"# Book: {book_title}

# Chapter: {title}

{summary}

## Sections to write
{sections}

## Requirements
{requirements}

## Architecture
{vision}

## Earlier chapters (excerpts)
{earlier}"#,
        book_title = book_title,
        title = chapter.title,
        summary = chapter.summary,
        sections = sections,
        requirements = requirements.as_numbered_list(),
        vision = vision,
        earlier = earlier
    )
}

/// Plan and write the whole book; chapters come back in schedule order
pub async fn generate_book(
    executor: &ResilientExecutor,
    requirements: &RequirementSet,
    architecture: &IntegratedArchitecture,
    settings: &ContinuationSettings,
    limits: &ContextLimits,
    observer: &dyn GenerationObserver,
) -> Result<Vec<GeneratedUnit>, PipelineError> {
    if requirements.is_empty() {
        return Err(PipelineError::MissingPrecondition(
            "requirement list is empty".to_string(),
        ));
    }
    if architecture.dependency_graph.is_empty() {
        return Err(PipelineError::MissingPrecondition(
            "architecture has an empty dependency graph".to_string(),
        ));
    }

    log_phase_start!(PHASE, "Integration Book", PHASE);
    log_phase_start_console!(PHASE, "Integration Book", "Planning chapters");

    let outline = generate_outline(executor, requirements, architecture, limits).await?;
    let graph = chapters_to_graph(&outline)?;
    let order = schedule(&graph)?;
    let total = order.len();
    observer.on_schedule(total).await;

    let vision = excerpt(&architecture.integrated_vision, limits.vision_slice_chars);
    let mut ledger = UnitLedger::new();

    for node in &order {
        let Some(chapter) = outline.chapters.iter().find(|c| c.id == node.path) else {
            continue;
        };
        let mut earlier = ledger.dependency_context(node, limits.excerpt_chars)?;
        for (context, dep) in earlier.iter_mut().zip(&node.dependencies) {
            if let Some(plan) = outline.chapters.iter().find(|c| &c.id == dep) {
                context.name = plan.title.clone();
            }
        }

        observer.on_unit_started(node, ledger.completed_paths()).await;
        log_unit_start!(PHASE, chapter.id, chapter.title, total);

        let request = LongFormRequest {
            unit_id: chapter.id.clone(),
            title: chapter.title.clone(),
            sections: chapter.sections.clone(),
            instructions: CHAPTER_PROMPT.to_string(),
            brief: chapter_brief(chapter, &outline.title, requirements, &vision, &earlier),
        };

        let written = write_long_form(executor, &request, settings)
            .await
            .and_then(|outcome| {
                let unit = GeneratedUnit {
                    path: chapter.id.clone(),
                    description: chapter.title.clone(),
                    purpose: chapter.summary.clone(),
                    dependencies: node.dependencies.clone(),
                    content: format!("# {}\n\n{}", chapter.title, outcome.content),
                    language: "markdown".to_string(),
                    kind: UnitKind::Chapter,
                    complete: true,
                    possibly_incomplete: outcome.possibly_incomplete,
                };
                ledger.record(unit.clone())?;
                Ok((unit, outcome.rounds))
            });

        match written {
            Ok((unit, rounds)) => {
                if unit.possibly_incomplete {
                    log_warning!("Chapter '{}' may be incomplete", chapter.title);
                }
                log_unit_complete!(
                    chapter.id,
                    format!("{} continuation round(s)", rounds)
                );
                log_progress!(ledger.len(), total, "chapters");
                observer.on_unit_completed(&unit, ledger.len(), total).await;
            }
            Err(source) => {
                log_unit_failed!(chapter.id, source);
                log_phase_failed!(PHASE, "Integration Book", source);
                return Err(PipelineError::UnitGenerationFailed {
                    unit: chapter.id.clone(),
                    phase: PHASE,
                    completed: ledger.into_units(),
                    source: Box::new(source),
                });
            }
        }
    }

    log_phase_complete!(PHASE, "Integration Book");
    log_phase_complete_console!(PHASE);
    Ok(ledger.into_units())
}
