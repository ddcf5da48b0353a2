//! Long-form generation: draft, continue while incomplete, complete.
//!
//! The model ends each response with one of two marker lines:
//!
//! ```text
//! [[UNIT_COMPLETE]]
//!
//! [[UNIT_INCOMPLETE]]
//! COVERED: Overview; Data flow
//! REMAINING: Testing; Deployment
//! ```
//!
//! Markers are stripped from the accumulated content. A response without any
//! marker counts as complete only when every requested section title already
//! appears in the content.

use archgen_sdk::{log_continuation_round, log_unit_progress, log_warning};

use crate::config::ContinuationSettings;
use crate::error::PipelineError;
use crate::pipeline::scheduler::tail;
use crate::pipeline::types::ContinuationState;
use crate::workflow_utils::ResilientExecutor;

pub const COMPLETE_MARKER: &str = "[[UNIT_COMPLETE]]";
pub const INCOMPLETE_MARKER: &str = "[[UNIT_INCOMPLETE]]";

/// Marker rules appended to every long-form system prompt
pub fn marker_instructions() -> String {
    format!(
        r#"End your response with exactly one marker line:
- `{complete}` if every requested section is fully written.
- `{incomplete}` if you ran out of room, followed by
  `COVERED: <section>; <section>` and `REMAINING: <section>; <section>`.
Never summarise or skip a section to fit; stop cleanly and mark the response incomplete instead."#,
        complete = COMPLETE_MARKER,
        incomplete = INCOMPLETE_MARKER
    )
}

/// Completion signal found in one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Complete,
    Incomplete {
        covered: Vec<String>,
        remaining: Vec<String>,
    },
    Missing,
}

/// Split a response into content and its marker; the last marker wins
pub fn parse_marker(response: &str) -> (String, Marker) {
    let mut marker = Marker::Missing;
    let mut kept: Vec<&str> = Vec::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if let Some(pos) = line.find(COMPLETE_MARKER) {
            marker = Marker::Complete;
            push_remainder(&mut kept, &line[..pos]);
            continue;
        }
        if let Some(pos) = line.find(INCOMPLETE_MARKER) {
            marker = Marker::Incomplete {
                covered: Vec::new(),
                remaining: Vec::new(),
            };
            push_remainder(&mut kept, &line[..pos]);
            continue;
        }

        if let Marker::Incomplete { covered, remaining } = &mut marker {
            if let Some(list) = strip_label(trimmed, "COVERED:") {
                *covered = split_list(list);
                continue;
            }
            if let Some(list) = strip_label(trimmed, "REMAINING:") {
                *remaining = split_list(list);
                continue;
            }
        }

        kept.push(line);
    }

    let content = kept.join("\n").trim_end().to_string();
    (content, marker)
}

fn push_remainder<'a>(kept: &mut Vec<&'a str>, before_marker: &'a str) {
    if !before_marker.trim().is_empty() {
        kept.push(before_marker.trim_end());
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    if line.len() >= label.len() && line[..label.len()].eq_ignore_ascii_case(label) {
        Some(&line[label.len()..])
    } else {
        None
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(';')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Requested sections whose title does not yet appear in `content`.
///
/// Case-insensitive substring presence; approximate by nature.
pub fn remaining_sections(sections: &[String], content: &str) -> Vec<String> {
    let haystack = content.to_lowercase();
    sections
        .iter()
        .filter(|s| !haystack.contains(&s.trim().to_lowercase()))
        .cloned()
        .collect()
}

/// One long-form unit to write
#[derive(Debug, Clone)]
pub struct LongFormRequest {
    pub unit_id: String,
    pub title: String,
    pub sections: Vec<String>,
    /// Role/system instructions; marker rules are appended
    pub instructions: String,
    /// Full brief for the first draft
    pub brief: String,
}

/// Result of a finished continuation loop
#[derive(Debug, Clone, PartialEq)]
pub struct LongFormOutcome {
    pub content: String,
    /// Continuation calls made after the draft
    pub rounds: u32,
    /// Hit `max_rounds` without a completion signal
    pub possibly_incomplete: bool,
    /// Transport retries across every call of this unit
    pub retries: u32,
}

/// Drive one unit through Drafting, Continuing and Complete.
///
/// Rounds are strictly sequential. After `max_rounds` continuation calls the
/// unit is force-completed and flagged `possibly_incomplete`.
pub async fn write_long_form(
    executor: &ResilientExecutor,
    request: &LongFormRequest,
    settings: &ContinuationSettings,
) -> Result<LongFormOutcome, PipelineError> {
    let instructions = format!("{}\n\n{}", request.instructions, marker_instructions());

    let draft = executor
        .complete_text(&format!("draft:{}", request.unit_id), &instructions, &request.brief)
        .await?;
    let mut retries = draft.retries;
    let (content, mut marker) = parse_marker(&draft.value);

    let mut state = ContinuationState {
        unit_id: request.unit_id.clone(),
        remaining_sections: remaining_sections(&request.sections, &content),
        accumulated_content: content,
    };
    let mut rounds = 0u32;

    loop {
        let needs_more = match &marker {
            Marker::Complete => false,
            Marker::Incomplete { remaining, .. } => {
                if state.remaining_sections.is_empty() {
                    state.remaining_sections = remaining.clone();
                }
                true
            }
            Marker::Missing => !state.remaining_sections.is_empty(),
        };

        if !needs_more {
            return Ok(LongFormOutcome {
                content: state.accumulated_content,
                rounds,
                possibly_incomplete: false,
                retries,
            });
        }

        if rounds >= settings.max_rounds {
            log_warning!(
                "'{}' force-completed after {} continuation round(s); remaining: {}",
                request.unit_id,
                rounds,
                state.remaining_sections.join(", ")
            );
            tracing::warn!(
                unit = %request.unit_id,
                rounds,
                remaining = ?state.remaining_sections,
                "continuation bound reached"
            );
            return Ok(LongFormOutcome {
                content: state.accumulated_content,
                rounds,
                possibly_incomplete: true,
                retries,
            });
        }

        rounds += 1;
        log_continuation_round!(request.unit_id, rounds, &state.remaining_sections);

        let prompt = continuation_prompt(request, &state, settings.tail_window_chars);
        let next = executor
            .complete_text(
                &format!("continue:{}#{}", request.unit_id, rounds),
                &instructions,
                &prompt,
            )
            .await?;
        retries += next.retries;

        let (more, next_marker) = parse_marker(&next.value);
        if !more.is_empty() {
            if !state.accumulated_content.is_empty() {
                state.accumulated_content.push_str("\n\n");
            }
            state.accumulated_content.push_str(&more);
        }
        log_unit_progress!(
            request.unit_id,
            format!(
                "round {} appended {} chars",
                rounds,
                more.chars().count()
            )
        );

        state.remaining_sections =
            remaining_sections(&request.sections, &state.accumulated_content);
        marker = next_marker;
    }
}

fn continuation_prompt(
    request: &LongFormRequest,
    state: &ContinuationState,
    tail_window_chars: usize,
) -> String {
    let remaining = if state.remaining_sections.is_empty() {
        "- (finish the section in progress)".to_string()
    } else {
        state
            .remaining_sections
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are continuing "{title}". Your previous output ended with:

<previous_output_tail>
{tail}
</previous_output_tail>

Continue exactly where it stops. Do not repeat material that is already written.

Sections still to write:
{remaining}"#,
        title = request.title,
        tail = tail(&state.accumulated_content, tail_window_chars),
        remaining = remaining
    )
}
