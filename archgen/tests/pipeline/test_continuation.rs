//! Continuation engine: multi-round long-form output

use std::sync::Arc;

use archgen::config::ContinuationSettings;
use archgen::gateway::{ScriptedGateway, ScriptedReply};
use archgen::pipeline::continuation::{write_long_form, LongFormRequest};

use super::common::*;

const FIRST: &str = "Alpha Orchestration";
const SECOND: &str = "Omega Persistence";

fn request() -> LongFormRequest {
    LongFormRequest {
        unit_id: "ch2".to_string(),
        title: "Runtime Architecture".to_string(),
        sections: vec![FIRST.to_string(), SECOND.to_string()],
        instructions: "You are a technical writer.".to_string(),
        brief: "Write the chapter.".to_string(),
    }
}

fn settings(max_rounds: u32) -> ContinuationSettings {
    ContinuationSettings {
        max_rounds,
        tail_window_chars: 200,
    }
}

#[tokio::test]
async fn test_incomplete_then_complete_accumulates_in_call_order() {
    let gateway = Arc::new(ScriptedGateway::with_replies([
        ScriptedReply::text(format!(
            "## {}\nThe scheduler drives every job.\n\n[[UNIT_INCOMPLETE]]\nCOVERED: {}\nREMAINING: {}",
            FIRST, FIRST, SECOND
        )),
        ScriptedReply::text(format!(
            "## {}\nJobs are written to SQLite.\n\n[[UNIT_COMPLETE]]",
            SECOND
        )),
    ]));

    let outcome = write_long_form(&executor(gateway.clone()), &request(), &settings(5))
        .await
        .unwrap();

    assert_eq!(gateway.call_count(), 2);
    assert_eq!(outcome.rounds, 1);
    assert!(!outcome.possibly_incomplete);

    let first = outcome.content.find("The scheduler drives").unwrap();
    let second = outcome.content.find("written to SQLite").unwrap();
    assert!(first < second);
    assert!(!outcome.content.contains("[[UNIT_"));

    let continuation = &gateway.requests()[1].user_content;
    assert!(continuation.contains("The scheduler drives every job."));
    assert!(continuation.contains(&format!("- {}", SECOND)));
    assert!(!continuation.contains(&format!("- {}", FIRST)));
}

#[tokio::test]
async fn test_missing_marker_never_loops_forever() {
    let gateway = Arc::new(ScriptedGateway::with_responder(|_, _| {
        Ok("More introductory prose without the requested sections.".to_string())
    }));

    let outcome = write_long_form(&executor(gateway.clone()), &request(), &settings(3))
        .await
        .unwrap();

    assert!(outcome.possibly_incomplete);
    assert_eq!(outcome.rounds, 3);
    assert_eq!(gateway.call_count(), 4);
}

#[tokio::test]
async fn test_incomplete_marker_forever_is_force_completed() {
    let gateway = Arc::new(ScriptedGateway::with_responder(|_, _| {
        Ok(format!("## {}\nstill going\n[[UNIT_INCOMPLETE]]\nREMAINING: {}", FIRST, SECOND))
    }));

    let outcome = write_long_form(&executor(gateway.clone()), &request(), &settings(2))
        .await
        .unwrap();

    assert!(outcome.possibly_incomplete);
    assert_eq!(gateway.call_count(), 3);
}

#[tokio::test]
async fn test_unmarked_but_covered_draft_finishes_in_one_call() {
    let gateway = Arc::new(ScriptedGateway::with_replies([ScriptedReply::text(format!(
        "## {}\nbody\n\n## {}\nbody",
        FIRST, SECOND
    ))]));

    let outcome = write_long_form(&executor(gateway.clone()), &request(), &settings(5))
        .await
        .unwrap();

    assert_eq!(gateway.call_count(), 1);
    assert_eq!(outcome.rounds, 0);
    assert!(!outcome.possibly_incomplete);
}

#[tokio::test]
async fn test_transport_failure_mid_unit_propagates() {
    let gateway = Arc::new(ScriptedGateway::with_replies([
        ScriptedReply::text(format!("## {}\n[[UNIT_INCOMPLETE]]", FIRST)),
        ScriptedReply::Permanent("quota exhausted".to_string()),
    ]));

    let err = write_long_form(&executor(gateway.clone()), &request(), &settings(5))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "model_call");
    assert_eq!(gateway.call_count(), 2);
}
