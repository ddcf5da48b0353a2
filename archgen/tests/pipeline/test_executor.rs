//! Retry bounds and error classification of the resilient executor

use std::sync::Arc;

use archgen::error::PipelineError;
use archgen::gateway::{ScriptedGateway, ScriptedReply};
use archgen::workflow_utils::ResponseShape;

use super::common::*;

fn shape() -> ResponseShape {
    ResponseShape::new("probe").require("answer")
}

fn gateway_failing(times: usize) -> Arc<ScriptedGateway> {
    let gateway = ScriptedGateway::new();
    for i in 0..times {
        gateway.push(ScriptedReply::transient(format!("connection reset #{}", i + 1)));
    }
    gateway.push(ScriptedReply::text(r#"{"answer": 42}"#));
    Arc::new(gateway)
}

#[tokio::test]
async fn test_fewer_than_three_failures_succeed_with_exact_retry_count() {
    for k in 0..3 {
        let gateway = gateway_failing(k);
        let outcome = executor(gateway.clone())
            .execute("probe", "sys", "user", &shape())
            .await
            .unwrap();

        assert_eq!(outcome.retries as usize, k);
        assert_eq!(outcome.value["answer"], 42);
        assert_eq!(gateway.call_count(), k + 1);
    }
}

#[tokio::test]
async fn test_three_failures_stop_without_further_attempts() {
    for k in [3, 4] {
        let gateway = gateway_failing(k);
        let err = executor(gateway.clone())
            .execute("probe", "sys", "user", &shape())
            .await
            .unwrap_err();

        match err {
            PipelineError::ModelCall {
                call,
                attempts,
                source,
            } => {
                assert_eq!(call, "probe");
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("#3"));
            }
            other => panic!("expected model call error, got {other}"),
        }
        assert_eq!(gateway.call_count(), 3);
    }
}

#[tokio::test]
async fn test_plain_text_calls_share_the_policy() {
    let gateway = Arc::new(ScriptedGateway::with_replies([
        ScriptedReply::transient("timeout"),
        ScriptedReply::text("## Draft\nbody"),
    ]));

    let outcome = executor(gateway.clone())
        .complete_text("draft:ch1", "sys", "user")
        .await
        .unwrap();

    assert_eq!(outcome.value, "## Draft\nbody");
    assert_eq!(outcome.retries, 1);
}

#[tokio::test]
async fn test_malformed_output_carries_call_and_preview() {
    let gateway = Arc::new(ScriptedGateway::with_replies([ScriptedReply::text(
        "I would rather describe it in prose.",
    )]));

    let err = executor(gateway.clone())
        .execute("integration", "sys", "user", &shape())
        .await
        .unwrap_err();

    match err {
        PipelineError::MalformedOutput {
            call, raw_preview, ..
        } => {
            assert_eq!(call, "integration");
            assert!(raw_preview.contains("prose"));
        }
        other => panic!("expected malformed output, got {other}"),
    }
    assert_eq!(gateway.call_count(), 1);
    assert!(!PipelineError::NoVisionsAvailable.is_retryable());
}
