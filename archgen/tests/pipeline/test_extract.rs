//! Structured payload recovery from noisy model responses

use archgen::pipeline::types::IntegratedArchitecture;
use archgen::workflow_utils::{extract_json, ExtractError};
use serde_json::Value;

use super::common::*;

fn payload() -> Value {
    serde_json::from_str(&architecture_json(&tracker_nodes())).unwrap()
}

#[test]
fn test_payload_survives_any_wrapping() {
    let compact = payload().to_string();
    let pretty = serde_json::to_string_pretty(&payload()).unwrap();

    let wrappings = [
        compact.clone(),
        format!("```json\n{}\n```", pretty),
        format!("Sure! Here is the architecture:\n\n```json\n{}\n```\n\nHope this helps.", pretty),
        format!("```\n{}\n```", compact),
        format!("The result {} is final.", compact),
        format!("Notes: see {{below}}.\n{}", pretty),
    ];

    for raw in wrappings {
        assert_eq!(extract_json(&raw).unwrap(), payload(), "failed on: {}", raw);
    }
}

#[test]
fn test_extracted_payload_deserializes() {
    let raw = format!("```json\n{}\n```", architecture_json(&tracker_nodes()));
    let value = extract_json(&raw).unwrap();
    let arch: IntegratedArchitecture = serde_json::from_value(value).unwrap();
    assert_eq!(arch.dependency_graph.len(), 4);
    assert_eq!(arch.root_folder.name, "tracker");
}

#[test]
fn test_raw_newlines_in_long_text_fields() {
    let raw = "{\"content\": \"fn main() {\n    println!(\\\"hi\\\");\n}\", \"language\": \"rust\"}";
    let value = extract_json(raw).unwrap();
    assert_eq!(value["content"], "fn main() {\n    println!(\"hi\");\n}");
    assert_eq!(value["language"], "rust");
}

#[test]
fn test_truncated_payload_is_reported() {
    let raw = r#"Here you go: {"integratedVision": "cut off"#;
    assert!(matches!(
        extract_json(raw),
        Err(ExtractError::NoPayloadFound) | Err(ExtractError::InvalidJson(_))
    ));
    assert_eq!(extract_json("no json at all"), Err(ExtractError::NoPayloadFound));
}
