//! End-to-end phase runs through the orchestrator

use std::sync::Arc;

use archgen::error::PipelineError;
use archgen::gateway::{GatewayError, ScriptedGateway};
use archgen::pipeline::types::{
    GraphRepair, IntegratedArchitecture, Level1Output, Level2Output, UnitKind,
};
use archgen::pipeline::Pipeline;

use super::common::*;

fn pipeline(gateway: Arc<ScriptedGateway>) -> Pipeline {
    Pipeline::new(gateway, fast_config())
}

#[tokio::test]
async fn test_run_all_produces_every_planned_file() {
    let gateway = Arc::new(pipeline_gateway(architecture_json(&tracker_nodes()), None));
    let run = pipeline(gateway.clone()).run_all(&requirements()).await.unwrap();

    let roles: Vec<&str> = run.level1.roles.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(roles.last(), Some(&"Integration Architect"));
    assert!(roles.contains(&"Security Engineer"));
    assert_eq!(run.level1.visions.len(), roles.len() - 1);
    assert!(run.level1.failures.is_empty());

    assert!(run.level2.repair.is_clean());

    let paths: Vec<&str> = run.level3.units.iter().map(|u| u.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["src/models.rs", "src/db.rs", "src/auth.rs", "src/main.rs"]
    );
    for unit in &run.level3.units {
        assert!(unit.complete);
        assert_eq!(unit.kind, UnitKind::File);
        assert!(unit.content.starts_with(&format!("// {}", unit.path)));
    }

    // visions, one integration, then one call per file
    let requests = gateway.requests();
    assert_eq!(requests.len(), roles.len() - 1 + 1 + 4);
    assert!(requests[..roles.len() - 1]
        .iter()
        .all(|r| is_vision_call(&r.system_instructions)));
    assert!(is_integration_call(&requests[roles.len() - 1].system_instructions));
}

#[tokio::test]
async fn test_units_start_only_after_their_dependencies() {
    let gateway = Arc::new(pipeline_gateway(architecture_json(&tracker_nodes()), None));
    let pipeline = pipeline(gateway);
    let level2 = pipeline
        .run_integration(&requirements(), &level1_fixture())
        .await
        .unwrap();

    let observer = RecordingObserver::default();
    pipeline
        .run_generation_observed(&requirements(), &level2, &observer)
        .await
        .unwrap();

    assert_eq!(*observer.scheduled.lock().unwrap(), Some(4));
    for (path, completed) in observer.started() {
        let node = level2
            .architecture
            .dependency_graph
            .iter()
            .find(|n| n.path == path)
            .unwrap();
        for dep in &node.dependencies {
            assert!(
                completed.contains(dep),
                "{} started before {} completed",
                path,
                dep
            );
        }
    }
    assert_eq!(observer.completed().len(), 4);
}

#[tokio::test]
async fn test_dependency_content_reaches_later_prompts() {
    let gateway = Arc::new(pipeline_gateway(architecture_json(&tracker_nodes()), None));
    let pipeline = pipeline(gateway.clone());
    let level2 = pipeline
        .run_integration(&requirements(), &level1_fixture())
        .await
        .unwrap();
    pipeline.run_generation(&requirements(), &level2).await.unwrap();

    let main_prompt = gateway
        .requests()
        .into_iter()
        .find(|r| unit_path(&r.user_content).as_deref() == Some("src/main.rs"))
        .unwrap()
        .user_content;
    assert!(main_prompt.contains("// src/db.rs"));
    assert!(main_prompt.contains("// src/auth.rs"));
    assert!(!main_prompt.contains("// src/models.rs\n"));
}

#[tokio::test]
async fn test_swapped_order_hint_is_repaired_by_integration() {
    let gateway = Arc::new(pipeline_gateway(architecture_json(&abc_nodes_swapped()), None));
    let pipeline = pipeline(gateway.clone());

    let level2 = pipeline
        .run_integration(&requirements(), &level1_fixture())
        .await
        .unwrap();
    assert!(level2.repair.reordered);

    let level3 = pipeline.run_generation(&requirements(), &level2).await.unwrap();
    let order: Vec<&str> = level3.units.iter().map(|u| u.path.as_str()).collect();
    assert_eq!(order, vec!["a.rs", "b.rs", "c.rs"]);
}

#[tokio::test]
async fn test_failed_unit_keeps_completed_units() {
    let gateway = Arc::new(pipeline_gateway(
        architecture_json(&tracker_nodes()),
        Some("src/auth.rs"),
    ));
    let pipeline = pipeline(gateway.clone());
    let level2 = pipeline
        .run_integration(&requirements(), &level1_fixture())
        .await
        .unwrap();

    let err = pipeline
        .run_generation(&requirements(), &level2)
        .await
        .unwrap_err();

    match &err {
        PipelineError::UnitGenerationFailed {
            unit,
            phase,
            completed,
            source,
        } => {
            assert_eq!(unit, "src/auth.rs");
            assert_eq!(*phase, 3);
            let done: Vec<&str> = completed.iter().map(|u| u.path.as_str()).collect();
            assert_eq!(done, vec!["src/models.rs", "src/db.rs"]);
            assert_eq!(source.code(), "model_call");
        }
        other => panic!("expected unit failure, got {other}"),
    }

    // src/main.rs was never requested
    assert!(!gateway
        .requests()
        .iter()
        .any(|r| unit_path(&r.user_content).as_deref() == Some("src/main.rs")));
}

#[tokio::test]
async fn test_failed_specialist_is_isolated() {
    let architecture = architecture_json(&tracker_nodes());
    let gateway = Arc::new(ScriptedGateway::with_responder(move |system, _| {
        if system.starts_with("You are a Security Engineer") {
            return Err(GatewayError::config("role unavailable"));
        }
        if is_vision_call(system) {
            return Ok(vision_response(&role_from_system(system).unwrap_or_default()));
        }
        Ok(architecture.clone())
    }));
    let pipeline = pipeline(gateway);

    let level1 = pipeline.run_visions(&requirements()).await.unwrap();
    assert_eq!(level1.failures.len(), 1);
    assert_eq!(level1.failures[0].role, "Security Engineer");
    assert_eq!(level1.visions.len(), 3);

    let level2 = pipeline.run_integration(&requirements(), &level1).await.unwrap();
    assert_eq!(level2.architecture.dependency_graph.len(), 4);
}

#[tokio::test]
async fn test_concurrent_visions_keep_role_order() {
    let gateway = Arc::new(pipeline_gateway(architecture_json(&tracker_nodes()), None));
    let mut config = fast_config();
    config.vision_concurrency = 4;
    let pipeline = Pipeline::new(gateway, config);

    let level1 = pipeline.run_visions(&requirements()).await.unwrap();
    let specialists: Vec<&str> = level1
        .roles
        .iter()
        .filter(|r| !r.integrator)
        .map(|r| r.name.as_str())
        .collect();
    let visions: Vec<&str> = level1.visions.iter().map(|v| v.role.as_str()).collect();
    assert_eq!(visions, specialists);
}

#[tokio::test]
async fn test_preconditions_fail_before_any_call() {
    let gateway = Arc::new(pipeline_gateway(architecture_json(&tracker_nodes()), None));
    let pipeline = pipeline(gateway.clone());

    let empty = Level1Output {
        visions: vec![],
        ..level1_fixture()
    };
    assert!(matches!(
        pipeline.run_integration(&requirements(), &empty).await,
        Err(PipelineError::NoVisionsAvailable)
    ));

    let no_reqs = archgen::pipeline::RequirementSet::new(Vec::<String>::new());
    assert!(matches!(
        pipeline.run_visions(&no_reqs).await,
        Err(PipelineError::MissingPrecondition(_))
    ));

    assert_eq!(gateway.call_count(), 0);
}

#[tokio::test]
async fn test_repeated_graph_path_is_rejected_before_any_call() {
    // a.rs listed twice, as a hand-edited level2 file might have it
    let raw = architecture_json(&[spec("a.rs", &[], 1), spec("b.rs", &["a.rs"], 2)]);
    let mut architecture: IntegratedArchitecture = serde_json::from_str(&raw).unwrap();
    let mut repeated = architecture.dependency_graph[0].clone();
    repeated.implementation_order = 3;
    architecture.dependency_graph.push(repeated);
    let level2 = Level2Output {
        architecture,
        repair: GraphRepair::default(),
    };

    let gateway = Arc::new(ScriptedGateway::with_responder(|_, _| {
        Ok(r#"{"content": "x"}"#.to_string())
    }));
    let pipeline = pipeline(gateway.clone());

    let err = pipeline
        .run_generation(&requirements(), &level2)
        .await
        .unwrap_err();
    match err {
        PipelineError::InconsistentDependencyGraph { node, .. } => assert_eq!(node, "a.rs"),
        other => panic!("expected duplicate path error, got {other}"),
    }
    assert_eq!(gateway.call_count(), 0);
}
