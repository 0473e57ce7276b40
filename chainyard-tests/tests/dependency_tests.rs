//! Dependency booting before chain containers start.

use chainyard::{ChainError, ErrorClass, RuntimeRequest};
use chainyard_tests::{FakeOp, TestYard};

fn chain_yaml(services: &[&str], chains: &[&str]) -> String {
    format!(
        "name: mychain\nservice:\n  image: chainyard/chain:latest\n  auto_data: true\ndependencies:\n  services: [{}]\n  chains: [{}]\n",
        services.join(", "),
        chains.join(", ")
    )
}

#[tokio::test]
async fn test_services_started_in_declared_order() {
    let yard = TestYard::new().unwrap();
    yard.write_service("logger", "chainyard/logger").unwrap();
    yard.write_chain_definition("mychain", &chain_yaml(&["keys", "logger"], &[]))
        .unwrap();

    yard.orchestrator
        .start_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();

    let started: Vec<String> = yard
        .runtime
        .calls_of(FakeOp::RunService)
        .into_iter()
        .map(|c| c.target)
        .collect();
    assert_eq!(
        started,
        vec![
            "chainyard_service_keys",
            "chainyard_service_logger",
            "chainyard_chain_mychain"
        ]
    );
}

#[tokio::test]
async fn test_running_service_is_not_restarted() {
    let yard = TestYard::new().unwrap();
    yard.runtime.insert_container("chainyard_service_keys", true);
    yard.write_chain_definition("mychain", &chain_yaml(&["keys"], &[]))
        .unwrap();

    yard.orchestrator
        .start_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();
    let runs = yard.runtime.calls_of(FakeOp::RunService);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].target, "chainyard_chain_mychain");
}

#[tokio::test]
async fn test_service_failure_aborts_remaining() {
    let yard = TestYard::new().unwrap();
    yard.write_service("logger", "chainyard/logger").unwrap();
    yard.write_chain_definition("mychain", &chain_yaml(&["keys", "logger"], &[]))
        .unwrap();
    yard.runtime
        .fail_target(FakeOp::RunService, "chainyard_service_keys");

    let err = yard
        .orchestrator
        .start_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap_err();

    match &err {
        ChainError::DependencyStart { chain, dependency, .. } => {
            assert_eq!(chain, "mychain");
            assert_eq!(dependency, "keys");
        }
        other => panic!("expected dependency error, got {}", other),
    }
    assert_eq!(err.class(), ErrorClass::Dependency);
    assert!(!yard.runtime.has_container("chainyard_service_logger"));
    assert!(!yard.runtime.has_container("chainyard_chain_mychain"));
}

#[tokio::test]
async fn test_undefined_service_is_dependency_error() {
    let yard = TestYard::new().unwrap();
    yard.write_chain_definition("mychain", &chain_yaml(&["nosuch"], &[]))
        .unwrap();

    let err = yard
        .orchestrator
        .start_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::DependencyStart { .. }));
    assert!(matches!(err.root_cause(), ChainError::DefinitionNotFound { .. }));
    assert!(err.hint().is_some());
}

#[tokio::test]
async fn test_chain_dependency_must_be_running() {
    let yard = TestYard::new().unwrap();
    yard.write_chain_definition("other", "name: other\nservice:\n  image: chainyard/chain\n")
        .unwrap();
    yard.write_chain_definition("mychain", &chain_yaml(&[], &["other"]))
        .unwrap();

    let err = yard
        .orchestrator
        .start_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap_err();
    match &err {
        ChainError::MissingChainDependency { chain, dependency } => {
            assert_eq!(chain, "mychain");
            assert_eq!(dependency, "other");
        }
        other => panic!("expected missing chain dependency, got {}", other),
    }
    assert!(err.to_string().contains("mychain"));
    assert!(err.to_string().contains("other"));
    // Chains are never started on behalf of another chain.
    assert!(!yard.runtime.has_container("chainyard_chain_other"));

    yard.runtime.insert_container("chainyard_chain_other", true);
    yard.orchestrator
        .start_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_logrotate_added_once() {
    let yard = TestYard::new().unwrap();
    yard.write_service("logrotate", "chainyard/logrotate").unwrap();
    yard.write_chain_definition("mychain", &chain_yaml(&["logrotate"], &[]))
        .unwrap();

    let req = RuntimeRequest {
        logrotate: true,
        ..RuntimeRequest::named("mychain")
    };
    yard.orchestrator.start_chain(&req).await.unwrap();

    let logrotate_runs = yard
        .runtime
        .calls_of(FakeOp::RunService)
        .into_iter()
        .filter(|c| c.target == "chainyard_service_logrotate")
        .count();
    assert_eq!(logrotate_runs, 1);
}

#[tokio::test]
async fn test_request_unchanged_after_boot() {
    let yard = TestYard::new().unwrap();
    yard.write_service("logrotate", "chainyard/logrotate").unwrap();
    yard.write_chain_definition("mychain", &chain_yaml(&["keys"], &[]))
        .unwrap();

    let req = RuntimeRequest {
        logrotate: true,
        env: vec!["A=1".to_string()],
        links: vec!["x:y".to_string()],
        ..RuntimeRequest::named("mychain")
    };
    let before = req.clone();
    yard.orchestrator.start_chain(&req).await.unwrap();
    assert_eq!(req, before);

    let exec = RuntimeRequest::exec("mychain", vec!["true".to_string()]);
    let before = exec.clone();
    yard.orchestrator.exec_chain(&exec).await.unwrap();
    assert_eq!(exec, before);
}
