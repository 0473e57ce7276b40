//! Provisioning pipeline: source resolution, staging, definition persistence
//! and the in-container setup steps after the chain container runs.

use chainyard::errors::ProvisionStep;
use chainyard::{ChainError, ErrorClass, RuntimeRequest};
use chainyard_tests::helpers::yard::TEMPLATE_FILES;
use chainyard_tests::{FakeOp, TestYard};

#[tokio::test]
async fn test_new_chain_from_default_template() {
    let yard = TestYard::new().unwrap();
    yard.orchestrator
        .new_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();

    let chain = yard.runtime.container("chainyard_chain_mychain").unwrap();
    assert!(chain.running);
    let service = chain.service.unwrap();
    assert_eq!(service.command.as_deref(), Some("new"));
    assert!(service.environment.contains(&"CHAIN_ID=mychain".to_string()));

    let data = yard.runtime.container("chainyard_data_mychain").unwrap();
    assert!(data.is_data);
    let mut expected: Vec<String> = TEMPLATE_FILES.iter().map(|(f, _)| f.to_string()).collect();
    expected.sort();
    assert_eq!(data.files, expected);

    // keys is a declared dependency of every generated chain
    assert!(yard.runtime.container("chainyard_service_keys").unwrap().running);
    assert!(yard.orchestrator.store().chain_definition_exists("mychain"));
}

#[tokio::test]
async fn test_data_volume_created_before_container() {
    let yard = TestYard::new().unwrap();
    yard.orchestrator
        .new_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();

    let calls = yard.runtime.calls();
    let create = calls.iter().position(|c| c.op == FakeOp::CreateData).unwrap();
    let run = calls
        .iter()
        .position(|c| c.op == FakeOp::RunService && c.target == "chainyard_chain_mychain")
        .unwrap();
    assert!(create < run);

    let mkdir = &yard.runtime.calls_of(FakeOp::ExecData)[0];
    assert_eq!(
        mkdir.args,
        vec!["mkdir", "-p", "/home/chainyard/.chainyard/chains/mychain"]
    );
}

#[tokio::test]
async fn test_existing_data_volume_is_reused() {
    let yard = TestYard::new().unwrap();
    yard.runtime.insert_container("chainyard_data_mychain", false);

    yard.orchestrator
        .new_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();
    assert!(yard.runtime.calls_of(FakeOp::CreateData).is_empty());
}

#[tokio::test]
async fn test_missing_source_fails_before_any_volume() {
    let yard = TestYard::bare().unwrap();
    let err = yard
        .orchestrator
        .new_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::SourceNotFound(_)));
    assert_eq!(err.class(), ErrorClass::NotFound);
    assert_eq!(yard.runtime.data_container_count(), 0);
    assert!(yard.runtime.calls_of(FakeOp::CreateData).is_empty());
}

#[tokio::test]
async fn test_path_is_looked_up_under_chains_dir() {
    let yard = TestYard::new().unwrap();
    let template = yard.paths.chain_source("mytemplate");
    std::fs::create_dir_all(&template).unwrap();
    std::fs::write(template.join("genesis.json"), "{}").unwrap();

    let req = RuntimeRequest {
        path: Some("mytemplate".into()),
        ..RuntimeRequest::named("mychain")
    };
    yard.orchestrator.new_chain(&req).await.unwrap();
    let data = yard.runtime.container("chainyard_data_mychain").unwrap();
    assert_eq!(data.files, vec!["genesis.json".to_string()]);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let yard = TestYard::new().unwrap();
    let req = RuntimeRequest {
        path: Some("no-such-template".into()),
        ..RuntimeRequest::named("mychain")
    };
    let err = yard.orchestrator.new_chain(&req).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
    assert_eq!(yard.runtime.data_container_count(), 0);
}

#[tokio::test]
async fn test_explicit_files_are_staged_under_fixed_names() {
    let yard = TestYard::new().unwrap();
    let src = yard
        .external_source(&[("my-genesis.json", "{}"), ("node.toml", "x = 1")])
        .unwrap();

    let req = RuntimeRequest {
        genesis: Some(src.join("my-genesis.json")),
        config_file: Some(src.join("node.toml")),
        ..RuntimeRequest::named("mychain")
    };
    yard.orchestrator.new_chain(&req).await.unwrap();

    // Explicit files replace the default template entirely.
    let data = yard.runtime.container("chainyard_data_mychain").unwrap();
    assert_eq!(data.files, vec!["config.toml".to_string(), "genesis.json".to_string()]);
}

#[tokio::test]
async fn test_invalid_name_rejected_before_any_work() {
    let yard = TestYard::new().unwrap();
    let err = yard
        .orchestrator
        .new_chain(&RuntimeRequest::named("bad/name"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::InvalidName(_)));
    assert!(yard.runtime.calls().is_empty());

    let err = yard
        .orchestrator
        .new_chain(&RuntimeRequest::named(""))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::NoChainName));
}

#[tokio::test]
async fn test_hand_written_definition_wins() {
    let yard = TestYard::new().unwrap();
    yard.write_chain_definition(
        "mychain",
        "name: mychain\nchain_id: custom-id\nservice:\n  image: custom/chain:1\n",
    )
    .unwrap();

    yard.orchestrator
        .new_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();

    let def = yard.orchestrator.store().load_chain("mychain").unwrap();
    assert_eq!(def.chain_id, "custom-id");
    assert_eq!(def.service.image, "custom/chain:1");

    let service = yard
        .runtime
        .container("chainyard_chain_mychain")
        .unwrap()
        .service
        .unwrap();
    assert_eq!(service.image, "custom/chain:1");
    assert!(service.environment.contains(&"CHAIN_ID=custom-id".to_string()));

    // Files land where CHAIN_ID points the node.
    let chain_dir = "/home/chainyard/.chainyard/chains/custom-id";
    let mkdir = yard.runtime.calls_of(FakeOp::ExecData).pop().unwrap();
    assert_eq!(mkdir.args.last().map(String::as_str), Some(chain_dir));
    let import = yard.runtime.calls_of(FakeOp::ImportData).pop().unwrap();
    assert_eq!(import.args[1], chain_dir);
    let key_import = yard
        .runtime
        .calls_of(FakeOp::ExecService)
        .into_iter()
        .find(|c| c.args.last().is_some_and(|a| a.ends_with("priv_validator.json")))
        .unwrap();
    assert_eq!(
        key_import.args.last().map(String::as_str),
        Some("/home/chainyard/.chainyard/chains/custom-id/priv_validator.json")
    );
}

#[tokio::test]
async fn test_chain_id_fixed_at_first_provisioning() {
    let yard = TestYard::new().unwrap();
    let req = RuntimeRequest {
        chain_id: Some("first".to_string()),
        ..RuntimeRequest::named("mychain")
    };
    yard.orchestrator.new_chain(&req).await.unwrap();

    let again = RuntimeRequest {
        chain_id: Some("second".to_string()),
        ..RuntimeRequest::named("mychain")
    };
    yard.orchestrator.install_chain(&again).await.unwrap();
    assert_eq!(yard.orchestrator.store().load_chain("mychain").unwrap().chain_id, "first");
}

#[tokio::test]
async fn test_new_chain_discards_old_host_data() {
    let yard = TestYard::new().unwrap();
    let stale = yard.paths.chain_data("mychain").join("stale.txt");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "old").unwrap();

    yard.orchestrator
        .new_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();
    assert!(!stale.exists());
    assert!(!yard.runtime.container("chainyard_data_mychain").unwrap().files.contains(&"stale.txt".to_string()));
}

#[tokio::test]
async fn test_install_uses_install_command() {
    let yard = TestYard::new().unwrap();
    yard.orchestrator
        .install_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();
    let service = yard
        .runtime
        .container("chainyard_chain_mychain")
        .unwrap()
        .service
        .unwrap();
    assert_eq!(service.command.as_deref(), Some("install"));
}

#[tokio::test]
async fn test_post_start_setup_execs() {
    let yard = TestYard::new().unwrap();
    yard.orchestrator
        .new_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap();

    let execs = yard.runtime.calls_of(FakeOp::ExecService);
    assert_eq!(execs.len(), 2);
    assert_eq!(
        execs[0].args,
        vec![
            "mintkey",
            "chainyard",
            "/home/chainyard/.chainyard/chains/mychain/priv_validator.json"
        ]
    );
    assert_eq!(
        execs[1].args,
        vec!["chown", "--recursive", "chainyard", "/home/chainyard/.chainyard"]
    );
}

#[tokio::test]
async fn test_key_import_failure_is_not_rolled_back() {
    let yard = TestYard::new().unwrap();
    yard.runtime.fail_target(FakeOp::ExecService, "mintkey");

    let err = yard
        .orchestrator
        .new_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ChainError::ExecDuringSetup {
            step: ProvisionStep::ImportKeys,
            ..
        }
    ));
    assert_eq!(err.class(), ErrorClass::Exec);
    assert!(yard.runtime.container("chainyard_chain_mychain").unwrap().running);
    assert!(yard.runtime.has_container("chainyard_data_mychain"));
    assert!(yard.runtime.calls_of(FakeOp::Remove).is_empty());
    // Ownership fix is never attempted after a failed key import.
    assert_eq!(yard.runtime.calls_of(FakeOp::ExecService).len(), 1);
}

#[tokio::test]
async fn test_chown_failure_is_not_rolled_back() {
    let yard = TestYard::new().unwrap();
    yard.runtime.fail_target(FakeOp::ExecService, "chown");

    let err = yard
        .orchestrator
        .new_chain(&RuntimeRequest::named("mychain"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ChainError::ExecDuringSetup {
            step: ProvisionStep::FixOwnership,
            ..
        }
    ));
    assert!(yard.runtime.has_container("chainyard_chain_mychain"));
    assert!(yard.runtime.calls_of(FakeOp::Remove).is_empty());
}
