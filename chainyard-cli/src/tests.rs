use super::*;
use tempfile::TempDir;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("chainyard").chain(args.iter().copied())).unwrap()
}

#[test]
fn test_new_builds_provision_request() {
    let cli = parse(&[
        "new",
        "mychain",
        "--chain-id",
        "id1",
        "--option",
        "moniker=n0",
        "--api",
        "-e",
        "A=1",
        "-p",
        "46657:46657",
    ]);
    let Commands::New { provision } = cli.command else {
        panic!("expected new");
    };
    let req = provision.request().unwrap();
    assert_eq!(req.name, "mychain");
    assert_eq!(req.chain_id.as_deref(), Some("id1"));
    assert_eq!(req.config_opts, vec!["moniker=n0".to_string()]);
    assert!(req.run);
    assert_eq!(req.env, vec!["A=1".to_string()]);
    assert_eq!(req.ports, vec!["46657:46657".to_string()]);
}

#[test]
fn test_exec_takes_trailing_command() {
    let cli = parse(&["exec", "mychain", "-i", "--", "ls", "-la"]);
    let Commands::Exec {
        name,
        image,
        interactive,
        wiring,
        args,
    } = cli.command
    else {
        panic!("expected exec");
    };
    let req = exec_request(name, image, interactive, &wiring, args).unwrap();
    assert_eq!(req.args, vec!["ls".to_string(), "-la".to_string()]);
    assert!(req.interactive);
    assert_eq!(req.image, None);
}

#[test]
fn test_env_file_precedes_flags() {
    let temp = TempDir::new().unwrap();
    let env_file = temp.path().join("chain.env");
    std::fs::write(&env_file, "FROM_FILE=1\n").unwrap();

    let cli = parse(&[
        "start",
        "mychain",
        "--env-file",
        env_file.to_str().unwrap(),
        "-e",
        "FROM_FLAG=2",
    ]);
    let Commands::Start { launch, .. } = cli.command else {
        panic!("expected start");
    };
    let req = launch.request("mychain".to_string()).unwrap();
    assert_eq!(req.env, vec!["FROM_FILE=1".to_string(), "FROM_FLAG=2".to_string()]);
}

#[test]
fn test_stop_force_and_timeout() {
    let cli = parse(&["stop", "mychain", "--force", "-t", "3", "--rm"]);
    let Commands::Stop { name, stop, rm, data } = cli.command else {
        panic!("expected stop");
    };
    let req = stop.request(name.unwrap());
    assert!(req.force);
    assert_eq!(req.timeout, Some(3));
    assert!(rm);
    assert!(!data);
}

#[test]
fn test_resolve_name_uses_checked_out_chain() {
    let temp = TempDir::new().unwrap();
    let paths = Paths::new(temp.path());
    let settings = Settings::default();
    let runtime = Arc::new(DockerCli::new(&settings));
    let orchestrator = ChainOrchestrator::new(paths, settings, runtime);

    assert!(matches!(
        resolve_name(&orchestrator, None),
        Err(CliError::NoChainSelected)
    ));
    orchestrator.checkout_chain(Some("mychain")).unwrap();
    assert_eq!(resolve_name(&orchestrator, None).unwrap(), "mychain");
    assert_eq!(resolve_name(&orchestrator, Some("other".into())).unwrap(), "other");
}

#[test]
fn test_error_class_passthrough() {
    let err = CliError::from(chainyard::ChainError::NoChainName);
    assert_eq!(err.class().code(), 404);
    assert!(err.hint().is_some());
    assert_eq!(CliError::NoChainSelected.class(), chainyard::ErrorClass::NotFound);
}

#[test]
fn test_log_filter_prefers_rust_log() {
    assert_eq!(log_filter(false, None).to_string(), "warn");
    assert_eq!(log_filter(true, None).to_string(), "debug");
    assert_eq!(log_filter(false, Some("chainyard=trace")).to_string(), "chainyard=trace");
    assert_eq!(log_filter(true, Some("  ")).to_string(), "debug");
}
