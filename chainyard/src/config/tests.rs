use super::*;
use tempfile::TempDir;

#[test]
fn test_validate_name() {
    assert!(validate_name("mychain").is_ok());
    assert!(validate_name("my_chain-1.2").is_ok());
    assert!(matches!(validate_name(""), Err(ChainError::NoChainName)));
    assert!(matches!(validate_name("_hidden"), Err(ChainError::InvalidName(_))));
    assert!(matches!(validate_name("a/b"), Err(ChainError::InvalidName(_))));
    assert!(matches!(validate_name("a b"), Err(ChainError::InvalidName(_))));
}

#[test]
fn test_container_names() {
    assert_eq!(chain_container_name("c"), "chainyard_chain_c");
    assert_eq!(data_container_name("c"), "chainyard_data_c");
    assert_eq!(service_container_name("keys"), "chainyard_service_keys");
}

#[test]
fn test_paths_layout() {
    let paths = Paths::new("/r");
    assert_eq!(paths.chain_definition("c"), PathBuf::from("/r/chains/c.yaml"));
    assert_eq!(paths.service_definition("keys"), PathBuf::from("/r/services/keys.yaml"));
    assert_eq!(paths.chain_source("default"), PathBuf::from("/r/chains/default"));
    assert_eq!(paths.chain_data("c"), PathBuf::from("/r/data/c"));
    assert_eq!(paths.head_file(), PathBuf::from("/r/chains/HEAD"));
}

#[test]
fn test_ensure_dirs() {
    let temp = TempDir::new().unwrap();
    let paths = Paths::new(temp.path());
    paths.ensure_dirs().unwrap();
    assert!(paths.chains_dir().is_dir());
    assert!(paths.services_dir().is_dir());
    assert!(paths.data_dir().is_dir());
}

#[test]
fn test_settings_missing_file_is_default() {
    let temp = TempDir::new().unwrap();
    let settings = Settings::load(&Paths::new(temp.path())).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.pull_timeout(), Duration::from_secs(300));
}

#[test]
fn test_settings_partial_override() {
    let temp = TempDir::new().unwrap();
    let paths = Paths::new(temp.path());
    std::fs::write(
        paths.settings_file(),
        "chain_image: example/chain:1.0\npull_timeout_secs: 5\n",
    )
    .unwrap();

    let settings = Settings::load(&paths).unwrap();
    assert_eq!(settings.chain_image, "example/chain:1.0");
    assert_eq!(settings.pull_timeout(), Duration::from_secs(5));
    assert_eq!(settings.data_image, Settings::default().data_image);
}

#[test]
fn test_container_chain_dir() {
    let settings = Settings {
        container_root: "/home/user/.chainyard/".to_string(),
        ..Default::default()
    };
    assert_eq!(settings.container_chain_dir("c1"), "/home/user/.chainyard/chains/c1");
}
