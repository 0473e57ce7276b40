//! Isolated host layout wired to a [`FakeRuntime`]

use chainyard::config::{Paths, Settings};
use chainyard::orchestrator::ChainOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use super::fake_runtime::FakeRuntime;

/// Files of the `default` chain template.
pub const TEMPLATE_FILES: [(&str, &str); 3] = [
    ("genesis.json", "{\"chain_id\":\"default\"}"),
    ("config.toml", "moniker = \"default\"\n"),
    ("priv_validator.json", "{\"address\":\"00\"}"),
];

/// A temporary chainyard root with a fake runtime and an orchestrator over both.
pub struct TestYard {
    pub temp_dir: TempDir,
    pub paths: Paths,
    pub runtime: Arc<FakeRuntime>,
    pub orchestrator: ChainOrchestrator,
}

impl TestYard {
    /// Layout with the default template and the `keys` service.
    pub fn new() -> std::io::Result<Self> {
        let yard = Self::bare()?;
        yard.write_default_template()?;
        yard.write_service("keys", "chainyard/keys:latest")?;
        Ok(yard)
    }

    /// Empty layout: no template, no service definitions.
    pub fn bare() -> std::io::Result<Self> {
        Self::with_settings(Settings {
            pull_timeout_secs: 1,
            stop_timeout_secs: 7,
            ..Default::default()
        })
    }

    pub fn with_settings(settings: Settings) -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let paths = Paths::new(temp_dir.path());
        paths
            .ensure_dirs()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let runtime = Arc::new(FakeRuntime::new());
        let orchestrator = ChainOrchestrator::new(paths.clone(), settings, runtime.clone());
        Ok(Self {
            temp_dir,
            paths,
            runtime,
            orchestrator,
        })
    }

    pub fn write_default_template(&self) -> std::io::Result<()> {
        let dir = self.paths.chain_source("default");
        std::fs::create_dir_all(&dir)?;
        for (file, content) in TEMPLATE_FILES {
            std::fs::write(dir.join(file), content)?;
        }
        Ok(())
    }

    pub fn write_service(&self, name: &str, image: &str) -> std::io::Result<()> {
        let yaml = format!("name: {}\nservice:\n  image: {}\n", name, image);
        std::fs::write(self.paths.service_definition(name), yaml)
    }

    pub fn write_chain_definition(&self, name: &str, yaml: &str) -> std::io::Result<()> {
        std::fs::write(self.paths.chain_definition(name), yaml)
    }

    /// A directory with chain files outside the chainyard root.
    pub fn external_source(&self, files: &[(&str, &str)]) -> std::io::Result<PathBuf> {
        let dir = self.temp_dir.path().join("external");
        std::fs::create_dir_all(&dir)?;
        for (file, content) in files {
            std::fs::write(dir.join(file), content)?;
        }
        Ok(dir)
    }

    pub fn settings(&self) -> &Settings {
        self.orchestrator.settings()
    }
}
