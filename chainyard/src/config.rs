//! Host layout and orchestrator settings.
//!
//! Everything lives under a single root directory (`~/.chainyard` unless
//! `CHAINYARD_ROOT` is set):
//!
//! ```text
//! <root>/settings.yaml        optional overrides for `Settings`
//! <root>/chains/<name>.yaml   chain definitions
//! <root>/chains/<name>/       chain source templates (genesis, config, keys)
//! <root>/chains/HEAD          currently checked-out chain
//! <root>/services/<name>.yaml service definitions
//! <root>/data/<name>/         host-side staging for a chain's data volume
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use crate::errors::{ChainError, Result};

const ROOT_DIR: &str = ".chainyard";
const ROOT_ENV: &str = "CHAINYARD_ROOT";
const SETTINGS_FILE: &str = "settings.yaml";

/// Prefix shared by every container this crate creates.
pub const CONTAINER_PREFIX: &str = "chainyard";

/// Name of the chain whose definition and template are shared.
pub const DEFAULT_CHAIN: &str = "default";

/// Service appended to a chain's dependencies when log rotation is requested.
pub const LOGROTATE_SERVICE: &str = "logrotate";

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("static regex is valid")
});

/// Check that `name` is usable as a container and file name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ChainError::NoChainName);
    }
    if !NAME_REGEX.is_match(name) {
        return Err(ChainError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn chain_container_name(name: &str) -> String {
    format!("{}_chain_{}", CONTAINER_PREFIX, name)
}

pub fn data_container_name(name: &str) -> String {
    format!("{}_data_{}", CONTAINER_PREFIX, name)
}

pub fn service_container_name(name: &str) -> String {
    format!("{}_service_{}", CONTAINER_PREFIX, name)
}

/// Host directory layout.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the root from `CHAINYARD_ROOT`, falling back to the home directory.
    pub fn from_env() -> Result<Self> {
        if let Ok(root) = std::env::var(ROOT_ENV)
            && !root.is_empty()
        {
            return Ok(Self::new(root));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| ChainError::Internal("could not determine home directory".into()))?;
        Ok(Self::new(home.join(ROOT_DIR)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chains_dir(&self) -> PathBuf {
        self.root.join("chains")
    }

    pub fn services_dir(&self) -> PathBuf {
        self.root.join("services")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn chain_definition(&self, name: &str) -> PathBuf {
        self.chains_dir().join(format!("{}.yaml", name))
    }

    pub fn service_definition(&self, name: &str) -> PathBuf {
        self.services_dir().join(format!("{}.yaml", name))
    }

    pub fn chain_source(&self, name: &str) -> PathBuf {
        self.chains_dir().join(name)
    }

    pub fn chain_data(&self, name: &str) -> PathBuf {
        self.data_dir().join(name)
    }

    pub fn head_file(&self) -> PathBuf {
        self.chains_dir().join("HEAD")
    }

    /// Create the chains, services and data directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.chains_dir(), self.services_dir(), self.data_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| ChainError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// Tunables for images, in-container paths and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chain_image: String,
    pub data_image: String,
    pub default_registry: String,
    pub backup_registry: String,
    /// Root of the chain's files inside the container and its data volume.
    pub container_root: String,
    /// User that owns `container_root` after provisioning.
    pub container_user: String,
    pub chain_start_command: String,
    /// Command prefix used to import the validator key; the key path is appended.
    pub key_import_command: Vec<String>,
    pub stop_timeout_secs: u32,
    pub pull_timeout_secs: u64,
    pub default_images: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chain_image: "chainyard/chain:latest".to_string(),
            data_image: "chainyard/data:latest".to_string(),
            default_registry: "quay.io".to_string(),
            backup_registry: String::new(),
            container_root: "/home/chainyard/.chainyard".to_string(),
            container_user: "chainyard".to_string(),
            chain_start_command: "start".to_string(),
            key_import_command: vec!["mintkey".to_string(), "chainyard".to_string()],
            stop_timeout_secs: 10,
            pull_timeout_secs: 300,
            default_images: vec![
                "chainyard/data:latest".to_string(),
                "chainyard/keys:latest".to_string(),
                "chainyard/chain:latest".to_string(),
            ],
        }
    }
}

impl Settings {
    /// Load settings from `settings.yaml` under the root; a missing file means defaults.
    pub fn load(paths: &Paths) -> Result<Self> {
        let path = paths.settings_file();
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ChainError::io(&path, e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ChainError::Internal(format!("Failed to parse '{}': {}", path.display(), e)))
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    /// In-container directory holding the files of chain `chain_id`.
    pub fn container_chain_dir(&self, chain_id: &str) -> String {
        format!("{}/chains/{}", self.container_root.trim_end_matches('/'), chain_id)
    }
}

#[cfg(test)]
mod tests;
