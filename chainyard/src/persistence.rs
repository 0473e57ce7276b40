//! File-backed definition store.
//!
//! Chain definitions are written once, at first provisioning, and never
//! overwritten by the orchestrator afterwards; a hand-edited definition always
//! wins over a freshly generated draft. Service definitions are only read.

use chrono::Utc;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::config::{Paths, Settings, chain_container_name, data_container_name};
use crate::definitions::{
    ChainDefinition, DependencySpec, Maintainer, OperationsSpec, ServiceDefinition, ServiceSpec,
};
use crate::errors::{ChainError, DefinitionKind, Result};

/// Ports exposed by a freshly generated chain definition (p2p, rpc, api).
const DEFAULT_CHAIN_PORTS: [&str; 3] = ["46656", "46657", "1337"];

/// Service every generated chain depends on for key management.
const KEYS_SERVICE: &str = "keys";

/// Loads and persists chain and service definitions under a [`Paths`] root.
#[derive(Debug, Clone)]
pub struct DefinitionStore {
    paths: Paths,
    settings: Settings,
}

impl DefinitionStore {
    pub fn new(paths: Paths, settings: Settings) -> Self {
        Self { paths, settings }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    // =========================================================================
    // Loading
    // =========================================================================

    pub fn load_chain(&self, name: &str) -> Result<ChainDefinition> {
        let path = self.paths.chain_definition(name);
        let mut def: ChainDefinition = read_definition(&path, DefinitionKind::Chain, name)?;
        def.normalize();
        debug!("Loaded chain definition {:?} (image {})", path, def.service.image);
        Ok(def)
    }

    pub fn load_service(&self, name: &str) -> Result<ServiceDefinition> {
        let path = self.paths.service_definition(name);
        let mut def: ServiceDefinition = read_definition(&path, DefinitionKind::Service, name)?;
        if def.name.is_empty() {
            def.name = name.to_string();
        }
        def.normalize();
        debug!("Loaded service definition {:?}", path);
        Ok(def)
    }

    pub fn chain_definition_exists(&self, name: &str) -> bool {
        self.paths.chain_definition(name).exists()
    }

    /// Raw contents of a chain definition file.
    pub fn read_chain_definition(&self, name: &str) -> Result<String> {
        let path = self.paths.chain_definition(name);
        if !path.exists() {
            return Err(ChainError::DefinitionNotFound {
                kind: DefinitionKind::Chain,
                name: name.to_string(),
                path,
            });
        }
        std::fs::read_to_string(&path).map_err(|e| ChainError::io(&path, e))
    }

    // =========================================================================
    // Drafts and writing
    // =========================================================================

    /// Build a draft definition for a chain that has never been provisioned.
    pub fn mock_chain(&self, name: &str, chain_id: &str) -> ChainDefinition {
        let chain_id = if chain_id.is_empty() { name } else { chain_id };
        ChainDefinition {
            name: name.to_string(),
            chain_id: chain_id.to_string(),
            kind: Default::default(),
            service: ServiceSpec {
                name: name.to_string(),
                image: self.settings.chain_image.clone(),
                ports: DEFAULT_CHAIN_PORTS.iter().map(|p| p.to_string()).collect(),
                auto_data: true,
                ..Default::default()
            },
            operations: OperationsSpec {
                srv_container_name: chain_container_name(name),
                data_container_name: data_container_name(name),
                ..Default::default()
            },
            dependencies: Some(DependencySpec {
                services: vec![KEYS_SERVICE.to_string()],
                chains: Vec::new(),
            }),
            maintainer: Maintainer {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    /// Write `def` unless a definition file for its name already exists.
    ///
    /// Returns whether the file was written.
    pub fn persist_chain_if_absent(&self, def: &ChainDefinition) -> Result<bool> {
        let path = self.paths.chain_definition(&def.name);
        let content = serde_yaml::to_string(def).map_err(|e| ChainError::DefinitionWrite {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let written = write_new_file(&path, content.as_bytes())?;
        if written {
            debug!("Wrote chain definition {:?}", path);
        } else {
            debug!("Chain definition {:?} already exists, keeping it", path);
        }
        Ok(written)
    }

    /// Delete a chain definition file; a missing file is not an error.
    pub fn remove_chain_definition(&self, name: &str) -> Result<()> {
        let path = self.paths.chain_definition(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChainError::io(&path, e)),
        }
    }

    // =========================================================================
    // HEAD (checked-out chain)
    // =========================================================================

    pub fn read_head(&self) -> Result<Option<String>> {
        let path = self.paths.head_file();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ChainError::io(&path, e))?;
        let head = content.trim();
        Ok((!head.is_empty()).then(|| head.to_string()))
    }

    pub fn write_head(&self, name: Option<&str>) -> Result<()> {
        let path = self.paths.head_file();
        let dir = self.paths.chains_dir();
        std::fs::create_dir_all(&dir).map_err(|e| ChainError::io(&dir, e))?;
        std::fs::write(&path, name.unwrap_or_default()).map_err(|e| ChainError::io(&path, e))
    }
}

fn read_definition<T: DeserializeOwned>(path: &Path, kind: DefinitionKind, name: &str) -> Result<T> {
    if !path.exists() {
        return Err(ChainError::DefinitionNotFound {
            kind,
            name: name.to_string(),
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| ChainError::io(path, e))?;
    let de = serde_yaml::Deserializer::from_str(&content);
    serde_path_to_error::deserialize(de).map_err(|source| ChainError::DefinitionParse {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically create `path` with `content`, refusing to replace an existing file.
///
/// Returns `Ok(false)` when the file already exists.
fn write_new_file(path: &Path, content: &[u8]) -> Result<bool> {
    let parent = path
        .parent()
        .ok_or_else(|| ChainError::Internal(format!("No parent directory for '{}'", path.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| ChainError::io(parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| ChainError::DefinitionWrite {
        path: path.to_path_buf(),
        message: format!("failed to create temp file: {}", e),
    })?;
    tmp.write_all(content).map_err(|e| ChainError::DefinitionWrite {
        path: path.to_path_buf(),
        message: format!("failed to write temp file: {}", e),
    })?;

    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(ChainError::DefinitionWrite {
            path: path.to_path_buf(),
            message: e.error.to_string(),
        }),
    }
}

/// Name and email from the host's git configuration.
pub async fn git_config_user() -> Result<(String, String)> {
    let name = git_config_value("user.name").await?;
    let email = git_config_value("user.email").await?;
    Ok((name, email))
}

async fn git_config_value(key: &str) -> Result<String> {
    let output = Command::new("git")
        .args(["config", "--get", key])
        .output()
        .await
        .map_err(|e| ChainError::io(PathBuf::from("git"), e))?;
    if !output.status.success() {
        return Err(ChainError::Internal(format!("git config {} is not set", key)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
