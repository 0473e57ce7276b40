//! The "new chain" pipeline.
//!
//! ```text
//! Init -> DataVolumeEnsured -> FilesStaged -> FilesImported -> DefinitionPersisted
//!      -> ConfigInjected -> DependenciesBooted -> ContainerRunning
//!      -> KeysImported -> OwnershipFixed -> Done
//! ```
//!
//! A rollback guard is armed once the data volume exists. Any failure up to
//! and including the container run fires it, removing the container, and the
//! volume when this run created it. Failures of the two in-container setup execs afterwards are
//! reported without rollback: the node is already up at that point.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use super::ChainOrchestrator;
use super::rollback::RollbackGuard;
use crate::config::{DEFAULT_CHAIN, data_container_name, validate_name};
use crate::definitions::{ChainDefinition, OperationsSpec};
use crate::deps::boot_dependencies;
use crate::env::materialize;
use crate::errors::{ChainError, ProvisionStep, Result};
use crate::persistence::git_config_user;
use crate::request::{LaunchMode, ProvisionCommand, RuntimeRequest};

/// Progress through the provisioning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvisionState {
    Init,
    DataVolumeEnsured,
    FilesStaged,
    FilesImported,
    DefinitionPersisted,
    ConfigInjected,
    DependenciesBooted,
    ContainerRunning,
    KeysImported,
    OwnershipFixed,
    Done,
}

/// Genesis, config and key files to place next to the chain source.
const STAGED_FILES: [&str; 3] = ["genesis.json", "config.toml", "priv_validator.json"];

impl ChainOrchestrator {
    /// Run the provisioning pipeline for `req.name` with image command `cmd`.
    pub(crate) async fn provision(&self, req: &RuntimeRequest, cmd: ProvisionCommand) -> Result<()> {
        validate_name(&req.name)?;
        let name = req.name.as_str();
        let chain_id = self.canonical_chain_id(req)?;

        // Resolved before anything is created, so a bad source leaves nothing behind.
        let source = self.resolve_source(req)?;

        let created_data = self
            .ensure_data_volume(name, &chain_id)
            .await
            .map_err(|e| ChainError::setup(ProvisionStep::EnsureDataVolume, name, e))?;
        debug!("Chain data container for {} ready", name);

        let mut guard = RollbackGuard::arm(self, name, created_data);
        if let Err(e) = self
            .provision_armed(req, &chain_id, source.as_deref(), cmd, &mut guard)
            .await
        {
            return Err(guard.fire(e).await);
        }
        guard.disarm();

        self.post_start_setup(name, &chain_id).await?;
        debug!("Provisioning {} reached {:?}", name, ProvisionState::Done);
        Ok(())
    }

    /// Steps covered by the rollback guard.
    async fn provision_armed(
        &self,
        req: &RuntimeRequest,
        chain_id: &str,
        source: Option<&Path>,
        cmd: ProvisionCommand,
        guard: &mut RollbackGuard<'_>,
    ) -> Result<()> {
        let name = req.name.as_str();
        let container_dst = self.settings.container_chain_dir(chain_id);
        let staging = self.staging_dir(name, &container_dst);

        info!("Copying chain files into the correct location");
        self.stage_files(req, source, &staging)
            .map_err(|e| ChainError::setup(ProvisionStep::StageFiles, name, e))?;
        guard.advance(ProvisionState::FilesStaged);

        debug!("Copying files from {:?} into data container at {}", staging, container_dst);
        let data_ops = data_operations(name);
        self.runtime
            .import_data(&data_ops, &staging, &container_dst)
            .await
            .map_err(|e| ChainError::setup(ProvisionStep::ImportFiles, name, e.into()))?;
        guard.advance(ProvisionState::FilesImported);

        let def = self
            .persist_definition(name, chain_id)
            .await
            .map_err(|e| ChainError::setup(ProvisionStep::PersistDefinition, name, e))?;
        debug!("Chain {} loaded with image {}", name, def.service.image);
        guard.advance(ProvisionState::DefinitionPersisted);

        let mut config = materialize(&def, req, LaunchMode::Provision(cmd), &self.settings)
            .map_err(|e| ChainError::setup(ProvisionStep::InjectConfig, name, e))?;
        config.operations.data_container_name = data_container_name(name);
        debug!(
            "Chain {} environment {:?}, links {:?}",
            name, config.service.environment, config.service.links
        );
        guard.advance(ProvisionState::ConfigInjected);

        boot_dependencies(&self.store, self.runtime.as_ref(), &def, req)
            .await
            .map_err(|e| ChainError::setup(ProvisionStep::BootDependencies, name, e))?;
        guard.advance(ProvisionState::DependenciesBooted);

        debug!(
            "Performing chain container start for {} (image {})",
            config.service.name, config.service.image
        );
        self.runtime
            .run_service(&config.service, &config.operations)
            .await
            .map_err(|e| ChainError::setup(ProvisionStep::RunContainer, name, e.into()))?;
        guard.advance(ProvisionState::ContainerRunning);

        Ok(())
    }

    /// Chain id of an existing definition, else the requested one.
    ///
    /// Files, key paths and `CHAIN_ID` all use this id, so a definition
    /// persisted earlier keeps the id it was created with.
    fn canonical_chain_id(&self, req: &RuntimeRequest) -> Result<String> {
        let requested = req.effective_chain_id();
        if !self.paths.chain_definition(&req.name).is_file() {
            return Ok(requested);
        }

        let def = self.store.load_chain(&req.name)?;
        if def.chain_id.is_empty() {
            return Ok(requested);
        }
        if def.chain_id != requested {
            info!(
                "Chain {} already has chain id {}, ignoring {}",
                req.name, def.chain_id, requested
            );
        }
        Ok(def.chain_id)
    }

    /// Pick the directory whose contents seed the chain.
    ///
    /// An explicit path that is not a directory is looked up under the chains
    /// directory by name. Without any explicit input, the `default` template is used.
    fn resolve_source(&self, req: &RuntimeRequest) -> Result<Option<PathBuf>> {
        let candidate = match &req.path {
            Some(path) if path.is_dir() => return Ok(Some(path.clone())),
            Some(path) => {
                info!("Path {:?} does not exist or is not a directory, trying the chains directory", path);
                self.paths.chain_source(&path.to_string_lossy())
            }
            None if req.wants_default_source() => self.paths.chain_source(DEFAULT_CHAIN),
            None => return Ok(None),
        };

        if candidate.is_dir() {
            Ok(Some(candidate))
        } else {
            Err(ChainError::SourceNotFound(candidate))
        }
    }

    /// Create the data volume unless it exists, with the chain directory inside it.
    ///
    /// Returns whether the volume was created by this call.
    async fn ensure_data_volume(&self, name: &str, chain_id: &str) -> Result<bool> {
        let ops = data_operations(name);
        if self.runtime.exists(&ops.data_container_name).await? {
            debug!("Chain data container {} already exists", ops.data_container_name);
            return Ok(false);
        }

        self.runtime.create_data(&ops).await?;
        let mkdir = vec![
            "mkdir".to_string(),
            "-p".to_string(),
            self.settings.container_chain_dir(chain_id),
        ];
        self.runtime.exec_data(&ops, &mkdir).await?;
        Ok(true)
    }

    /// Host directory mirroring the in-container target path.
    fn staging_dir(&self, name: &str, container_dst: &str) -> PathBuf {
        self.paths
            .chain_data(name)
            .join(container_dst.trim_start_matches('/'))
    }

    fn stage_files(&self, req: &RuntimeRequest, source: Option<&Path>, staging: &Path) -> Result<()> {
        fs::create_dir_all(staging).map_err(|e| ChainError::io(staging, e))?;

        if let Some(src) = source {
            debug!("Copying {:?} to {:?}", src, staging);
            copy_path(src, staging).map_err(|e| ChainError::io(src, e))?;
        }

        let files = [&req.genesis, &req.config_file, &req.priv_validator];
        for (file, target) in files.into_iter().zip(STAGED_FILES) {
            let Some(file) = file.as_ref().filter(|f| !f.as_os_str().is_empty()) else {
                continue;
            };
            let dst = staging.join(target);
            debug!("Copying {:?} to {:?}", file, dst);
            copy_path(file, &dst).map_err(|e| ChainError::io(file, e))?;
        }
        Ok(())
    }

    /// Write a fresh definition unless one exists, then load the canonical one.
    async fn persist_definition(&self, name: &str, chain_id: &str) -> Result<ChainDefinition> {
        let mut draft = self.store.mock_chain(name, chain_id);
        match git_config_user().await {
            Ok((user, email)) => {
                draft.maintainer.name = user;
                draft.maintainer.email = email;
            }
            Err(e) => debug!("No maintainer info: {}", e),
        }

        self.store.persist_chain_if_absent(&draft)?;
        self.store.load_chain(name)
    }

    /// Import the validator key and hand the container root to the container user.
    async fn post_start_setup(&self, name: &str, chain_id: &str) -> Result<()> {
        info!("Moving priv_validator.json into the key store");
        let key_path = format!("{}/priv_validator.json", self.settings.container_chain_dir(chain_id));
        let mut import = self.settings.key_import_command.clone();
        import.push(key_path);
        self.setup_exec(name, ProvisionStep::ImportKeys, import).await?;

        let chown = vec![
            "chown".to_string(),
            "--recursive".to_string(),
            self.settings.container_user.clone(),
            self.settings.container_root.clone(),
        ];
        self.setup_exec(name, ProvisionStep::FixOwnership, chown).await
    }

    async fn setup_exec(&self, name: &str, step: ProvisionStep, args: Vec<String>) -> Result<()> {
        match self.exec_chain(&RuntimeRequest::exec(name, args)).await {
            Ok(out) => {
                debug!("{} for {}: {}", step, name, out.trim());
                Ok(())
            }
            Err(e) => {
                error!("Error {} for {}: {}", step, name, e);
                Err(ChainError::ExecDuringSetup {
                    step,
                    chain: name.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }
}

fn data_operations(name: &str) -> OperationsSpec {
    OperationsSpec {
        data_container_name: data_container_name(name),
        ..Default::default()
    }
}

/// Copy a file, or a directory's contents recursively, to `dst`.
fn copy_path(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::metadata(src)?;
    if meta.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_path(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_path_directory_merges_into_destination() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("genesis.json"), "{}").unwrap();
        fs::write(src.join("nested/key"), "k").unwrap();

        let dst = temp.path().join("dst");
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("existing"), "e").unwrap();

        copy_path(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("genesis.json")).unwrap(), "{}");
        assert_eq!(fs::read_to_string(dst.join("nested/key")).unwrap(), "k");
        assert!(dst.join("existing").exists());
    }

    #[test]
    fn test_copy_path_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let err = copy_path(&temp.path().join("nope"), &temp.path().join("dst")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_provision_states_are_ordered() {
        assert!(ProvisionState::Init < ProvisionState::DataVolumeEnsured);
        assert!(ProvisionState::ContainerRunning < ProvisionState::KeysImported);
    }
}
