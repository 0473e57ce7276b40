use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ChainOrchestrator, require_name};
use crate::config::{DEFAULT_CHAIN, validate_name};
use crate::deps::boot_dependencies;
use crate::env::materialize;
use crate::errors::{ChainError, Result};
use crate::pull::pull_image_with_timeout;
use crate::request::{CatKind, ChainRef, LaunchMode, ProvisionCommand, RuntimeConfig, RuntimeRequest};

/// Hex characters appended to a throwaway chain's name.
const THROWAWAY_SUFFIX_LEN: usize = 8;

/// RPC address of the chain as seen from an exec container linked to it.
const CHAIN_RPC_ADDR: &str = "http://chain:46657";

/// Outcome of [`ChainOrchestrator::checkout_chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadChange {
    Cleared,
    Unchanged,
    Changed(String),
}

impl ChainOrchestrator {
    // =========================================================================
    // Provisioning
    // =========================================================================

    /// Provision a new chain and start it with the image's `new` command.
    ///
    /// Leftover host data of a previous chain with the same name is discarded first.
    pub async fn new_chain(&self, req: &RuntimeRequest) -> Result<()> {
        require_name(&req.name)?;
        let dir = self.paths.chain_data(&req.name);
        if dir.exists() {
            warn!("Chain data directory {:?} already exists, removing it", dir);
            self.remove_host_data(&req.name)?;
        }
        self.provision(req, ProvisionCommand::New).await
    }

    /// Provision a chain from existing files, starting it with the image's `install` command.
    pub async fn install_chain(&self, req: &RuntimeRequest) -> Result<()> {
        require_name(&req.name)?;
        self.provision(req, ProvisionCommand::Install).await
    }

    /// Provision and start a disposable chain named `<name>_<8 hex chars>`.
    ///
    /// The chain is seeded from the default template and runs with its API
    /// enabled. Removing it is left to [`cleanup`](Self::cleanup).
    pub async fn throwaway_chain(&self, req: &RuntimeRequest) -> Result<ChainRef> {
        validate_name(&req.name)?;
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}_{}", req.name, &suffix[..THROWAWAY_SUFFIX_LEN]);

        let provision = RuntimeRequest {
            name: name.clone(),
            chain_id: Some(name.clone()),
            path: Some(self.paths.chain_source(DEFAULT_CHAIN)),
            ..req.clone()
        };
        self.new_chain(&provision).await?;
        info!("Throwaway chain {} created", name);

        let start = RuntimeRequest {
            run: true,
            ..provision
        };
        self.start_chain(&start).await?;
        info!("Throwaway chain {} started", name);

        Ok(ChainRef::throwaway(name))
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Boot dependencies and run the chain container.
    pub async fn start_chain(&self, req: &RuntimeRequest) -> Result<()> {
        let config = self.prepare(req, LaunchMode::Start).await?;
        info!(
            "Starting chain {} in {}",
            config.service.name, config.operations.srv_container_name
        );
        self.runtime
            .run_service(&config.service, &config.operations)
            .await?;
        Ok(())
    }

    /// Run `req.args` in a one-off container linked to the chain, returning its output.
    pub async fn exec_chain(&self, req: &RuntimeRequest) -> Result<String> {
        let config = self.prepare(req, LaunchMode::Exec).await?;
        debug!("Executing {:?} against chain {}", config.operations.args, req.name);
        Ok(self
            .runtime
            .exec_service(&config.service, &config.operations)
            .await?)
    }

    /// Load the definition, boot its dependencies and materialize the config.
    async fn prepare(&self, req: &RuntimeRequest, mode: LaunchMode) -> Result<RuntimeConfig> {
        require_name(&req.name)?;
        let def = self.store.load_chain(&req.name)?;
        if def.name.is_empty() {
            return Err(ChainError::NoChainName);
        }

        boot_dependencies(&self.store, self.runtime.as_ref(), &def, req).await?;
        materialize(&def, req, mode, &self.settings)
    }

    /// Stop the chain container; with `req.rm` remove it afterwards.
    ///
    /// A chain that is not running is skipped. `req.force` stops without grace period.
    pub async fn kill_chain(&self, req: &RuntimeRequest) -> Result<()> {
        require_name(&req.name)?;
        let (service, ops) = self.instance_specs(&req.name);

        if self.runtime.is_running(&ops.srv_container_name).await? {
            let timeout = self.stop_timeout(req);
            info!("Stopping chain {} (timeout {}s)", req.name, timeout);
            match self.runtime.stop(&service, &ops, timeout).await {
                Ok(()) => {}
                Err(e) if e.is_absent() => debug!("Chain {} vanished before stop", req.name),
                Err(e) => return Err(e.into()),
            }
        } else {
            info!("Chain {} not currently running, skipping", req.name);
        }

        if req.rm {
            self.remove_containers(&service, &ops, req.rm_data, req.volumes, req.force)
                .await?;
        }
        Ok(())
    }

    /// Stop and remove the chain container, and on request its data volume and host files.
    ///
    /// Anything already gone is skipped, so removing twice is not an error.
    pub async fn remove_chain(&self, req: &RuntimeRequest) -> Result<()> {
        require_name(&req.name)?;
        let (service, ops) = self.instance_specs(&req.name);

        let container_exists = self.runtime.exists(&ops.srv_container_name).await?;
        let data_exists = req.rm_data && self.runtime.exists(&ops.data_container_name).await?;

        if container_exists || data_exists {
            if container_exists && self.runtime.is_running(&ops.srv_container_name).await? {
                let timeout = self.stop_timeout(req);
                match self.runtime.stop(&service, &ops, timeout).await {
                    Ok(()) => {}
                    Err(e) if e.is_absent() => {}
                    Err(e) => return Err(e.into()),
                }
            }
            self.remove_containers(&service, &ops, req.rm_data, req.volumes, req.force)
                .await?;
            info!("Chain {} removed", req.name);
        } else {
            info!("No chain containers for {}, nothing to remove", req.name);
        }

        if req.rm_host_files {
            debug!("Removing host data of {}", req.name);
            self.remove_host_data(&req.name)?;
        }
        Ok(())
    }

    /// Recreate the chain container with a fresh environment, keeping its data volume.
    pub async fn update_chain(&self, req: &RuntimeRequest) -> Result<()> {
        require_name(&req.name)?;
        let def = self.store.load_chain(&req.name)?;
        let mut service = def.service.clone();
        let ops = def.operations.clone();

        if !self.runtime.exists(&ops.srv_container_name).await? {
            info!("Chain {} has no container, nothing to update", req.name);
            return Ok(());
        }

        service.environment = std::iter::once(format!("CHAIN_ID={}", def.chain_id))
            .chain(req.env.iter().cloned())
            .collect();
        service.links.extend(req.links.iter().cloned());
        service.command = Some(self.settings.chain_start_command.clone());

        let timeout = self.stop_timeout(req);
        match self.runtime.stop(&service, &ops, timeout).await {
            Ok(()) => {}
            Err(e) if e.is_absent() => {}
            Err(e) => return Err(e.into()),
        }
        self.remove_containers(&service, &ops, false, false, false).await?;

        if req.pull {
            pull_image_with_timeout(
                self.runtime.clone(),
                &service.image,
                &self.settings,
                self.settings.pull_timeout(),
            )
            .await?;
        }

        info!("Rebuilding chain {} from {}", req.name, service.image);
        self.runtime.run_service(&service, &ops).await?;
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Show one aspect of a chain.
    pub async fn cat_chain(&self, name: &str, kind: CatKind) -> Result<String> {
        require_name(name)?;
        let args = match kind {
            CatKind::Definition => return self.store.read_chain_definition(name),
            CatKind::Genesis => self.chain_file_cat(name, "genesis.json"),
            CatKind::Config => self.chain_file_cat(name, "config.toml"),
            CatKind::Status | CatKind::Validators => vec![
                "mintinfo".to_string(),
                "--node-addr".to_string(),
                CHAIN_RPC_ADDR.to_string(),
                kind.to_string(),
            ],
        };

        let req = RuntimeRequest {
            publish_all_ports: true,
            ..RuntimeRequest::exec(name, args)
        };
        self.exec_chain(&req).await
    }

    fn chain_file_cat(&self, name: &str, file: &str) -> Vec<String> {
        vec![
            "cat".to_string(),
            format!("{}/{}", self.settings.container_chain_dir(name), file),
        ]
    }

    pub async fn logs_chain(&self, name: &str, follow: bool, tail: &str) -> Result<String> {
        require_name(name)?;
        let (_, ops) = self.instance_specs(name);
        Ok(self.runtime.logs(&ops, follow, tail).await?)
    }

    /// Inspect the chain container; empty when there is no container.
    pub async fn inspect_chain(&self, name: &str, field: &str) -> Result<String> {
        require_name(name)?;
        let (_, ops) = self.instance_specs(name);
        if !self.runtime.exists(&ops.srv_container_name).await? {
            debug!("No container for chain {}", name);
            return Ok(String::new());
        }
        Ok(self.runtime.inspect(&ops.srv_container_name, field).await?)
    }

    /// Host port mappings of the chain container; empty when there is no container.
    pub async fn ports_chain(&self, name: &str) -> Result<Vec<String>> {
        require_name(name)?;
        let (_, ops) = self.instance_specs(name);
        if !self.runtime.exists(&ops.srv_container_name).await? {
            debug!("No container for chain {}", name);
            return Ok(Vec::new());
        }
        Ok(self.runtime.port_mappings(&ops.srv_container_name).await?)
    }

    // =========================================================================
    // Checked-out chain
    // =========================================================================

    /// Make `name` the current chain, or clear the current chain with `None`.
    pub fn checkout_chain(&self, name: Option<&str>) -> Result<HeadChange> {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            self.store.write_head(None)?;
            info!("Cleared checked out chain");
            return Ok(HeadChange::Cleared);
        };

        validate_name(name)?;
        if self.store.read_head()?.as_deref() == Some(name) {
            info!("Chain {} is already checked out, no change", name);
            return Ok(HeadChange::Unchanged);
        }

        self.store.write_head(Some(name))?;
        info!("Checked out chain {}", name);
        Ok(HeadChange::Changed(name.to_string()))
    }

    pub fn current_chain(&self) -> Result<Option<String>> {
        self.store.read_head()
    }
}
