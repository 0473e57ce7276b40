//! Chain lifecycle orchestration.
//!
//! `ChainOrchestrator` ties the definition store, the config materializer,
//! the dependency booter and the container runtime together. Every public
//! operation takes an immutable [`RuntimeRequest`] and re-queries the runtime
//! for container state instead of caching it between calls.

mod lifecycle;
mod provision;
mod rollback;

pub use lifecycle::HeadChange;
pub use provision::ProvisionState;

use std::sync::Arc;
use tracing::debug;

use crate::config::{Paths, Settings, chain_container_name, data_container_name};
use crate::definitions::{OperationsSpec, ServiceSpec};
use crate::errors::{ChainError, Result};
use crate::persistence::DefinitionStore;
use crate::request::RuntimeRequest;
use crate::runtime::{ContainerRuntime, DockerCli};

/// Coordinator for chain lifecycle operations.
#[derive(Clone)]
pub struct ChainOrchestrator {
    paths: Paths,
    settings: Settings,
    store: DefinitionStore,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ChainOrchestrator {
    pub fn new(paths: Paths, settings: Settings, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let store = DefinitionStore::new(paths.clone(), settings.clone());
        Self {
            paths,
            settings,
            store,
            runtime,
        }
    }

    /// Orchestrator for the host layout found in the environment, driving `docker`.
    pub fn from_env() -> Result<Self> {
        let paths = Paths::from_env()?;
        let settings = Settings::load(&paths)?;
        let runtime = Arc::new(DockerCli::new(&settings));
        Ok(Self::new(paths, settings, runtime))
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &DefinitionStore {
        &self.store
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Container names and service spec of chain `name`.
    ///
    /// Uses the definition when there is one; names it leaves out, or all of
    /// them when there is no definition, are derived from the chain name.
    pub(crate) fn instance_specs(&self, name: &str) -> (ServiceSpec, OperationsSpec) {
        let (mut service, mut ops) = match self.store.load_chain(name) {
            Ok(def) => (def.service, def.operations),
            Err(e) => {
                debug!("Using derived container names for {}: {}", name, e);
                (ServiceSpec::default(), OperationsSpec::default())
            }
        };
        if service.name.is_empty() {
            service.name = name.to_string();
        }
        if ops.srv_container_name.is_empty() {
            ops.srv_container_name = chain_container_name(name);
        }
        if ops.data_container_name.is_empty() {
            ops.data_container_name = data_container_name(name);
        }
        (service, ops)
    }

    /// Stop timeout for `req`: zero when forced, else the request's or the default.
    pub(crate) fn stop_timeout(&self, req: &RuntimeRequest) -> u32 {
        if req.force {
            0
        } else {
            req.timeout.unwrap_or(self.settings.stop_timeout_secs)
        }
    }
}

fn require_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ChainError::NoChainName);
    }
    Ok(())
}
