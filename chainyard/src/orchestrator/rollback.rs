//! Undoing partial work: the provisioning rollback guard, the shared
//! container removal primitive, and throwaway/service cleanup.

use std::fs;
use tracing::{debug, info, warn};

use super::ChainOrchestrator;
use super::provision::ProvisionState;
use crate::config::DEFAULT_CHAIN;
use crate::definitions::{ChainKind, OperationsSpec, ServiceSpec};
use crate::errors::{ChainError, Result};
use crate::request::{CleanupRequest, RuntimeRequest};

/// Removes a half-provisioned chain's container when fired, and its data
/// volume if the same provisioning run created it.
///
/// Armed once the data volume exists. Consumed by [`fire`](Self::fire) on
/// failure or [`disarm`](Self::disarm) on success, so it runs at most once.
pub(crate) struct RollbackGuard<'a> {
    orchestrator: &'a ChainOrchestrator,
    name: String,
    state: ProvisionState,
    /// The volume was created by this run and goes with the rollback
    remove_data: bool,
    armed: bool,
}

impl<'a> RollbackGuard<'a> {
    pub(crate) fn arm(orchestrator: &'a ChainOrchestrator, name: &str, remove_data: bool) -> Self {
        Self {
            orchestrator,
            name: name.to_string(),
            state: ProvisionState::DataVolumeEnsured,
            remove_data,
            armed: true,
        }
    }

    pub(crate) fn advance(&mut self, state: ProvisionState) {
        debug!("Provisioning {} reached {:?}", self.name, state);
        self.state = state;
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }

    /// Remove everything created so far and return the error to report.
    ///
    /// The container is removed even if it never started. A volume that existed
    /// before this run is kept. A failing removal is reported together with the original error.
    pub(crate) async fn fire(mut self, err: ChainError) -> ChainError {
        self.armed = false;
        warn!(
            "Provisioning {} failed after {:?}, removing its containers: {}",
            self.name, self.state, err
        );

        let (service, ops) = self.orchestrator.instance_specs(&self.name);
        match self
            .orchestrator
            .remove_containers(&service, &ops, self.remove_data, true, true)
            .await
        {
            Ok(()) => err,
            Err(rollback) => ChainError::RollbackFailed {
                original: Box::new(err),
                rollback: Box::new(rollback),
            },
        }
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Rollback guard for {} dropped while armed at {:?}; containers may be left behind",
                self.name, self.state
            );
        }
    }
}

impl ChainOrchestrator {
    /// Remove the service container and optionally its data volume.
    ///
    /// Containers that are already gone are not an error.
    pub(crate) async fn remove_containers(
        &self,
        service: &ServiceSpec,
        ops: &OperationsSpec,
        remove_data: bool,
        remove_volumes: bool,
        force: bool,
    ) -> Result<()> {
        debug!(
            "Removing {} (data: {}, volumes: {}, force: {})",
            ops.srv_container_name, remove_data, remove_volumes, force
        );
        match self
            .runtime
            .remove(service, ops, remove_data, remove_volumes, force)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_absent() => {
                debug!("Nothing to remove for {}: {}", ops.srv_container_name, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Tear down what `req` names.
    ///
    /// Every part is attempted even when an earlier one fails; the first
    /// failure is returned. The definition of the `default` chain is kept.
    pub async fn cleanup(&self, req: &CleanupRequest) -> Result<()> {
        let mut first_error: Option<ChainError> = None;
        let mut record = |result: Result<()>| {
            if let Err(e) = result {
                warn!("Cleanup step failed: {}", e);
                first_error.get_or_insert(e);
            }
        };

        if let Some(chain) = req.chain.as_ref().filter(|c| c.kind == ChainKind::Throwaway) {
            info!("Cleaning up throwaway chain {}", chain.name);
            let kill = RuntimeRequest {
                rm: true,
                rm_data: true,
                volumes: true,
                force: true,
                ..RuntimeRequest::named(&chain.name)
            };
            record(self.kill_chain(&kill).await);
            record(self.remove_host_data(&chain.name));

            if chain.name != DEFAULT_CHAIN {
                record(self.store.remove_chain_definition(&chain.name));
            } else {
                debug!("Keeping the {} chain definition", DEFAULT_CHAIN);
            }
        }

        if let Some(service) = &req.service {
            if req.rm_data {
                record(self.remove_host_data(&service.name));
            }
            if req.rm {
                record(
                    self.remove_containers(&service.service, &service.operations, true, true, false)
                        .await,
                );
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Delete the host-side data directory of `name`, if there is one.
    pub(crate) fn remove_host_data(&self, name: &str) -> Result<()> {
        let dir = self.paths.chain_data(name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Removed {:?}", dir);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChainError::io(dir, e)),
        }
    }
}
