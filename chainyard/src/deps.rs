//! Booting of a chain's declared dependencies.
//!
//! Dependencies are one level deep: each name is resolved on its own, and a
//! dependency's own dependencies are its business when it starts. Services
//! are started on demand; chains must already be running, so booting one
//! chain can never cascade into starting others.

use tracing::{debug, info};

use crate::config::LOGROTATE_SERVICE;
use crate::definitions::{ChainDefinition, DependencySpec};
use crate::errors::{ChainError, Result};
use crate::persistence::DefinitionStore;
use crate::request::RuntimeRequest;
use crate::runtime::ContainerRuntime;

/// Dependencies of `def` as they should be resolved for `req`.
///
/// Adds the logrotate service when requested, at most once.
pub fn effective_dependencies(def: &ChainDefinition, req: &RuntimeRequest) -> DependencySpec {
    let mut deps = def.dependencies.clone().unwrap_or_default();
    if req.logrotate {
        deps.add_service(LOGROTATE_SERVICE);
    }
    deps
}

/// Ensure every declared dependency of `def` is running.
///
/// Service dependencies that are not running are started; the first failure
/// aborts the remaining ones. Chain dependencies that are not running are an
/// error. Running state is always asked of the runtime, never cached.
pub async fn boot_dependencies(
    store: &DefinitionStore,
    runtime: &dyn ContainerRuntime,
    def: &ChainDefinition,
    req: &RuntimeRequest,
) -> Result<()> {
    let deps = effective_dependencies(def, req);
    if deps.is_empty() {
        debug!("Chain {} has no dependencies", def.name);
        return Ok(());
    }

    info!(
        "Booting dependencies of {}: services {:?}, chains {:?}",
        def.name, deps.services, deps.chains
    );

    for srv_name in &deps.services {
        let dependency_error = |source: ChainError| ChainError::DependencyStart {
            chain: def.name.clone(),
            dependency: srv_name.clone(),
            source: Box::new(source),
        };

        let srv = store.load_service(srv_name).map_err(dependency_error)?;
        let running = runtime
            .is_running(&srv.operations.srv_container_name)
            .await
            .map_err(|e| dependency_error(e.into()))?;
        if running {
            debug!("Dependency {} already running", srv_name);
            continue;
        }

        info!("Dependency {} not running. Starting now", srv_name);
        runtime
            .run_service(&srv.service, &srv.operations)
            .await
            .map_err(|e| dependency_error(e.into()))?;
    }

    for chain_name in &deps.chains {
        let chain = store.load_chain(chain_name).map_err(|source| ChainError::DependencyStart {
            chain: def.name.clone(),
            dependency: chain_name.clone(),
            source: Box::new(source),
        })?;
        if !runtime.is_running(&chain.operations.srv_container_name).await? {
            return Err(ChainError::MissingChainDependency {
                chain: def.name.clone(),
                dependency: chain_name.clone(),
            });
        }
        debug!("Chain dependency {} is running", chain_name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_dependencies_adds_logrotate_once() {
        let def = ChainDefinition {
            name: "c".to_string(),
            dependencies: Some(DependencySpec {
                services: vec!["keys".to_string(), LOGROTATE_SERVICE.to_string()],
                chains: vec![],
            }),
            ..Default::default()
        };
        let req = RuntimeRequest {
            logrotate: true,
            ..RuntimeRequest::named("c")
        };
        let deps = effective_dependencies(&def, &req);
        assert_eq!(deps.services, vec!["keys".to_string(), LOGROTATE_SERVICE.to_string()]);
    }

    #[test]
    fn test_effective_dependencies_without_declaration() {
        let def = ChainDefinition::default();
        let req = RuntimeRequest {
            logrotate: true,
            ..Default::default()
        };
        assert_eq!(effective_dependencies(&def, &req).services, vec![LOGROTATE_SERVICE.to_string()]);
        assert!(effective_dependencies(&def, &RuntimeRequest::default()).is_empty());
    }
}
