//! Runtime configuration for chain containers.
//!
//! Turns a loaded [`ChainDefinition`] plus a [`RuntimeRequest`] into the
//! service/operations pair handed to the container runtime. The definition and
//! request are never modified; the result is a fresh [`RuntimeConfig`].

use std::path::Path;

use crate::config::{Settings, chain_container_name};
use crate::definitions::ChainDefinition;
use crate::errors::{ChainError, Result};
use crate::request::{LaunchMode, RuntimeConfig, RuntimeRequest};

/// Padding for a container-runtime bug that truncates the environment when
/// the last value is short (docker/docker#14203). Kept verbatim.
pub const DOCKER_FIX: &str = "                                        ";

/// Appended last when the node API is requested; its presence enables the API.
pub const API_ENABLE_ENV: &str = "ERISDB_API=true";

/// Alias under which exec containers reach the chain container.
pub const CHAIN_LINK_ALIAS: &str = "chain";

/// Render `key=value` options as ` --key=value` tokens.
///
/// Every option must contain exactly one `=`.
pub fn build_config_opts(opts: &[String]) -> Result<String> {
    let mut out = String::new();
    for opt in opts {
        let parts: Vec<&str> = opt.split('=').collect();
        if parts.len() != 2 {
            return Err(ChainError::BadConfigOption(opt.clone()));
        }
        out.push_str(&format!(" --{}={}", parts[0], parts[1]));
    }
    Ok(out)
}

/// Identity and template variables, in the order the chain image expects.
pub fn template_env(
    chain_id: &str,
    container_name: &str,
    config_opts: &str,
    gateway: &str,
) -> Vec<String> {
    vec![
        format!("CHAIN_ID={}", chain_id),
        format!("CONTAINER_NAME={}", container_name),
        format!("CONFIG_OPTS={}", config_opts),
        format!("NODE_ADDR={}", gateway),
        format!("DOCKER_FIX={}", DOCKER_FIX),
    ]
}

/// Build the runtime config for launching `def` in `mode`.
///
/// Environment order: definition entries, template variables, caller
/// entries, then the API flag. Later duplicates win inside the container.
/// Links are the definition's followed by the caller's, without dedup.
pub fn materialize(
    def: &ChainDefinition,
    req: &RuntimeRequest,
    mode: LaunchMode,
    settings: &Settings,
) -> Result<RuntimeConfig> {
    let config_opts = build_config_opts(&req.config_opts)?;

    let mut service = def.service.clone();
    let mut operations = def.operations.clone();

    service.environment.extend(template_env(
        &def.chain_id,
        &operations.srv_container_name,
        &config_opts,
        &req.gateway,
    ));
    service.environment.extend(req.env.iter().cloned());
    if req.run {
        service.environment.push(API_ENABLE_ENV.to_string());
    }

    service.links.extend(req.links.iter().cloned());

    match mode {
        LaunchMode::Provision(cmd) => {
            service.command = Some(cmd.as_str().to_string());
            operations.publish_all_ports = req.publish_all_ports;
            operations.ports = req.ports.clone();
        }
        LaunchMode::Start => {
            service.command = Some(settings.chain_start_command.clone());
            merge_operations(&mut operations, req);
        }
        LaunchMode::Exec => {
            merge_operations(&mut operations, req);
            if let Some(image) = req.image.as_ref().filter(|i| !i.is_empty()) {
                service.image = image.clone();
            }
            // The chain image has its own entrypoint; the one-off command must replace it.
            service.entrypoint = None;
            service.command = None;
            // Random host ports so the exec never collides with the running chain.
            operations.publish_all_ports = true;
            operations.args = req.args.clone();
            service.links.push(format!(
                "{}:{}",
                chain_container_name(&def.name),
                CHAIN_LINK_ALIAS
            ));
        }
    }

    Ok(RuntimeConfig {
        service,
        operations,
    })
}

/// Overlay the non-default operation fields of a request.
fn merge_operations(operations: &mut crate::definitions::OperationsSpec, req: &RuntimeRequest) {
    if req.publish_all_ports {
        operations.publish_all_ports = true;
    }
    if !req.ports.is_empty() {
        operations.ports = req.ports.clone();
    }
    if req.interactive {
        operations.interactive = true;
    }
}

/// Load `KEY=value` entries from a .env file, in file order.
pub fn load_env_file(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(ChainError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "environment file not found"),
        ));
    }

    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        ChainError::Internal(format!("Failed to parse environment file {}: {}", path.display(), e))
    })?;

    let mut env = Vec::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            ChainError::Internal(format!("Failed to parse environment file {}: {}", path.display(), e))
        })?;
        env.push(format!("{}={}", key, value));
    }
    Ok(env)
}
