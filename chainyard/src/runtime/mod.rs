//! Container runtime boundary.
//!
//! The orchestrator never talks to a container engine directly; it calls the
//! primitives of [`ContainerRuntime`]. The runtime is the only source of truth
//! for whether a container exists or runs, and is re-queried on every check.

mod docker;

pub use docker::DockerCli;

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use crate::definitions::{OperationsSpec, ServiceSpec};

/// Errors reported by a [`ContainerRuntime`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0} does not exist")]
    Absent(String),

    #[error("{op} {target} failed: {message}")]
    Command {
        op: &'static str,
        target: String,
        message: String,
    },

    #[error("failed to invoke container runtime: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn command(op: &'static str, target: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Command {
            op,
            target: target.into(),
            message: message.into(),
        }
    }

    /// Whether the error only says the target is already gone.
    pub fn is_absent(&self) -> bool {
        matches!(self, RuntimeError::Absent(_))
    }
}

/// Create/start/stop/exec/remove primitives for containers and data volumes.
///
/// Service containers are addressed by `OperationsSpec::srv_container_name`,
/// data volume containers by `OperationsSpec::data_container_name`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether a container with this name exists (running or not).
    async fn exists(&self, container: &str) -> Result<bool, RuntimeError>;

    async fn is_running(&self, container: &str) -> Result<bool, RuntimeError>;

    /// Run the service container. A running container is left alone; a
    /// stopped one is started again rather than recreated.
    async fn run_service(&self, service: &ServiceSpec, ops: &OperationsSpec) -> Result<(), RuntimeError>;

    async fn stop(&self, service: &ServiceSpec, ops: &OperationsSpec, timeout: u32) -> Result<(), RuntimeError>;

    /// Remove the service container, and with `remove_data` its data volume container.
    async fn remove(
        &self,
        service: &ServiceSpec,
        ops: &OperationsSpec,
        remove_data: bool,
        remove_volumes: bool,
        force: bool,
    ) -> Result<(), RuntimeError>;

    /// Run `ops.args` in a one-off container built from `service` and return its combined output.
    async fn exec_service(&self, service: &ServiceSpec, ops: &OperationsSpec) -> Result<String, RuntimeError>;

    /// Create the data volume container `ops.data_container_name`.
    async fn create_data(&self, ops: &OperationsSpec) -> Result<(), RuntimeError>;

    /// Run `args` in a throwaway container that mounts the data volume.
    async fn exec_data(&self, ops: &OperationsSpec, args: &[String]) -> Result<String, RuntimeError>;

    /// Copy the contents of host directory `source` to `destination` inside the data volume.
    async fn import_data(&self, ops: &OperationsSpec, source: &Path, destination: &str) -> Result<(), RuntimeError>;

    /// Pull `image`, sending progress lines to `progress`. The sender is
    /// dropped when the pull ends, which ends any consumer.
    async fn pull_image(&self, image: &str, progress: mpsc::Sender<String>) -> Result<(), RuntimeError>;

    async fn logs(&self, ops: &OperationsSpec, follow: bool, tail: &str) -> Result<String, RuntimeError>;

    /// Inspect a container; `field` is `Major.Minor` or `all`.
    async fn inspect(&self, container: &str, field: &str) -> Result<String, RuntimeError>;

    async fn port_mappings(&self, container: &str) -> Result<Vec<String>, RuntimeError>;
}
