//! Caller intent and the per-step runtime configuration derived from it.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::definitions::{ChainKind, OperationsSpec, ServiceDefinition, ServiceSpec};
use crate::errors::ChainError;

/// Everything a caller asks of one orchestrator call.
///
/// Built fresh per invocation and never persisted. Operations take it by
/// reference; where an operation needs different identity (throwaway names,
/// internal execs) it derives a new request instead of editing this one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeRequest {
    pub name: String,
    pub chain_id: Option<String>,
    /// Image override for exec
    pub image: Option<String>,
    pub env: Vec<String>,
    pub links: Vec<String>,
    /// Enable the node's API (`ERISDB_API=true`)
    pub run: bool,
    pub force: bool,
    pub rm: bool,
    /// Remove the data volume along with the container
    pub rm_data: bool,
    /// Remove the host-side data directory
    pub rm_host_files: bool,
    pub volumes: bool,
    pub logrotate: bool,
    pub pull: bool,
    pub path: Option<PathBuf>,
    pub genesis: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub priv_validator: Option<PathBuf>,
    /// `key=value` options forwarded to the node's config generator
    pub config_opts: Vec<String>,
    /// Address of a node to talk to (`NODE_ADDR`)
    pub gateway: String,
    pub publish_all_ports: bool,
    pub ports: Vec<String>,
    /// Command for exec
    pub args: Vec<String>,
    pub interactive: bool,
    /// Stop timeout in seconds; `None` uses the configured default
    pub timeout: Option<u32>,
}

impl RuntimeRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A request for an in-container command against chain `name`.
    pub fn exec(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
            ..Default::default()
        }
    }

    /// Chain id to provision with; defaults to the name.
    pub fn effective_chain_id(&self) -> String {
        match &self.chain_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => self.name.clone(),
        }
    }

    /// Whether no explicit chain source was given.
    pub(crate) fn wants_default_source(&self) -> bool {
        self.path.is_none() && self.genesis.is_none() && self.config_opts.is_empty()
    }
}

/// Command passed to the chain image during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionCommand {
    New,
    Install,
}

impl ProvisionCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionCommand::New => "new",
            ProvisionCommand::Install => "install",
        }
    }
}

/// What the materialized container is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Provision(ProvisionCommand),
    Start,
    Exec,
}

/// Service and operations specs ready to hand to the container runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub service: ServiceSpec,
    pub operations: OperationsSpec,
}

/// A chain to destroy during cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRef {
    pub name: String,
    pub kind: ChainKind,
}

impl ChainRef {
    pub fn throwaway(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChainKind::Throwaway,
        }
    }
}

/// Orthogonal cleanup triggers; any combination may be set.
#[derive(Debug, Clone, Default)]
pub struct CleanupRequest {
    pub chain: Option<ChainRef>,
    /// Temporary service container to remove with its volumes
    pub service: Option<ServiceDefinition>,
    /// Remove the host data directory of `service`
    pub rm_data: bool,
    /// Remove the `service` container
    pub rm: bool,
}

/// What `cat_chain` shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatKind {
    Genesis,
    Config,
    Status,
    Validators,
    Definition,
}

impl FromStr for CatKind {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "genesis" => Ok(CatKind::Genesis),
            "config" => Ok(CatKind::Config),
            "status" => Ok(CatKind::Status),
            "validators" => Ok(CatKind::Validators),
            "definition" | "toml" | "yaml" => Ok(CatKind::Definition),
            other => Err(ChainError::UnknownCatKind(other.to_string())),
        }
    }
}

impl fmt::Display for CatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CatKind::Genesis => "genesis",
            CatKind::Config => "config",
            CatKind::Status => "status",
            CatKind::Validators => "validators",
            CatKind::Definition => "definition",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_chain_id() {
        let mut req = RuntimeRequest::named("mychain");
        assert_eq!(req.effective_chain_id(), "mychain");
        req.chain_id = Some(String::new());
        assert_eq!(req.effective_chain_id(), "mychain");
        req.chain_id = Some("other".to_string());
        assert_eq!(req.effective_chain_id(), "other");
    }

    #[test]
    fn test_cat_kind_parse() {
        assert_eq!("genesis".parse::<CatKind>().unwrap(), CatKind::Genesis);
        assert_eq!("toml".parse::<CatKind>().unwrap(), CatKind::Definition);
        let err = "nope".parse::<CatKind>().unwrap_err();
        assert!(matches!(err, ChainError::UnknownCatKind(ref s) if s == "nope"));
    }

    #[test]
    fn test_default_source_wanted_only_without_inputs() {
        let mut req = RuntimeRequest::named("c");
        assert!(req.wants_default_source());
        req.config_opts.push("a=b".to_string());
        assert!(!req.wants_default_source());
    }
}
