//! Chain and service definition types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{chain_container_name, data_container_name, service_container_name};

/// How a chain instance is meant to be used; decides what cleanup may delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    #[default]
    Standard,
    /// Disposable instance created by `throwaway_chain`
    Throwaway,
}

/// Image, command and wiring of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    pub command: Option<String>,
    pub entrypoint: Option<String>,
    pub environment: Vec<String>,
    pub links: Vec<String>,
    pub ports: Vec<String>,
    /// Whether the container mounts a data volume container
    pub auto_data: bool,
}

/// How the runtime should name and drive a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationsSpec {
    pub srv_container_name: String,
    pub data_container_name: String,
    pub publish_all_ports: bool,
    pub ports: Vec<String>,
    /// Arguments for a one-off exec
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    pub interactive: bool,
}

/// Services and chains that must be live before a chain starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencySpec {
    pub services: Vec<String>,
    pub chains: Vec<String>,
}

impl DependencySpec {
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.chains.is_empty()
    }

    /// Append a service dependency unless it is already declared.
    pub fn add_service(&mut self, name: &str) {
        if !self.services.iter().any(|s| s == name) {
            self.services.push(name.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Maintainer {
    pub name: String,
    pub email: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainDefinition {
    pub name: String,
    /// Defaults to `name`; fixed at first materialization.
    pub chain_id: String,
    pub kind: ChainKind,
    pub service: ServiceSpec,
    pub operations: OperationsSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencySpec>,
    pub maintainer: Maintainer,
}

impl ChainDefinition {
    /// Fill in fields a hand-written definition may leave out.
    pub(crate) fn normalize(&mut self) {
        if self.chain_id.is_empty() {
            self.chain_id = self.name.clone();
        }
        if self.name.is_empty() {
            return;
        }
        if self.service.name.is_empty() {
            self.service.name = self.name.clone();
        }
        if self.operations.srv_container_name.is_empty() {
            self.operations.srv_container_name = chain_container_name(&self.name);
        }
        if self.service.auto_data && self.operations.data_container_name.is_empty() {
            self.operations.data_container_name = data_container_name(&self.name);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDefinition {
    pub name: String,
    pub service: ServiceSpec,
    pub operations: OperationsSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencySpec>,
    pub maintainer: Maintainer,
}

impl ServiceDefinition {
    pub(crate) fn normalize(&mut self) {
        if self.service.name.is_empty() {
            self.service.name = self.name.clone();
        }
        if self.operations.srv_container_name.is_empty() {
            self.operations.srv_container_name = service_container_name(&self.name);
        }
        if self.service.auto_data && self.operations.data_container_name.is_empty() {
            self.operations.data_container_name = data_container_name(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults_chain_id_and_containers() {
        let mut def = ChainDefinition {
            name: "mychain".to_string(),
            service: ServiceSpec {
                auto_data: true,
                ..Default::default()
            },
            ..Default::default()
        };
        def.normalize();
        assert_eq!(def.chain_id, "mychain");
        assert_eq!(def.service.name, "mychain");
        assert_eq!(def.operations.srv_container_name, "chainyard_chain_mychain");
        assert_eq!(def.operations.data_container_name, "chainyard_data_mychain");
    }

    #[test]
    fn test_normalize_keeps_explicit_chain_id() {
        let mut def = ChainDefinition {
            name: "mychain".to_string(),
            chain_id: "other-id".to_string(),
            ..Default::default()
        };
        def.normalize();
        assert_eq!(def.chain_id, "other-id");
    }

    #[test]
    fn test_add_service_is_idempotent() {
        let mut deps = DependencySpec::default();
        deps.add_service("logrotate");
        deps.add_service("logrotate");
        assert_eq!(deps.services, vec!["logrotate".to_string()]);
    }

    #[test]
    fn test_chain_kind_yaml() {
        let def: ChainDefinition = serde_yaml::from_str("name: t\nkind: throwaway\n").unwrap();
        assert_eq!(def.kind, ChainKind::Throwaway);
        let def: ChainDefinition = serde_yaml::from_str("name: t\n").unwrap();
        assert_eq!(def.kind, ChainKind::Standard);
    }
}
