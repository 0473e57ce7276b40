pub mod config;
pub mod definitions;
pub mod deps;
pub mod env;
pub mod errors;
pub mod orchestrator;
pub mod persistence;
pub mod pull;
pub mod request;
pub mod runtime;

pub use config::{Paths, Settings};
pub use definitions::{ChainDefinition, ChainKind, ServiceDefinition};
pub use errors::{ChainError, ErrorClass, Result};
pub use orchestrator::{ChainOrchestrator, HeadChange, ProvisionState};
pub use request::{CatKind, ChainRef, CleanupRequest, RuntimeRequest};
pub use runtime::{ContainerRuntime, DockerCli, RuntimeError};
