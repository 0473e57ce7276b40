use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::runtime::RuntimeError;

/// Format a YAML error for user-friendly display, including the field path
fn format_yaml_error(e: &serde_path_to_error::Error<serde_yaml::Error>) -> String {
    let path = e.path().to_string();
    let inner = e.inner();
    let msg = inner.to_string();

    let located = if let Some(loc) = inner.location() {
        format!("Line {}, Column {}: {}", loc.line(), loc.column(), msg)
    } else {
        msg
    };

    if path.is_empty() || path == "." {
        located
    } else {
        format!("{}: {}", path, located)
    }
}

/// Coarse classification of a [`ChainError`], rendered by callers as a numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    NotFound,
    Validation,
    Dependency,
    Runtime,
    Setup,
    Exec,
    Timeout,
    Io,
    Internal,
}

impl ErrorClass {
    pub fn code(&self) -> u16 {
        match self {
            ErrorClass::NotFound => 404,
            ErrorClass::Validation => 400,
            ErrorClass::Dependency => 424,
            ErrorClass::Runtime => 500,
            ErrorClass::Setup => 500,
            ErrorClass::Exec => 502,
            ErrorClass::Timeout => 504,
            ErrorClass::Io => 500,
            ErrorClass::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::NotFound => "not-found",
            ErrorClass::Validation => "validation",
            ErrorClass::Dependency => "dependency",
            ErrorClass::Runtime => "runtime",
            ErrorClass::Setup => "setup",
            ErrorClass::Exec => "exec",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Io => "io",
            ErrorClass::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// Kind of definition file, used to name what could not be found or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Chain,
    Service,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionKind::Chain => f.write_str("chain"),
            DefinitionKind::Service => f.write_str("service"),
        }
    }
}

/// Steps of the provisioning pipeline, carried by setup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    ResolveSource,
    EnsureDataVolume,
    StageFiles,
    ImportFiles,
    PersistDefinition,
    InjectConfig,
    BootDependencies,
    RunContainer,
    ImportKeys,
    FixOwnership,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionStep::ResolveSource => "resolving chain source",
            ProvisionStep::EnsureDataVolume => "creating data volume",
            ProvisionStep::StageFiles => "staging chain files",
            ProvisionStep::ImportFiles => "importing chain files",
            ProvisionStep::PersistDefinition => "persisting chain definition",
            ProvisionStep::InjectConfig => "injecting runtime config",
            ProvisionStep::BootDependencies => "booting dependencies",
            ProvisionStep::RunContainer => "running chain container",
            ProvisionStep::ImportKeys => "moving keys",
            ProvisionStep::FixOwnership => "changing owner",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("{kind} definition not found: {name} (looked in {path})")]
    DefinitionNotFound {
        kind: DefinitionKind,
        name: String,
        path: PathBuf,
    },

    #[error("Failed to parse {kind} definition '{path}':\n  {}", format_yaml_error(.source))]
    DefinitionParse {
        kind: DefinitionKind,
        path: PathBuf,
        #[source]
        source: serde_path_to_error::Error<serde_yaml::Error>,
    },

    #[error("Failed to write definition file '{path}': {message}")]
    DefinitionWrite { path: PathBuf, message: String },

    #[error("Chain source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("No chain name given")]
    NoChainName,

    #[error("Invalid name '{0}': must start with an alphanumeric character and contain only [a-zA-Z0-9_.-]")]
    InvalidName(String),

    #[error("Bad config option '{0}': expected exactly one '=' (key=value)")]
    BadConfigOption(String),

    #[error("Unknown cat subcommand '{0}'")]
    UnknownCatKind(String),

    #[error("Failed to start dependency {dependency} of {chain}: {source}")]
    DependencyStart {
        chain: String,
        dependency: String,
        #[source]
        source: Box<ChainError>,
    },

    #[error("Chain {chain} depends on chain {dependency}, which is not running")]
    MissingChainDependency { chain: String, dependency: String },

    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Error {step} for chain {chain}: {source}")]
    Setup {
        step: ProvisionStep,
        chain: String,
        #[source]
        source: Box<ChainError>,
    },

    #[error("Error {original}\nCleaning up the chain also failed: {rollback}")]
    RollbackFailed {
        original: Box<ChainError>,
        rollback: Box<ChainError>,
    },

    #[error("Error executing chain command while {step} for {chain}: {source}")]
    ExecDuringSetup {
        step: ProvisionStep,
        chain: String,
        #[source]
        source: Box<ChainError>,
    },

    #[error("Pulling image {image} did not finish within {}s", .after.as_secs())]
    PullTimeout { image: String, after: Duration },

    #[error("IO error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChainError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ChainError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn setup(step: ProvisionStep, chain: &str, source: ChainError) -> Self {
        ChainError::Setup {
            step,
            chain: chain.to_string(),
            source: Box::new(source),
        }
    }

    /// Classification of this error.
    ///
    /// Wrapping variants report the class of the step that failed, except for
    /// setup and rollback errors which are always `Setup`.
    pub fn class(&self) -> ErrorClass {
        match self {
            ChainError::DefinitionNotFound { .. }
            | ChainError::SourceNotFound(_)
            | ChainError::NoChainName => ErrorClass::NotFound,
            ChainError::DefinitionParse { .. }
            | ChainError::InvalidName(_)
            | ChainError::BadConfigOption(_)
            | ChainError::UnknownCatKind(_) => ErrorClass::Validation,
            ChainError::DependencyStart { .. } | ChainError::MissingChainDependency { .. } => {
                ErrorClass::Dependency
            }
            ChainError::Runtime(_) => ErrorClass::Runtime,
            ChainError::Setup { .. } | ChainError::RollbackFailed { .. } => ErrorClass::Setup,
            ChainError::ExecDuringSetup { .. } => ErrorClass::Exec,
            ChainError::PullTimeout { .. } => ErrorClass::Timeout,
            ChainError::DefinitionWrite { .. } | ChainError::Io { .. } => ErrorClass::Io,
            ChainError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// The innermost error of a setup/dependency/exec chain.
    pub fn root_cause(&self) -> &ChainError {
        match self {
            ChainError::Setup { source, .. }
            | ChainError::DependencyStart { source, .. }
            | ChainError::ExecDuringSetup { source, .. } => source.root_cause(),
            ChainError::RollbackFailed { original, .. } => original.root_cause(),
            other => other,
        }
    }

    /// Remediation hint shown next to the error, if there is one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ChainError::NoChainName => Some("provide a chain name in the chain definition file"),
            ChainError::SourceNotFound(_) => {
                Some("pass an existing directory, or create chains/default (run the init step)")
            }
            ChainError::DefinitionParse { .. } | ChainError::DependencyStart { .. } => {
                Some("check that your service definition files are available and properly formatted")
            }
            ChainError::MissingChainDependency { .. } => Some("start the dependency chain first"),
            ChainError::BadConfigOption(_) => Some("config options take the form key=value"),
            ChainError::Setup {
                step: ProvisionStep::EnsureDataVolume,
                ..
            } => Some("check your data image"),
            ChainError::RollbackFailed { .. } => {
                Some("use [docker rm -vf <containerID>] carefully")
            }
            ChainError::PullTimeout { .. } => Some(
                "this is likely a network problem with the registry; try again now or a bit later",
            ),
            ChainError::Setup { source, .. } => source.hint(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
