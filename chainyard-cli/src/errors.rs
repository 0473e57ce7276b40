use chainyard::{ChainError, ErrorClass};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("No chain given and no chain checked out (use: chainyard checkout <name>)")]
    NoChainSelected,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl CliError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CliError::Chain(e) => e.class(),
            CliError::NoChainSelected => ErrorClass::NotFound,
        }
    }

    /// Remediation hint, if the underlying error carries one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Chain(e) => e.hint(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
