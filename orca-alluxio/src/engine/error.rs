use thiserror::Error;

use crate::client::{CommandError, PortPoolError, ReleaseError, StoreError};

/// Error taxonomy of the engine core. Parse and configuration errors
/// are terminal for the operation that hit them; `NotReady` is a
/// retry-on-next-tick signal for the hosting reconcile loop.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed human-readable size, report text or persisted YAML.
    #[error("parse error: {0}")]
    Parse(String),

    /// The cluster component backing the operation is not responsive
    /// yet; expected to clear on a later reconcile.
    #[error("{0} is not ready")]
    NotReady(String),

    /// The port pool could not satisfy the requested count; the
    /// deployment config is unusable and the pipeline aborts.
    #[error(transparent)]
    Allocation(#[from] PortPoolError),

    /// The same mount-option key was supplied through more than one
    /// channel; ambiguous intent is never merged silently.
    #[error(
        "the option {0} is set more than once, check the dataset options and encryptOptions"
    )]
    ConfigurationConflict(String),

    /// Invalid declarative input (e.g. a volume mount referencing an
    /// undeclared volume).
    #[error("invalid spec: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Release(#[from] ReleaseError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
