//! Crate-level error types for `strata-kernel`.
//!
//! [`LoaderError`] is what end callers of the loading service see. Resolution
//! warnings and failed reload checks are absorbed and logged further down; only
//! lookup misses, unknown contexts, initialization failures and use after
//! shutdown surface here.

use crate::config::ConfigError;
use crate::resource::ResourceError;
use thiserror::Error;

/// Errors surfaced to callers of the loading service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoaderError {
    /// The unit is absent from the entire delegation chain.
    #[error("Code unit not found: {0}")]
    UnitNotFound(String),

    /// No classpath is configured for the requested context.
    #[error("Unknown context: {0}")]
    UnknownContext(String),

    /// The resource-access manager or base layer could not be built.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// The process state was shut down.
    #[error("Loader has been shut down")]
    Shutdown,

    /// A resource-access failure surfaced while reading a unit.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// A configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;
