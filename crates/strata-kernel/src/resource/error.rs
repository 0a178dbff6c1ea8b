//! Typed errors for the resource-access layer.

use thiserror::Error;

/// Errors surfaced by a [`ResourceAccess`](super::ResourceAccess) implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResourceError {
    /// No provider is registered for the URI scheme.
    #[error("Unsupported scheme '{scheme}' in {uri}")]
    UnsupportedScheme { scheme: String, uri: String },

    /// The URI could not be parsed into a resource location.
    #[error("Malformed resource URI: {0}")]
    Malformed(String),

    /// The resource does not exist where an existing resource was required.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The operation is not meaningful for the resource (e.g. listing a file).
    #[error("Operation '{op}' not supported for {uri}")]
    Unsupported { op: &'static str, uri: String },

    /// Reading an archive failed.
    #[error("Archive error in {uri}: {message}")]
    Archive { uri: String, message: String },

    /// A remote fetch failed.
    #[error("Remote error for {uri}: {message}")]
    Remote { uri: String, message: String },

    /// The resource-access manager was closed.
    #[error("Resource-access manager is closed")]
    Closed,

    /// An I/O error surfaced while touching the resource.
    #[error("Resource I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Result alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
