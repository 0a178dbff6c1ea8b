//! Strata Kernel
//!
//! Core vocabulary shared by every strata crate:
//! - [`resource`]: the resource-access seam the loader resolves through
//! - [`unit`]: code units and the host runtime seam
//! - [`config`]: loader configuration and placeholder expansion
//! - [`error`]: the caller-facing error taxonomy

// config module
pub mod config;

// error module
pub mod error;
pub use error::{LoaderError, LoaderResult};

// resource module
pub mod resource;
pub use resource::{
    ArchiveKind, ChildStamp, Fingerprint, ResourceAccess, ResourceError, ResourceHandle,
    ResourceResult, ResourceType,
};

// unit module
pub mod unit;
pub use unit::{CodeUnit, HostRuntime, InMemoryHost};
