//! Scheme providers
//!
//! A provider answers resource questions for the URI schemes it registers.
//! Content is always exposed as a local path: local providers hand out the
//! file itself, remote providers stage a copy through the replicator.

use std::path::PathBuf;

use strata_kernel::resource::{Fingerprint, ResourceHandle, ResourceResult, ResourceType};

/// Resource provider for one or more URI schemes.
pub trait ResourceProvider: Send + Sync {
    /// Provider name for diagnostics
    fn name(&self) -> &'static str;

    /// Schemes this provider serves
    fn schemes(&self) -> &[&'static str];

    /// Canonicalize a URI into a handle. Must not fail for locations that
    /// merely do not exist.
    fn resolve(&self, uri: &str) -> ResourceResult<ResourceHandle>;

    /// Classify the location
    fn resource_type(&self, handle: &ResourceHandle) -> ResourceResult<ResourceType>;

    /// Immediate children, ordered by name
    fn children(&self, handle: &ResourceHandle) -> ResourceResult<Vec<ResourceHandle>>;

    /// Parent location
    fn parent(&self, handle: &ResourceHandle) -> Option<ResourceHandle>;

    /// Modification probe
    fn fingerprint(&self, handle: &ResourceHandle) -> ResourceResult<Fingerprint>;

    /// Local filesystem path holding the content of the handle.
    fn local_path(&self, handle: &ResourceHandle) -> ResourceResult<PathBuf>;

    /// Drop any state held for the handle (staged copies, cached metadata).
    /// Called whenever the handle is resolved again.
    fn refresh(&self, _handle: &ResourceHandle) {}

    /// Release clients and connections. Called when the manager closes.
    fn close(&self) {}
}
