//! Strata Testing
//!
//! Fixtures shared by the cross-crate integration tests: throwaway classpath
//! trees on disk, archive writers and a resource-access wrapper that fails on
//! demand.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use strata_kernel::config::Env;
use strata_kernel::resource::{
    Fingerprint, ResourceAccess, ResourceError, ResourceHandle, ResourceResult, ResourceType,
};
use strata_loader::supervisor::SupervisorSettings;
use strata_loader::vfs::FileSystemManager;
use tempfile::TempDir;

/// Extension every fixture unit is written with.
pub const UNIT_EXTENSION: &str = "unit";

/// A temporary directory tree holding classpath entries.
pub struct Workspace {
    root: TempDir,
}

impl Workspace {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            root: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Absolute path of `rel`, as a classpath token.
    pub fn token(&self, rel: &str) -> String {
        self.root.path().join(rel).to_string_lossy().into_owned()
    }

    /// Create the folder `rel` and any missing parents.
    pub fn dir(&self, rel: &str) -> io::Result<PathBuf> {
        let path = self.root.path().join(rel);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Write `bytes` to `rel`, creating parents.
    pub fn file(&self, rel: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.root.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Write a zip archive at `rel` holding `members`.
    pub fn zip(&self, rel: &str, members: &[(&str, &[u8])]) -> io::Result<PathBuf> {
        let path = self.root.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_zip(&path, members)?;
        Ok(path)
    }

    /// A local-only resource-access manager staging under this workspace.
    pub fn manager(&self) -> ResourceResult<Arc<FileSystemManager>> {
        let manager = FileSystemManager::builder(self.root.path().join(".staging"))
            .with_remote(false)
            .build()?;
        Ok(Arc::new(manager))
    }
}

/// Write a zip archive at `path` holding `members`.
pub fn write_zip(path: &Path, members: &[(&str, &[u8])]) -> io::Result<()> {
    let mut writer = zip::ZipWriter::new(File::create(path)?);
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in members {
        writer.start_file(*name, options).map_err(io::Error::other)?;
        writer.write_all(bytes)?;
    }
    writer.finish().map_err(io::Error::other)?;
    Ok(())
}

/// Supervisor settings for `.unit` files with an empty environment.
///
/// Tests drive checks through `check_now`, so `interval` is usually long.
pub fn settings(interval: Duration) -> SupervisorSettings {
    SupervisorSettings {
        interval,
        extensions: vec![UNIT_EXTENSION.to_string()].into(),
        env: Arc::new(Env::new()),
    }
}

/// Settings whose monitor never fires during a test.
pub fn manual_settings() -> SupervisorSettings {
    settings(Duration::from_secs(3600))
}

/// Wraps a [`ResourceAccess`] and fails folder listings while tripped.
pub struct FlakyAccess<A> {
    inner: A,
    failing: AtomicBool,
    failures: AtomicUsize,
}

impl<A: ResourceAccess> FlakyAccess<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
        }
    }

    /// Start or stop failing `children`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of listings refused so far
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl<A: ResourceAccess> ResourceAccess for FlakyAccess<A> {
    fn resolve(&self, uri: &str) -> ResourceResult<ResourceHandle> {
        self.inner.resolve(uri)
    }

    fn resource_type(&self, handle: &ResourceHandle) -> ResourceResult<ResourceType> {
        self.inner.resource_type(handle)
    }

    fn children(&self, handle: &ResourceHandle) -> ResourceResult<Vec<ResourceHandle>> {
        if self.failing.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(ResourceError::from(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("listing of {handle} refused"),
            )));
        }
        self.inner.children(handle)
    }

    fn parent(&self, handle: &ResourceHandle) -> ResourceResult<Option<ResourceHandle>> {
        self.inner.parent(handle)
    }

    fn read(&self, handle: &ResourceHandle) -> ResourceResult<Vec<u8>> {
        self.inner.read(handle)
    }

    fn member(&self, handle: &ResourceHandle, path: &str) -> ResourceResult<Option<Vec<u8>>> {
        self.inner.member(handle, path)
    }

    fn fingerprint(&self, handle: &ResourceHandle) -> ResourceResult<Fingerprint> {
        self.inner.fingerprint(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flaky_access_trips_listings_only() {
        let workspace = Workspace::new().unwrap();
        workspace.file("lib/a.unit", b"a").unwrap();
        let access = FlakyAccess::new(workspace.manager().unwrap());
        let lib = access.resolve(&workspace.token("lib")).unwrap();

        assert_eq!(access.children(&lib).unwrap().len(), 1);

        access.set_failing(true);
        assert!(access.children(&lib).is_err());
        assert_eq!(access.resource_type(&lib).unwrap(), ResourceType::Folder);
        assert!(access.fingerprint(&lib).unwrap().exists);
        assert_eq!(access.failures(), 1);

        access.set_failing(false);
        assert!(access.children(&lib).is_ok());
    }
}
