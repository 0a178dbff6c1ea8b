//! Virtual file system
//!
//! [`FileSystemManager`] is the production [`ResourceAccess`]: it dispatches
//! URIs to scheme providers, opens archives through scheme prefixes
//! (`jar:file:///lib/a.jar`) or file extensions, and caches resource types.

pub mod archive;
pub mod cache;
#[cfg(feature = "remote")]
pub mod http;
pub mod local;
pub mod provider;
pub mod replicator;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_kernel::resource::{
    ArchiveKind, Fingerprint, ResourceAccess, ResourceError, ResourceHandle, ResourceResult,
    ResourceType, split_scheme,
};
use tracing::{debug, info};

pub use cache::{CacheStrategy, FilesCache};
#[cfg(feature = "remote")]
pub use http::HttpProvider;
pub use local::LocalFileProvider;
pub use provider::ResourceProvider;
pub use replicator::Replicator;

/// Builder for [`FileSystemManager`]
pub struct FileSystemManagerBuilder {
    cache_dir: PathBuf,
    strategy: CacheStrategy,
    capacity: Option<usize>,
    providers: Vec<Arc<dyn ResourceProvider>>,
    remote: bool,
}

impl FileSystemManagerBuilder {
    /// Register an extra provider. Later registrations win for a shared scheme.
    pub fn with_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_cache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Register the HTTP(S) provider (requires the `remote` feature).
    pub fn with_remote(mut self, enabled: bool) -> Self {
        self.remote = enabled;
        self
    }

    /// Create the staging directory and wire up the providers.
    pub fn build(self) -> ResourceResult<FileSystemManager> {
        let replicator = Arc::new(Replicator::new(&self.cache_dir)?);

        let mut providers: HashMap<String, Arc<dyn ResourceProvider>> = HashMap::new();
        let mut all: Vec<Arc<dyn ResourceProvider>> = vec![Arc::new(LocalFileProvider::new())];
        if self.remote {
            all.extend(remote_providers(&replicator));
        }
        all.extend(self.providers);
        for provider in all {
            for scheme in provider.schemes() {
                debug!("Registering provider '{}' for scheme '{}'", provider.name(), scheme);
                providers.insert(scheme.to_ascii_lowercase(), Arc::clone(&provider));
            }
        }

        let mut cache = FilesCache::new(self.strategy);
        if let Some(capacity) = self.capacity {
            cache = cache.with_capacity(capacity);
        }

        let mut schemes: Vec<&String> = providers.keys().collect();
        schemes.sort();
        info!(
            "File system manager ready (schemes: {:?}, staging: {:?})",
            schemes, self.cache_dir
        );

        Ok(FileSystemManager {
            providers,
            cache,
            replicator,
            closed: AtomicBool::new(false),
        })
    }
}

#[cfg(feature = "remote")]
fn remote_providers(replicator: &Arc<Replicator>) -> Vec<Arc<dyn ResourceProvider>> {
    vec![Arc::new(HttpProvider::new(Arc::clone(replicator)))]
}

#[cfg(not(feature = "remote"))]
fn remote_providers(_replicator: &Arc<Replicator>) -> Vec<Arc<dyn ResourceProvider>> {
    Vec::new()
}

/// Multi-scheme [`ResourceAccess`] implementation.
pub struct FileSystemManager {
    providers: HashMap<String, Arc<dyn ResourceProvider>>,
    cache: FilesCache,
    replicator: Arc<Replicator>,
    closed: AtomicBool,
}

impl FileSystemManager {
    pub fn builder(cache_dir: impl Into<PathBuf>) -> FileSystemManagerBuilder {
        FileSystemManagerBuilder {
            cache_dir: cache_dir.into(),
            strategy: CacheStrategy::default(),
            capacity: None,
            providers: Vec::new(),
            remote: true,
        }
    }

    /// Manager with the local provider and, when compiled in, HTTP(S).
    pub fn standard(cache_dir: impl Into<PathBuf>) -> ResourceResult<Self> {
        Self::builder(cache_dir).build()
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.providers.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Staging directory for remote content
    pub fn cache_dir(&self) -> &std::path::Path {
        self.replicator.dir()
    }

    pub fn cache_strategy(&self) -> CacheStrategy {
        self.cache.strategy()
    }

    /// Release cached state and staged copies. Every later call fails with
    /// [`ResourceError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cache.clear();
        for provider in self.providers.values() {
            provider.close();
        }
        self.replicator.close();
        info!("File system manager closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> ResourceResult<()> {
        if self.is_closed() {
            Err(ResourceError::Closed)
        } else {
            Ok(())
        }
    }

    fn provider_for(&self, scheme: &str, uri: &str) -> ResourceResult<&Arc<dyn ResourceProvider>> {
        self.providers
            .get(&scheme.to_ascii_lowercase())
            .ok_or_else(|| ResourceError::UnsupportedScheme {
                scheme: scheme.to_string(),
                uri: uri.to_string(),
            })
    }

    fn provider(&self, handle: &ResourceHandle) -> ResourceResult<&Arc<dyn ResourceProvider>> {
        self.ensure_open()?;
        self.provider_for(handle.scheme(), handle.uri())
    }

    fn read_local(path: &std::path::Path, uri: &str) -> ResourceResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                debug!("Failed to read {:?} for {}: {}", path, uri, e);
                Err(e.into())
            }
        }
    }
}

impl fmt::Debug for FileSystemManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemManager")
            .field("schemes", &self.schemes())
            .field("strategy", &self.cache.strategy())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ResourceAccess for FileSystemManager {
    fn resolve(&self, uri: &str) -> ResourceResult<ResourceHandle> {
        self.ensure_open()?;
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(ResourceError::Malformed(uri.to_string()));
        }

        if let Some((scheme, rest)) = split_scheme(uri) {
            if let Some(kind) = ArchiveKind::from_scheme(scheme) {
                let inner = rest.trim_end_matches("!/").trim_end_matches('!');
                if inner.is_empty() {
                    return Err(ResourceError::Malformed(uri.to_string()));
                }
                return Ok(self.resolve(inner)?.with_archive(kind));
            }
        }

        let scheme = split_scheme(uri).map(|(s, _)| s).unwrap_or("file");
        let provider = self.provider_for(scheme, uri)?;
        let handle = provider.resolve(uri)?;

        if self.cache.strategy() == CacheStrategy::OnResolve {
            provider.refresh(&handle);
            self.cache.invalidate(&handle);
        }
        Ok(handle)
    }

    fn resource_type(&self, handle: &ResourceHandle) -> ResourceResult<ResourceType> {
        let provider = self.provider(handle)?;
        if let Some(kind) = self.cache.get(handle) {
            return Ok(kind);
        }
        let kind = provider.resource_type(handle)?;
        self.cache.put(handle, kind);
        Ok(kind)
    }

    fn children(&self, handle: &ResourceHandle) -> ResourceResult<Vec<ResourceHandle>> {
        let provider = self.provider(handle)?;
        let children = provider.children(handle)?;
        if self.cache.strategy() == CacheStrategy::OnResolve {
            for child in &children {
                self.cache.invalidate(child);
            }
        }
        Ok(children)
    }

    fn parent(&self, handle: &ResourceHandle) -> ResourceResult<Option<ResourceHandle>> {
        Ok(self.provider(handle)?.parent(handle))
    }

    fn read(&self, handle: &ResourceHandle) -> ResourceResult<Vec<u8>> {
        let provider = self.provider(handle)?;
        let path = provider.local_path(handle)?;
        Self::read_local(&path, handle.uri())?
            .ok_or_else(|| ResourceError::NotFound(handle.uri().to_string()))
    }

    fn member(&self, handle: &ResourceHandle, path: &str) -> ResourceResult<Option<Vec<u8>>> {
        if !archive::is_safe_member(path) {
            return Ok(None);
        }
        let provider = self.provider(handle)?;

        match self.resource_type(handle)? {
            ResourceType::Folder => {
                let candidate = provider.local_path(handle)?.join(path);
                if !candidate.is_file() {
                    return Ok(None);
                }
                Self::read_local(&candidate, handle.uri())
            }
            ResourceType::File => match handle.archive_kind() {
                Some(kind) => {
                    let local = provider.local_path(handle)?;
                    archive::read_member(kind, &local, path)
                }
                None => Ok(None),
            },
            ResourceType::Imaginary | ResourceType::Other => Ok(None),
        }
    }

    fn fingerprint(&self, handle: &ResourceHandle) -> ResourceResult<Fingerprint> {
        self.provider(handle)?.fingerprint(handle)
    }
}

impl Drop for FileSystemManager {
    fn drop(&mut self) {
        self.close();
    }
}
