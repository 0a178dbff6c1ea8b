//! Resource metadata cache

use dashmap::DashMap;
use strata_kernel::resource::{ResourceHandle, ResourceType};
use tracing::debug;

/// Default number of cached entries before the cache is flushed.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// When cached metadata is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Refresh a location each time it is resolved.
    #[default]
    OnResolve,
    /// Never cache; ask the provider on every call.
    OnCall,
    /// Keep entries until they are explicitly invalidated.
    Manual,
}

/// Cache of resource types keyed by canonical URI.
#[derive(Debug)]
pub struct FilesCache {
    entries: DashMap<String, ResourceType>,
    capacity: usize,
    strategy: CacheStrategy,
}

impl FilesCache {
    pub fn new(strategy: CacheStrategy) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: DEFAULT_CACHE_CAPACITY,
            strategy,
        }
    }

    /// Set the entry limit.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    /// Cached type of `handle`, if any.
    pub fn get(&self, handle: &ResourceHandle) -> Option<ResourceType> {
        if self.strategy == CacheStrategy::OnCall {
            return None;
        }
        self.entries.get(handle.uri()).map(|e| *e)
    }

    /// Remember the type of `handle`.
    pub fn put(&self, handle: &ResourceHandle, kind: ResourceType) {
        if self.strategy == CacheStrategy::OnCall {
            return;
        }
        if self.entries.len() >= self.capacity {
            debug!("Files cache reached {} entries, flushing", self.capacity);
            self.entries.clear();
        }
        self.entries.insert(handle.uri().to_string(), kind);
    }

    /// Forget the type of `handle`.
    pub fn invalidate(&self, handle: &ResourceHandle) {
        self.entries.remove(handle.uri());
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
