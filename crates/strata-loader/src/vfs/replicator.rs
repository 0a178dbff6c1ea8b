//! Local staging of remote content
//!
//! Remote resources are copied into a cache directory before anything reads
//! them. Staged copies live until the handle is resolved again or the
//! replicator is closed.

use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use strata_kernel::resource::ResourceResult;

/// Stages remote content into a local cache directory.
#[derive(Debug)]
pub struct Replicator {
    dir: PathBuf,
    staged: DashMap<String, PathBuf>,
}

impl Replicator {
    /// Create a replicator staging into `dir`, creating the directory.
    pub fn new(dir: impl Into<PathBuf>) -> ResourceResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!("Replicator staging into {:?}", dir);
        Ok(Self {
            dir,
            staged: DashMap::new(),
        })
    }

    /// Staging directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name a URI is staged under: a digest prefix plus the URI's base name.
    pub fn staged_name(uri: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(uri.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        let base: String = uri
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();

        format!("{}_{}", &digest[..16], base)
    }

    /// Return the staged copy of `uri`, fetching it with `fetch` if absent.
    pub fn replicate<F>(&self, uri: &str, fetch: F) -> ResourceResult<PathBuf>
    where
        F: FnOnce() -> ResourceResult<Vec<u8>>,
    {
        if let Some(path) = self.staged.get(uri) {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        let bytes = fetch()?;
        let target = self.dir.join(Self::staged_name(uri));
        let partial = target.with_extension("partial");
        fs::write(&partial, &bytes)?;
        fs::rename(&partial, &target)?;

        info!("Staged {} ({} bytes) at {:?}", uri, bytes.len(), target);
        self.staged.insert(uri.to_string(), target.clone());
        Ok(target)
    }

    /// Forget and delete the staged copy of `uri`.
    pub fn evict(&self, uri: &str) {
        if let Some((_, path)) = self.staged.remove(uri) {
            if let Err(e) = fs::remove_file(&path) {
                debug!("Failed to remove staged copy {:?}: {}", path, e);
            }
        }
    }

    /// Number of staged copies
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Delete every staged copy and, if it is empty, the staging directory.
    pub fn close(&self) {
        let uris: Vec<String> = self.staged.iter().map(|e| e.key().clone()).collect();
        for uri in uris {
            self.evict(&uri);
        }
        if let Err(e) = fs::remove_dir(&self.dir) {
            debug!("Staging directory {:?} kept: {}", self.dir, e);
        }
    }
}
