//! Loader layers
//!
//! A [`Layer`] is one delegation scope: an ordered list of entries plus a
//! single parent. Lookup is parent-first, so a unit supplied closer to the
//! host root always shadows a duplicate further out.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use strata_kernel::resource::{ResourceAccess, ResourceHandle, ResourceResult};
use strata_kernel::unit::{CodeUnit, HostRuntime, is_valid_unit_name, member_paths};
use strata_kernel::{LoaderError, LoaderResult};
use tracing::{debug, warn};

/// Position of a layer in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayerTier {
    Host,
    Extra,
    Vfs,
    Dynamic,
    Context(String),
}

impl fmt::Display for LayerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Extra => f.write_str("extra"),
            Self::Vfs => f.write_str("vfs"),
            Self::Dynamic => f.write_str("dynamic"),
            Self::Context(name) => write!(f, "context:{name}"),
        }
    }
}

enum LayerSource {
    Host(Arc<dyn HostRuntime>),
    Entries {
        access: Arc<dyn ResourceAccess>,
        entries: Vec<ResourceHandle>,
        extensions: Arc<[String]>,
    },
}

/// Serializable view of a single layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub tier: String,
    pub generation: u64,
    pub entries: Vec<String>,
    pub defined_units: usize,
}

/// One loader scope in a parent-first delegation chain.
pub struct Layer {
    tier: LayerTier,
    generation: u64,
    source: LayerSource,
    parent: Option<Arc<Layer>>,
    defined: RwLock<HashMap<String, Arc<CodeUnit>>>,
}

impl Layer {
    /// The root of every chain.
    pub fn host(host: Arc<dyn HostRuntime>) -> Self {
        Self {
            tier: LayerTier::Host,
            generation: 0,
            source: LayerSource::Host(host),
            parent: None,
            defined: RwLock::new(HashMap::new()),
        }
    }

    /// Layer over `entries`, delegating to `parent` first.
    pub fn build(
        tier: LayerTier,
        generation: u64,
        entries: Vec<ResourceHandle>,
        parent: Arc<Layer>,
        access: Arc<dyn ResourceAccess>,
        extensions: Arc<[String]>,
    ) -> Self {
        debug!(
            "Building {} layer (generation {}) with {} entries",
            tier,
            generation,
            entries.len()
        );
        Self {
            tier,
            generation,
            source: LayerSource::Entries {
                access,
                entries,
                extensions,
            },
            parent: Some(parent),
            defined: RwLock::new(HashMap::new()),
        }
    }

    pub fn tier(&self) -> &LayerTier {
        &self.tier
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn parent(&self) -> Option<&Arc<Layer>> {
        self.parent.as_ref()
    }

    /// Entries in precedence order; empty for the host root.
    pub fn entries(&self) -> &[ResourceHandle] {
        match &self.source {
            LayerSource::Host(_) => &[],
            LayerSource::Entries { entries, .. } => entries,
        }
    }

    /// Self, then each parent up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &Layer> {
        std::iter::successors(Some(self), |layer| layer.parent.as_deref())
    }

    /// Number of layers from the root, the root being 0.
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }

    /// Units this layer has supplied so far.
    pub fn defined_count(&self) -> usize {
        self.defined.read().len()
    }

    /// Load `name`, asking the root first and this layer last.
    pub fn load(&self, name: &str) -> LoaderResult<Arc<CodeUnit>> {
        if !is_valid_unit_name(name) {
            return Err(LoaderError::UnitNotFound(name.to_string()));
        }

        let mut chain: Vec<&Layer> = self.ancestors().collect();
        chain.reverse();
        for layer in chain {
            if let Some(unit) = layer.find_local(name) {
                return Ok(unit);
            }
        }
        Err(LoaderError::UnitNotFound(name.to_string()))
    }

    fn find_local(&self, name: &str) -> Option<Arc<CodeUnit>> {
        if let Some(unit) = self.defined.read().get(name) {
            return Some(Arc::clone(unit));
        }

        let (access, entries, extensions) = match &self.source {
            LayerSource::Host(host) => return host.find_unit(name),
            LayerSource::Entries {
                access,
                entries,
                extensions,
            } => (access, entries, extensions),
        };

        for entry in entries {
            match Self::find_in_entry(access.as_ref(), entry, name, extensions) {
                Ok(Some(unit)) => {
                    let unit = Arc::new(unit);
                    let mut defined = self.defined.write();
                    // a concurrent lookup may have won the race
                    let unit = defined.entry(name.to_string()).or_insert(unit);
                    return Some(Arc::clone(unit));
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping entry {} while loading {}: {}", entry, name, e),
            }
        }
        None
    }

    fn find_in_entry(
        access: &dyn ResourceAccess,
        entry: &ResourceHandle,
        name: &str,
        extensions: &[String],
    ) -> ResourceResult<Option<CodeUnit>> {
        for path in member_paths(name, extensions) {
            if let Some(bytes) = access.member(entry, &path)? {
                let origin = format!("{entry}!/{path}");
                return Ok(Some(CodeUnit::new(name, origin, bytes)));
            }
        }

        if entry.archive_kind().is_none() {
            let base = entry.base_name();
            let is_unit_file = extensions.iter().any(|ext| {
                base.strip_suffix(ext.as_str())
                    .and_then(|stem| stem.strip_suffix('.'))
                    == Some(name)
            });
            if is_unit_file {
                let bytes = access.read(entry)?;
                return Ok(Some(CodeUnit::new(name, entry.uri(), bytes)));
            }
        }
        Ok(None)
    }

    /// Serializable view of this layer alone.
    pub fn summary(&self) -> LayerSummary {
        let entries = match &self.source {
            LayerSource::Host(host) => vec![format!("host:{}", host.name())],
            LayerSource::Entries { entries, .. } => {
                entries.iter().map(ToString::to_string).collect()
            }
        };
        LayerSummary {
            tier: self.tier.to_string(),
            generation: self.generation,
            entries,
            defined_units: self.defined_count(),
        }
    }

    /// Summaries of the whole chain, root first.
    pub fn describe(&self) -> Vec<LayerSummary> {
        let mut chain: Vec<LayerSummary> = self.ancestors().map(Layer::summary).collect();
        chain.reverse();
        chain
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("tier", &self.tier)
            .field("generation", &self.generation)
            .field("entries", &self.entries().len())
            .field("depth", &self.depth())
            .finish()
    }
}
