//! Code units and the host runtime seam
//!
//! A code unit is a named blob of executable content. The loader decides which
//! byte stream backs a name; turning those bytes into something runnable is the
//! host runtime's business.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Unit extensions searched inside folders and archives when none are configured.
pub const DEFAULT_UNIT_EXTENSIONS: &[&str] = &["unit", "class", "wasm"];

/// A loaded code unit.
#[derive(Clone, PartialEq, Eq)]
pub struct CodeUnit {
    name: String,
    origin: String,
    bytes: Arc<[u8]>,
}

impl CodeUnit {
    /// Create a unit named `name` whose bytes came from `origin`.
    pub fn new(name: impl Into<String>, origin: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            bytes: bytes.into(),
        }
    }

    /// Dotted unit name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URI of the resource the unit was read from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for CodeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeUnit")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Check that a unit name is a non-empty dotted identifier path.
pub fn is_valid_unit_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '-'))
        })
}

/// Relative member paths under which `name` may be stored, one per extension.
///
/// `a.b.C` with extensions `["unit"]` maps to `a/b/C.unit`.
pub fn member_paths<'a>(name: &'a str, extensions: &'a [String]) -> impl Iterator<Item = String> + 'a {
    let base = name.replace('.', "/");
    extensions.iter().map(move |ext| format!("{base}.{ext}"))
}

/// The host runtime's own unit provider: the root of every loader chain.
///
/// Units visible here are never shadowed by anything configured in outer tiers.
pub trait HostRuntime: Send + Sync {
    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;

    /// Look up a unit the host provides natively.
    fn find_unit(&self, name: &str) -> Option<Arc<CodeUnit>>;

    /// Names of all units the host exposes, for diagnostics.
    fn unit_names(&self) -> Vec<String>;
}

/// A host runtime backed by a fixed in-memory table of units.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHost {
    name: String,
    units: BTreeMap<String, Arc<CodeUnit>>,
}

impl InMemoryHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: BTreeMap::new(),
        }
    }

    /// Register a built-in unit.
    pub fn with_unit(mut self, name: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        let origin = format!("host:{}", self.name);
        self.units
            .insert(name.to_string(), Arc::new(CodeUnit::new(name, origin, bytes)));
        self
    }
}

impl HostRuntime for InMemoryHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_unit(&self, name: &str) -> Option<Arc<CodeUnit>> {
        self.units.get(name).cloned()
    }

    fn unit_names(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }
}
