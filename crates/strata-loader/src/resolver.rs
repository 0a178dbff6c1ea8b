//! Classpath spec resolution
//!
//! Turns a comma-separated spec into the ordered entries a layer loads from
//! and the coarser locations a supervisor watches for change.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use strata_kernel::config::{Env, expand};
use strata_kernel::resource::{ResourceAccess, ResourceError, ResourceHandle, ResourceType};
use tracing::{debug, warn};

/// Why a token contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// No provider can make sense of the token.
    Unresolvable,
    /// Pattern token whose parent is missing or not a folder.
    MissingParent,
    /// The location exists but is neither a file nor a folder.
    UnsupportedType,
    /// The base name of a pattern token is not a valid regular expression.
    InvalidPattern,
    /// The resource layer failed while inspecting the token.
    Access,
}

/// A dropped token and the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveWarning {
    pub token: String,
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for ResolveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} '{}': {}", self.kind, self.token, self.message)
    }
}

/// Outcome of resolving one spec.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Loadable entries in precedence order (duplicates kept)
    pub entries: Vec<ResourceHandle>,
    /// Locations whose change requires re-resolution
    pub monitored: Vec<ResourceHandle>,
    pub warnings: Vec<ResolveWarning>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the resource layer failed hard on any token.
    pub fn has_failures(&self) -> bool {
        self.warnings.iter().any(|w| w.kind == WarningKind::Access)
    }

    fn warn(&mut self, token: &str, kind: WarningKind, message: impl ToString) {
        let warning = ResolveWarning {
            token: token.to_string(),
            kind,
            message: message.to_string(),
        };
        warn!("Dropping classpath entry: {}", warning);
        self.warnings.push(warning);
    }

    fn warn_resource(&mut self, token: &str, error: ResourceError) {
        let kind = match error {
            ResourceError::UnsupportedScheme { .. } | ResourceError::Malformed(_) => {
                WarningKind::Unresolvable
            }
            _ => WarningKind::Access,
        };
        self.warn(token, kind, error);
    }
}

/// Split a spec into trimmed, non-empty tokens.
pub fn tokens(spec: &str) -> impl Iterator<Item = &str> {
    spec.split(',').map(str::trim).filter(|t| !t.is_empty())
}

/// Resolves classpath specs against a [`ResourceAccess`].
#[derive(Clone)]
pub struct PathResolver {
    access: Arc<dyn ResourceAccess>,
}

impl PathResolver {
    pub fn new(access: Arc<dyn ResourceAccess>) -> Self {
        Self { access }
    }

    pub fn access(&self) -> &Arc<dyn ResourceAccess> {
        &self.access
    }

    /// Resolve `spec` with placeholders expanded from `env`.
    pub fn resolve(&self, spec: &str, env: &Env) -> Resolution {
        let mut resolution = Resolution::default();
        for raw in tokens(spec) {
            let token = expand(raw, env);
            self.resolve_token(&token, &mut resolution);
        }
        debug!(
            "Resolved '{}' to {} entries, {} monitored, {} warnings",
            spec,
            resolution.entries.len(),
            resolution.monitored.len(),
            resolution.warnings.len()
        );
        resolution
    }

    fn resolve_token(&self, token: &str, out: &mut Resolution) {
        let handle = match self.access.resolve(token) {
            Ok(handle) => handle,
            Err(e) => return out.warn_resource(token, e),
        };
        let kind = match self.access.resource_type(&handle) {
            Ok(kind) => kind,
            Err(e) => return out.warn_resource(token, e),
        };

        match kind {
            ResourceType::File => {
                out.entries.push(handle.clone());
                out.monitored.push(handle);
            }
            ResourceType::Folder => match self.access.children(&handle) {
                Ok(children) => {
                    out.entries.extend(children);
                    out.monitored.push(handle);
                }
                Err(e) => out.warn_resource(token, e),
            },
            ResourceType::Imaginary => self.resolve_pattern(token, &handle, out),
            ResourceType::Other => {
                out.warn(token, WarningKind::UnsupportedType, "neither a file nor a folder")
            }
        }
    }

    /// The base name of a non-existent token is a pattern over its parent's children.
    fn resolve_pattern(&self, token: &str, handle: &ResourceHandle, out: &mut Resolution) {
        let parent = match self.access.parent(handle) {
            Ok(Some(parent)) => parent,
            Ok(None) => return out.warn(token, WarningKind::MissingParent, "no parent location"),
            Err(e) => return out.warn_resource(token, e),
        };
        match self.access.resource_type(&parent) {
            Ok(ResourceType::Folder) => {}
            Ok(other) => {
                return out.warn(
                    token,
                    WarningKind::MissingParent,
                    format!("parent {} is {:?}, not a folder", parent, other),
                );
            }
            Err(e) => return out.warn_resource(token, e),
        }

        let pattern = match Regex::new(&format!("^(?:{})$", handle.base_name())) {
            Ok(pattern) => pattern,
            Err(e) => return out.warn(token, WarningKind::InvalidPattern, e),
        };

        let children = match self.access.children(&parent) {
            Ok(children) => children,
            Err(e) => return out.warn_resource(token, e),
        };
        out.monitored.push(parent);

        for child in children {
            if !pattern.is_match(child.base_name()) {
                continue;
            }
            match self.access.resource_type(&child) {
                Ok(ResourceType::File) => out.entries.push(child),
                Ok(_) => debug!("Pattern match {} is not a file, skipping", child),
                Err(e) => out.warn_resource(token, e),
            }
        }
    }
}

impl fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathResolver").finish_non_exhaustive()
    }
}
