//! Resource-access seam
//!
//! The loader never touches bytes on its own. Everything it knows about a
//! location comes through [`ResourceAccess`]: resolving a URI to a handle,
//! classifying it, listing children, reading content and probing for change.

mod error;

pub use error::{ResourceError, ResourceResult};

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Kind of a resolved resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// A single readable resource (plain file or archive).
    File,
    /// A container whose immediate children can be listed.
    Folder,
    /// A syntactically valid location that does not exist.
    Imaginary,
    /// Anything else (sockets, devices, ...).
    Other,
}

/// Archive format a file resource can be opened as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// zip, jar, war, ear, par, sar, ejb3
    Zip,
    /// Plain tar
    Tar,
    /// Gzip-compressed tar (tgz, tar.gz)
    TarGz,
    /// Single gzip-compressed member
    Gzip,
}

impl ArchiveKind {
    /// Archive kind implied by an archive scheme prefix (`jar:file:///x.jar`).
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "zip" | "jar" | "war" | "ear" | "par" | "sar" | "ejb3" => Some(Self::Zip),
            "tar" => Some(Self::Tar),
            "tgz" => Some(Self::TarGz),
            "gz" => Some(Self::Gzip),
            _ => None,
        }
    }

    /// Archive kind implied by a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") {
            return Some(Self::TarGz);
        }
        let ext = lower.rsplit_once('.').map(|(_, ext)| ext)?;
        Self::from_scheme(ext)
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tgz",
            Self::Gzip => "gz",
        };
        f.write_str(name)
    }
}

/// Split `scheme:rest` off a URI.
///
/// Single-letter prefixes are not schemes so that `C:\lib` stays a path.
pub fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if scheme.len() < 2 || !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some((scheme, rest))
    } else {
        None
    }
}

/// Cheap, cloneable reference to a location known to a [`ResourceAccess`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    uri: Arc<str>,
    archive: Option<ArchiveKind>,
}

impl ResourceHandle {
    /// Create a handle for a canonical URI.
    pub fn new(uri: impl Into<Arc<str>>) -> Self {
        Self {
            uri: uri.into(),
            archive: None,
        }
    }

    /// Mark the handle as an archive of the given kind.
    pub fn with_archive(mut self, kind: ArchiveKind) -> Self {
        self.archive = Some(kind);
        self
    }

    /// Canonical URI
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Scheme of the URI, `file` when the URI carries none.
    pub fn scheme(&self) -> &str {
        split_scheme(&self.uri).map(|(s, _)| s).unwrap_or("file")
    }

    /// Explicit archive kind, if the handle was resolved through an archive scheme.
    pub fn archive(&self) -> Option<ArchiveKind> {
        self.archive
    }

    /// Last path segment of the URI.
    pub fn base_name(&self) -> &str {
        let path = split_scheme(&self.uri)
            .map(|(_, rest)| rest)
            .unwrap_or(&self.uri);
        let path = path.trim_end_matches('/');
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Archive format this handle should be opened as: the explicit kind, or
    /// the one implied by its base name.
    pub fn archive_kind(&self) -> Option<ArchiveKind> {
        self.archive
            .or_else(|| ArchiveKind::from_file_name(self.base_name()))
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.archive {
            Some(kind) => write!(f, "{}:{}", kind, self.uri),
            None => f.write_str(&self.uri),
        }
    }
}

/// Modification stamp of one immediate child of a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildStamp {
    pub name: String,
    pub modified: Option<SystemTime>,
    pub len: u64,
}

/// Cheap modification probe result used for change detection.
///
/// Two fingerprints of the same location compare equal iff nothing observable
/// changed between the probes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fingerprint {
    pub exists: bool,
    pub modified: Option<SystemTime>,
    pub len: u64,
    /// Opaque validator for resources without a reliable mtime (ETag, Last-Modified).
    pub tag: Option<String>,
    /// Stamps of the immediate children, sorted by name. Empty for files.
    pub children: Vec<ChildStamp>,
}

impl Fingerprint {
    /// Fingerprint of a location that does not exist.
    pub fn missing() -> Self {
        Self::default()
    }
}

/// The virtual-resource-access layer consumed by the loader.
pub trait ResourceAccess: Send + Sync {
    /// Resolve a URI or path to a handle. Non-existent locations resolve to a
    /// handle of type [`ResourceType::Imaginary`].
    fn resolve(&self, uri: &str) -> ResourceResult<ResourceHandle>;

    /// Classify a handle.
    fn resource_type(&self, handle: &ResourceHandle) -> ResourceResult<ResourceType>;

    /// Immediate children of a folder, ordered by name.
    fn children(&self, handle: &ResourceHandle) -> ResourceResult<Vec<ResourceHandle>>;

    /// Parent location, if the handle has one.
    fn parent(&self, handle: &ResourceHandle) -> ResourceResult<Option<ResourceHandle>>;

    /// Full content of a file resource.
    fn read(&self, handle: &ResourceHandle) -> ResourceResult<Vec<u8>>;

    /// Content of a member at `path` inside a folder or archive handle.
    /// Returns `Ok(None)` when the handle holds no such member.
    fn member(&self, handle: &ResourceHandle, path: &str) -> ResourceResult<Option<Vec<u8>>>;

    /// Probe the location for change detection.
    fn fingerprint(&self, handle: &ResourceHandle) -> ResourceResult<Fingerprint>;
}

impl<T: ResourceAccess + ?Sized> ResourceAccess for Arc<T> {
    fn resolve(&self, uri: &str) -> ResourceResult<ResourceHandle> {
        (**self).resolve(uri)
    }

    fn resource_type(&self, handle: &ResourceHandle) -> ResourceResult<ResourceType> {
        (**self).resource_type(handle)
    }

    fn children(&self, handle: &ResourceHandle) -> ResourceResult<Vec<ResourceHandle>> {
        (**self).children(handle)
    }

    fn parent(&self, handle: &ResourceHandle) -> ResourceResult<Option<ResourceHandle>> {
        (**self).parent(handle)
    }

    fn read(&self, handle: &ResourceHandle) -> ResourceResult<Vec<u8>> {
        (**self).read(handle)
    }

    fn member(&self, handle: &ResourceHandle, path: &str) -> ResourceResult<Option<Vec<u8>>> {
        (**self).member(handle, path)
    }

    fn fingerprint(&self, handle: &ResourceHandle) -> ResourceResult<Fingerprint> {
        (**self).fingerprint(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_scheme() {
        assert_eq!(split_scheme("file:///tmp/a"), Some(("file", "///tmp/a")));
        assert_eq!(split_scheme("jar:file:///a.jar"), Some(("jar", "file:///a.jar")));
        assert_eq!(split_scheme("C:\\lib\\a.jar"), None);
        assert_eq!(split_scheme("/plain/path"), None);
        assert_eq!(split_scheme("1abc:rest"), None);
    }

    #[test]
    fn test_handle_base_name() {
        let handle = ResourceHandle::new("file:///opt/strata/lib/ext/a.jar");
        assert_eq!(handle.base_name(), "a.jar");
        assert_eq!(handle.scheme(), "file");

        let dir = ResourceHandle::new("file:///opt/strata/lib/");
        assert_eq!(dir.base_name(), "lib");

        let remote = ResourceHandle::new("https://repo.example.com/libs/x.tgz");
        assert_eq!(remote.scheme(), "https");
        assert_eq!(remote.archive_kind(), Some(ArchiveKind::TarGz));
    }

    #[test]
    fn test_archive_kind_detection() {
        assert_eq!(ArchiveKind::from_file_name("a.jar"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_file_name("a.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_file_name("a.gz"), Some(ArchiveKind::Gzip));
        assert_eq!(ArchiveKind::from_file_name("a.TAR"), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::from_file_name("a.unit"), None);
        assert_eq!(ArchiveKind::from_file_name("noext"), None);

        let forced = ResourceHandle::new("file:///x.bin").with_archive(ArchiveKind::Zip);
        assert_eq!(forced.archive_kind(), Some(ArchiveKind::Zip));
        assert_eq!(forced.to_string(), "zip:file:///x.bin");
    }
}
