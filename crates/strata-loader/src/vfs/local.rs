//! Local file provider (`file:` URIs and plain paths)

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use strata_kernel::resource::{
    ChildStamp, Fingerprint, ResourceError, ResourceHandle, ResourceResult, ResourceType,
};

use super::provider::ResourceProvider;

/// Convert an absolute path into a `file://` URI.
pub fn path_to_uri(path: &Path) -> String {
    let text = path.to_string_lossy();
    // backslash is a legal file-name character (and regex escape) off Windows
    let text = if cfg!(windows) {
        text.replace('\\', "/")
    } else {
        text.into_owned()
    };
    let text = if text.len() > 1 {
        text.trim_end_matches('/').to_string()
    } else {
        text
    };
    if text.starts_with('/') {
        format!("file://{text}")
    } else {
        format!("file:///{text}")
    }
}

/// Convert a `file:` URI (or a plain path) into a filesystem path.
pub fn uri_to_path(uri: &str) -> PathBuf {
    let rest = uri
        .strip_prefix("file://")
        .or_else(|| uri.strip_prefix("file:"))
        .unwrap_or(uri);

    // file:///C:/lib -> C:/lib
    let bytes = rest.as_bytes();
    if bytes.len() > 2 && bytes[0] == b'/' && bytes[1].is_ascii_alphabetic() && bytes[2] == b':' {
        return PathBuf::from(&rest[1..]);
    }
    PathBuf::from(rest)
}

/// Provider for the local filesystem.
#[derive(Debug, Default)]
pub struct LocalFileProvider;

impl LocalFileProvider {
    pub fn new() -> Self {
        Self
    }

    fn stamp(path: &Path) -> ResourceResult<Option<fs::Metadata>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ResourceProvider for LocalFileProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn schemes(&self) -> &[&'static str] {
        &["file"]
    }

    fn resolve(&self, uri: &str) -> ResourceResult<ResourceHandle> {
        let path = uri_to_path(uri);
        if path.as_os_str().is_empty() {
            return Err(ResourceError::Malformed(uri.to_string()));
        }
        let path = std::path::absolute(&path)?;
        Ok(ResourceHandle::new(path_to_uri(&path)))
    }

    fn resource_type(&self, handle: &ResourceHandle) -> ResourceResult<ResourceType> {
        let path = uri_to_path(handle.uri());
        Ok(match Self::stamp(&path)? {
            None => ResourceType::Imaginary,
            Some(meta) if meta.is_file() => ResourceType::File,
            Some(meta) if meta.is_dir() => ResourceType::Folder,
            Some(_) => ResourceType::Other,
        })
    }

    fn children(&self, handle: &ResourceHandle) -> ResourceResult<Vec<ResourceHandle>> {
        let path = uri_to_path(handle.uri());
        let mut names = Vec::new();
        for entry in fs::read_dir(&path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Ok(names
            .into_iter()
            .map(|name| ResourceHandle::new(path_to_uri(&path.join(name))))
            .collect())
    }

    fn parent(&self, handle: &ResourceHandle) -> Option<ResourceHandle> {
        let path = uri_to_path(handle.uri());
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| ResourceHandle::new(path_to_uri(p)))
    }

    fn fingerprint(&self, handle: &ResourceHandle) -> ResourceResult<Fingerprint> {
        let path = uri_to_path(handle.uri());
        let Some(meta) = Self::stamp(&path)? else {
            return Ok(Fingerprint::missing());
        };

        let mut children = Vec::new();
        if meta.is_dir() {
            for entry in fs::read_dir(&path)? {
                let entry = entry?;
                // a child removed between listing and stat is picked up next probe
                let (modified, len) = match entry.metadata() {
                    Ok(m) => (m.modified().ok(), m.len()),
                    Err(_) => (None, 0),
                };
                children.push(ChildStamp {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    modified,
                    len,
                });
            }
            children.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(Fingerprint {
            exists: true,
            modified: meta.modified().ok(),
            len: if meta.is_dir() { 0 } else { meta.len() },
            tag: None,
            children,
        })
    }

    fn local_path(&self, handle: &ResourceHandle) -> ResourceResult<PathBuf> {
        Ok(uri_to_path(handle.uri()))
    }
}
