//! HTTP(S) provider
//!
//! Remote locations are single files. Their content is staged through the
//! [`Replicator`] before anything reads it, and change is detected from the
//! `Content-Length`, `ETag` and `Last-Modified` response headers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, LAST_MODIFIED};
use strata_kernel::resource::{
    Fingerprint, ResourceError, ResourceHandle, ResourceResult, ResourceType,
};
use tracing::debug;

use super::provider::ResourceProvider;
use super::replicator::Replicator;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Provider for `http:` and `https:` URIs.
pub struct HttpProvider {
    // Built on first use so the blocking client is never created on an async thread.
    client: Mutex<Option<Client>>,
    replicator: Arc<Replicator>,
}

impl HttpProvider {
    pub fn new(replicator: Arc<Replicator>) -> Self {
        Self {
            client: Mutex::new(None),
            replicator,
        }
    }

    fn remote_error(uri: &str, message: impl ToString) -> ResourceError {
        ResourceError::Remote {
            uri: uri.to_string(),
            message: message.to_string(),
        }
    }

    fn client(&self, uri: &str) -> ResourceResult<Client> {
        let mut guard = self.client.lock();
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Self::remote_error(uri, e))?;
        *guard = Some(client.clone());
        Ok(client)
    }

    fn head(&self, uri: &str) -> ResourceResult<Response> {
        self.client(uri)?
            .head(uri)
            .send()
            .map_err(|e| Self::remote_error(uri, e))
    }

    fn is_missing(status: StatusCode) -> bool {
        status == StatusCode::NOT_FOUND || status == StatusCode::GONE
    }
}

impl ResourceProvider for HttpProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    fn schemes(&self) -> &[&'static str] {
        &["http", "https"]
    }

    fn resolve(&self, uri: &str) -> ResourceResult<ResourceHandle> {
        let url = reqwest::Url::parse(uri).map_err(|_| ResourceError::Malformed(uri.to_string()))?;
        if url.host_str().is_none() {
            return Err(ResourceError::Malformed(uri.to_string()));
        }
        Ok(ResourceHandle::new(url.as_str().to_string()))
    }

    fn resource_type(&self, handle: &ResourceHandle) -> ResourceResult<ResourceType> {
        let response = self.head(handle.uri())?;
        let status = response.status();
        if status.is_success() {
            Ok(ResourceType::File)
        } else if Self::is_missing(status) {
            Ok(ResourceType::Imaginary)
        } else {
            Err(Self::remote_error(handle.uri(), format!("HEAD returned {status}")))
        }
    }

    fn children(&self, handle: &ResourceHandle) -> ResourceResult<Vec<ResourceHandle>> {
        Err(ResourceError::Unsupported {
            op: "list children",
            uri: handle.uri().to_string(),
        })
    }

    fn parent(&self, handle: &ResourceHandle) -> Option<ResourceHandle> {
        let mut url = reqwest::Url::parse(handle.uri()).ok()?;
        let path = url.path().trim_end_matches('/').to_string();
        let (parent, _) = path.rsplit_once('/')?;
        url.set_path(if parent.is_empty() { "/" } else { parent });
        url.set_query(None);
        Some(ResourceHandle::new(url.as_str().to_string()))
    }

    fn fingerprint(&self, handle: &ResourceHandle) -> ResourceResult<Fingerprint> {
        let response = self.head(handle.uri())?;
        let status = response.status();
        if Self::is_missing(status) {
            return Ok(Fingerprint::missing());
        }
        if !status.is_success() {
            return Err(Self::remote_error(handle.uri(), format!("HEAD returned {status}")));
        }

        let headers = response.headers();
        let len = header_str(headers, CONTENT_LENGTH)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_default();
        let tag = header_str(headers, ETAG)
            .or_else(|| header_str(headers, LAST_MODIFIED))
            .map(str::to_string);

        Ok(Fingerprint {
            exists: true,
            modified: None,
            len,
            tag,
            children: Vec::new(),
        })
    }

    fn local_path(&self, handle: &ResourceHandle) -> ResourceResult<PathBuf> {
        let uri = handle.uri();
        self.replicator.replicate(uri, || {
            debug!("Fetching {}", uri);
            let response = self
                .client(uri)?
                .get(uri)
                .send()
                .and_then(Response::error_for_status)
                .map_err(|e| Self::remote_error(uri, e))?;
            let bytes = response.bytes().map_err(|e| Self::remote_error(uri, e))?;
            Ok(bytes.to_vec())
        })
    }

    fn refresh(&self, handle: &ResourceHandle) {
        self.replicator.evict(handle.uri());
    }

    fn close(&self) {
        if self.client.lock().take().is_some() {
            debug!("Released HTTP client");
        }
    }
}
