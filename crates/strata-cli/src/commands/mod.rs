//! Command implementations

pub mod classpath;
pub mod contexts;
pub mod load;
pub mod watch;

use std::path::Path;

use strata_kernel::config::LoaderConfig;
use tracing::debug;

use crate::error::CliResult;

/// Load the configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> CliResult<LoaderConfig> {
    match path {
        Some(path) => {
            debug!("Loading configuration from {:?}", path);
            Ok(LoaderConfig::load(path)?)
        }
        None => Ok(LoaderConfig::default()),
    }
}

/// Run loader calls off the async workers; resolution and remote fetches block.
pub async fn blocking<T, F>(f: F) -> CliResult<T>
where
    F: FnOnce() -> CliResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
