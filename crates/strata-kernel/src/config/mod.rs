//! Loader configuration
//!
//! Configuration is read with the `config` crate from a TOML, YAML or JSON
//! file (format detected from the extension) and overlaid with `STRATA__*`
//! environment variables. Classpath specs keep their `$VAR` / `${VAR}`
//! placeholders; they are expanded per token at resolution time by [`expand`].
//!
//! ## Keys
//!
//! - `extra-classpath`: static extras tier
//! - `vfs-system-classpath`: virtual-resource tier
//! - `dynamic-classpath`: hot-reloading tier
//! - `vfs-context-classpath.<name>`: per-context dynamic tier
//! - `vfs-cache-dir`: staging directory for remote content
//! - `monitor-interval-ms`: polling interval of every supervisor
//! - `unit-extensions`: extensions searched for units inside folders and archives

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::unit::DEFAULT_UNIT_EXTENSIONS;

pub const EXTRA_CLASSPATH_KEY: &str = "extra-classpath";
pub const DYNAMIC_CLASSPATH_KEY: &str = "dynamic-classpath";
pub const VFS_SYSTEM_CLASSPATH_KEY: &str = "vfs-system-classpath";
pub const VFS_CONTEXT_CLASSPATH_PREFIX: &str = "vfs-context-classpath.";
pub const VFS_CACHE_DIR_KEY: &str = "vfs-cache-dir";

/// Default spec of the hot-reloading tier: non-hidden jars in the extension directory.
pub const DEFAULT_DYNAMIC_CLASSPATH: &str = r"$STRATA_HOME/lib/ext/[^.].*\.jar";

/// Environment variable appended, comma-joined, to the dynamic classpath.
pub const EXTRA_JARS_ENV: &str = "STRATA_EXTRA_JARS";

/// Prefix of environment variables overlaid on file configuration.
pub const ENV_PREFIX: &str = "STRATA";

pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1000;

/// Configuration error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Environment snapshot used for placeholder expansion.
pub type Env = HashMap<String, String>;

/// Snapshot of the current process environment.
pub fn process_env() -> Env {
    std::env::vars().collect()
}

/// Detect configuration format from file extension
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("placeholder pattern is a valid regex")
});

/// Expand `${VAR}` and `$VAR` placeholders in `path` from `env`.
///
/// Unknown variables are left verbatim. Substituted values are not expanded
/// again.
pub fn expand(path: &str, env: &Env) -> String {
    VAR_PATTERN
        .replace_all(path, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            env.get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Expand placeholders from the current process environment.
pub fn substitute_env_vars(content: &str) -> String {
    expand(content, &process_env())
}

fn default_dynamic_classpath() -> String {
    DEFAULT_DYNAMIC_CLASSPATH.to_string()
}

fn default_monitor_interval_ms() -> u64 {
    DEFAULT_MONITOR_INTERVAL_MS
}

fn default_unit_extensions() -> Vec<String> {
    DEFAULT_UNIT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

/// Loader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoaderConfig {
    /// Spec of the static extras tier
    #[serde(default, alias = "extra_classpath")]
    pub extra_classpath: String,

    /// Spec of the virtual-resource tier
    #[serde(default, alias = "vfs_system_classpath")]
    pub vfs_system_classpath: String,

    /// Spec of the hot-reloading tier
    #[serde(default = "default_dynamic_classpath", alias = "dynamic_classpath")]
    pub dynamic_classpath: String,

    /// Per-context specs keyed by context name
    #[serde(default, alias = "vfs_context_classpath")]
    pub vfs_context_classpath: HashMap<String, String>,

    /// Staging directory for remote content
    #[serde(default, alias = "vfs_cache_dir")]
    pub vfs_cache_dir: Option<String>,

    /// Polling interval of every supervisor
    #[serde(default = "default_monitor_interval_ms", alias = "monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Extensions searched for units inside folders and archives
    #[serde(default = "default_unit_extensions", alias = "unit_extensions")]
    pub unit_extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extra_classpath: String::new(),
            vfs_system_classpath: String::new(),
            dynamic_classpath: default_dynamic_classpath(),
            vfs_context_classpath: HashMap::new(),
            vfs_cache_dir: None,
            monitor_interval_ms: default_monitor_interval_ms(),
            unit_extensions: default_unit_extensions(),
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a file, overlaid with `STRATA__*` environment variables.
    ///
    /// `STRATA__DYNAMIC_CLASSPATH` overrides `dynamic-classpath`,
    /// `STRATA__VFS_CONTEXT_CLASSPATH__T1` sets the spec of context `t1`.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_with_env(path, ENV_PREFIX)
    }

    /// Load from a file, overlaid with environment variables under `env_prefix`.
    pub fn load_with_env(path: impl AsRef<Path>, env_prefix: &str) -> ConfigResult<Self> {
        let path = path.as_ref();
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;

        let config = Cfg::builder()
            .add_source(File::from_str(&content, format))
            .add_source(Environment::with_prefix(env_prefix).separator("__"))
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;
        config.validate().inspect_err(|e| warn!("Rejected {}: {}", path.display(), e))?;
        debug!(
            "Loaded loader config from {} ({} contexts)",
            path.display(),
            config.vfs_context_classpath.len()
        );
        Ok(config)
    }

    /// Parse from a string with an explicit format, without environment overlay.
    pub fn from_str(content: &str, format: FileFormat) -> ConfigResult<Self> {
        let config = Cfg::builder()
            .add_source(File::from_str(content, format))
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the loader cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.monitor_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor-interval-ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the dynamic classpath
    pub fn with_dynamic_classpath(mut self, spec: impl Into<String>) -> Self {
        self.dynamic_classpath = spec.into();
        self
    }

    /// Set the extras classpath
    pub fn with_extra_classpath(mut self, spec: impl Into<String>) -> Self {
        self.extra_classpath = spec.into();
        self
    }

    /// Set the virtual-resource classpath
    pub fn with_vfs_system_classpath(mut self, spec: impl Into<String>) -> Self {
        self.vfs_system_classpath = spec.into();
        self
    }

    /// Configure the classpath of a named context
    pub fn with_context_classpath(mut self, name: &str, spec: impl Into<String>) -> Self {
        self.vfs_context_classpath.insert(name.to_string(), spec.into());
        self
    }

    /// Set the remote staging directory
    pub fn with_cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.vfs_cache_dir = Some(dir.into());
        self
    }

    /// Set the polling interval
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Polling interval, never shorter than one millisecond.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }

    /// Spec of a named context, if configured
    pub fn context_classpath(&self, name: &str) -> Option<&str> {
        self.vfs_context_classpath.get(name).map(String::as_str)
    }

    /// Spec of the hot-reloading tier with `STRATA_EXTRA_JARS` appended.
    pub fn effective_dynamic_classpath(&self, env: &Env) -> String {
        let extra = env
            .get(EXTRA_JARS_ENV)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());

        match extra {
            Some(jars) if self.dynamic_classpath.trim().is_empty() => jars.to_string(),
            Some(jars) => format!("{},{}", self.dynamic_classpath, jars),
            None => self.dynamic_classpath.clone(),
        }
    }

    /// Staging directory for remote content: `vfs-cache-dir` when set,
    /// otherwise `<temp>/strata-vfs-cache-<user>`.
    pub fn cache_dir(&self, env: &Env) -> PathBuf {
        if let Some(dir) = self.vfs_cache_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return PathBuf::from(expand(dir.trim(), env));
        }
        let user = env
            .get("USER")
            .or_else(|| env.get("USERNAME"))
            .filter(|u| !u.is_empty())
            .map(String::as_str)
            .unwrap_or("nouser");
        std::env::temp_dir().join(format!("strata-vfs-cache-{user}"))
    }
}
