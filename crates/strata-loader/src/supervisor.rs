//! Hot-reload supervisor
//!
//! Owns the published layer of one tier. A background task probes the
//! monitored locations at a fixed interval; when anything changed the spec is
//! resolved again and a fresh layer is swapped in atomically. Holders of the
//! previous layer keep using it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use strata_kernel::config::{Env, LoaderConfig};
use strata_kernel::resource::{Fingerprint, ResourceAccess, ResourceHandle};
use strata_kernel::unit::CodeUnit;
use strata_kernel::{LoaderError, LoaderResult};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::layer::{Layer, LayerTier};
use crate::resolver::{PathResolver, tokens};

/// Capacity of the reload event channel
const EVENT_CAPACITY: usize = 64;

/// Shortest polling period a monitor task runs with
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Reload errors
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reload events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    /// A new layer was published
    Swapped { generation: u64, entries: usize },
    /// A check failed and the previous layer was kept
    ReloadFailed { error: String },
    /// The supervisor was stopped
    Stopped,
}

/// Result of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Unchanged,
    Swapped(u64),
    Stopped,
    /// Empty spec: the parent is published and nothing is monitored.
    Passthrough,
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorStatus {
    Running,
    Passthrough,
    Stopped,
}

/// Settings shared by every supervisor of a process.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub interval: Duration,
    pub extensions: Arc<[String]>,
    pub env: Arc<Env>,
}

impl SupervisorSettings {
    pub fn from_config(config: &LoaderConfig, env: Arc<Env>) -> Self {
        Self {
            interval: config.monitor_interval(),
            extensions: config.unit_extensions.clone().into(),
            env,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Where a supervised tier finds its parent layer.
#[derive(Debug, Clone)]
pub enum ParentLayer {
    /// A layer that never changes
    Fixed(Arc<Layer>),
    /// Whatever another supervisor publishes at build time
    Supervised(Arc<HotReloadSupervisor>),
}

impl ParentLayer {
    pub fn current(&self) -> Arc<Layer> {
        match self {
            Self::Fixed(layer) => Arc::clone(layer),
            Self::Supervised(supervisor) => supervisor.current(),
        }
    }
}

impl From<Arc<Layer>> for ParentLayer {
    fn from(layer: Arc<Layer>) -> Self {
        Self::Fixed(layer)
    }
}

impl From<Arc<HotReloadSupervisor>> for ParentLayer {
    fn from(supervisor: Arc<HotReloadSupervisor>) -> Self {
        Self::Supervised(supervisor)
    }
}

struct MonitorSnapshot {
    paths: Vec<ResourceHandle>,
    // None where the probe failed
    fingerprints: Vec<Option<Fingerprint>>,
}

/// Supervises one hot-reloading tier.
pub struct HotReloadSupervisor {
    tier: LayerTier,
    spec: String,
    parent: ParentLayer,
    resolver: PathResolver,
    settings: SupervisorSettings,
    current: ArcSwap<Layer>,
    monitor: Mutex<MonitorSnapshot>,
    passthrough: bool,
    enabled: AtomicBool,
    generation: AtomicU64,
    event_tx: broadcast::Sender<ReloadEvent>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl HotReloadSupervisor {
    /// Resolve `spec`, publish the first layer and start polling on `runtime`.
    ///
    /// An empty spec publishes `parent` itself and starts nothing. A
    /// supervised parent is read again whenever a layer is built, and a check
    /// rebuilds once the parent has published a newer layer.
    pub fn start(
        spec: impl Into<String>,
        tier: LayerTier,
        parent: impl Into<ParentLayer>,
        access: Arc<dyn ResourceAccess>,
        settings: SupervisorSettings,
        runtime: &Handle,
    ) -> Arc<Self> {
        let spec = spec.into();
        let parent = parent.into();
        let resolver = PathResolver::new(Arc::clone(&access));
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let passthrough = tokens(&spec).next().is_none();

        if passthrough {
            debug!("Empty spec for {} tier, publishing parent", tier);
            return Arc::new(Self {
                tier,
                spec,
                current: ArcSwap::new(parent.current()),
                parent,
                resolver,
                settings,
                monitor: Mutex::new(MonitorSnapshot {
                    paths: Vec::new(),
                    fingerprints: Vec::new(),
                }),
                passthrough: true,
                enabled: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                event_tx,
                shutdown_tx: Mutex::new(None),
            });
        }

        let resolution = resolver.resolve(&spec, &settings.env);
        let layer = Layer::build(
            tier.clone(),
            1,
            resolution.entries,
            parent.current(),
            access,
            Arc::clone(&settings.extensions),
        );
        let fingerprints = probe(resolver.access().as_ref(), &resolution.monitored);
        info!(
            "Started {} supervisor: {} entries, {} monitored, polling every {:?}",
            tier,
            layer.entries().len(),
            resolution.monitored.len(),
            settings.interval
        );

        let supervisor = Arc::new(Self {
            tier,
            spec,
            current: ArcSwap::new(Arc::new(layer)),
            parent,
            resolver,
            settings,
            monitor: Mutex::new(MonitorSnapshot {
                paths: resolution.monitored,
                fingerprints,
            }),
            passthrough: false,
            enabled: AtomicBool::new(true),
            generation: AtomicU64::new(1),
            event_tx,
            shutdown_tx: Mutex::new(None),
        });
        supervisor.spawn_monitor(runtime);
        supervisor
    }

    fn spawn_monitor(self: &Arc<Self>, runtime: &Handle) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let weak = Arc::downgrade(self);
        let interval = self.settings.interval.max(MIN_INTERVAL);
        let tier = self.tier.clone();

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let Some(supervisor) = weak.upgrade() else {
                            break;
                        };
                        if !supervisor.is_running() {
                            break;
                        }
                        match tokio::task::spawn_blocking(move || supervisor.check_now()).await {
                            Ok(Ok(CheckOutcome::Stopped)) => break,
                            Ok(_) => {}
                            Err(e) => error!("Check task for {} tier panicked: {}", tier, e),
                        }
                    }
                }
            }
            debug!("Monitor task for {} tier exited", tier);
        });
    }

    /// Run one check synchronously.
    pub fn check_now(&self) -> Result<CheckOutcome, ReloadError> {
        if self.passthrough {
            return Ok(CheckOutcome::Passthrough);
        }
        if !self.is_running() {
            return Ok(CheckOutcome::Stopped);
        }

        let mut snapshot = self.monitor.lock();
        let access = self.resolver.access();
        let fresh = probe(access.as_ref(), &snapshot.paths);
        let probe_failed = fresh.iter().any(Option::is_none);
        let parent = self.parent.current();
        let parent_moved = !self
            .current
            .load()
            .parent()
            .is_some_and(|p| Arc::ptr_eq(p, &parent));
        if !probe_failed && !parent_moved && fresh == snapshot.fingerprints {
            return Ok(CheckOutcome::Unchanged);
        }

        if parent_moved {
            debug!("Parent of {} tier was swapped, rebuilding", self.tier);
        } else {
            debug!("Change detected under {} tier, re-resolving", self.tier);
        }
        let resolution = self.resolver.resolve(&self.spec, &self.settings.env);
        if resolution.has_failures() {
            let message = resolution
                .warnings
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(
                "Reload of {} tier failed, keeping generation {}: {}",
                self.tier,
                self.generation(),
                message
            );
            let _ = self.event_tx.send(ReloadEvent::ReloadFailed {
                error: message.clone(),
            });
            return Err(ReloadError::Resolution(message));
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let layer = Layer::build(
            self.tier.clone(),
            generation,
            resolution.entries,
            parent,
            Arc::clone(access),
            Arc::clone(&self.settings.extensions),
        );
        let entries = layer.entries().len();
        snapshot.fingerprints = probe(access.as_ref(), &resolution.monitored);
        snapshot.paths = resolution.monitored;
        self.current.store(Arc::new(layer));

        info!(
            "Swapped {} layer to generation {} ({} entries)",
            self.tier, generation, entries
        );
        let _ = self.event_tx.send(ReloadEvent::Swapped {
            generation,
            entries,
        });
        Ok(CheckOutcome::Swapped(generation))
    }

    /// Currently published layer; a passthrough publishes its parent's.
    pub fn current(&self) -> Arc<Layer> {
        if self.passthrough {
            return self.parent.current();
        }
        self.current.load_full()
    }

    /// Load through the currently published layer.
    pub fn load(&self, name: &str) -> LoaderResult<Arc<CodeUnit>> {
        if self.passthrough {
            return self.parent.current().load(name);
        }
        self.current.load().load(name)
    }

    /// Generation of the newest layer built, 0 for a passthrough.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn tier(&self) -> &LayerTier {
        &self.tier
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn is_running(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SupervisorStatus {
        if self.passthrough {
            SupervisorStatus::Passthrough
        } else if self.is_running() {
            SupervisorStatus::Running
        } else {
            SupervisorStatus::Stopped
        }
    }

    /// Locations probed on each check
    pub fn monitored_paths(&self) -> Vec<ResourceHandle> {
        self.monitor.lock().paths.clone()
    }

    /// Subscribe to reload events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.event_tx.subscribe()
    }

    /// Stop polling. Idempotent; the published layer stays readable and a
    /// check already in flight may still publish.
    pub fn stop(&self) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.try_send(());
        }
        info!("Stopped {} supervisor", self.tier);
        let _ = self.event_tx.send(ReloadEvent::Stopped);
    }
}

fn probe(access: &dyn ResourceAccess, paths: &[ResourceHandle]) -> Vec<Option<Fingerprint>> {
    paths
        .iter()
        .map(|path| match access.fingerprint(path) {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                debug!("Probe of {} failed: {}", path, e);
                None
            }
        })
        .collect()
}

impl Drop for HotReloadSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for HotReloadSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotReloadSupervisor")
            .field("tier", &self.tier)
            .field("spec", &self.spec)
            .field("status", &self.status())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Cloneable lookup handle over a supervisor's published layer.
///
/// Lookups fail with [`LoaderError::Shutdown`] once the owner has raised the
/// shared shutdown flag.
#[derive(Debug, Clone)]
pub struct LayerAccessor {
    supervisor: Arc<HotReloadSupervisor>,
    shut_down: Arc<AtomicBool>,
}

impl LayerAccessor {
    pub fn new(supervisor: Arc<HotReloadSupervisor>) -> Self {
        Self {
            supervisor,
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share `flag` with the owner that tears the supervisor down.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shut_down = flag;
        self
    }

    pub fn load(&self, name: &str) -> LoaderResult<Arc<CodeUnit>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(LoaderError::Shutdown);
        }
        self.supervisor.load(name)
    }

    pub fn current(&self) -> Arc<Layer> {
        self.supervisor.current()
    }

    pub fn supervisor(&self) -> &Arc<HotReloadSupervisor> {
        &self.supervisor
    }
}
