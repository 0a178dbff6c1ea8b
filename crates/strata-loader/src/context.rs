//! Named loading contexts
//!
//! Each context owns an independent supervisor chained to the default
//! hierarchy, so tenants reload and die independently of each other.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use strata_kernel::config::LoaderConfig;
use strata_kernel::resource::ResourceAccess;
use strata_kernel::unit::CodeUnit;
use strata_kernel::{LoaderError, LoaderResult};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::layer::{Layer, LayerSummary, LayerTier};
use crate::supervisor::{HotReloadSupervisor, ParentLayer, SupervisorSettings, SupervisorStatus};

/// Source of per-context classpath specs.
pub trait ContextsConfig: Send + Sync {
    /// Spec configured for `name`, if any
    fn context_spec(&self, name: &str) -> Option<String>;

    /// Every configured context name
    fn context_names(&self) -> Vec<String>;
}

impl ContextsConfig for LoaderConfig {
    fn context_spec(&self, name: &str) -> Option<String> {
        self.context_classpath(name).map(str::to_string)
    }

    fn context_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vfs_context_classpath.keys().cloned().collect();
        names.sort();
        names
    }
}

/// A named, isolated loading scope.
#[derive(Debug)]
pub struct Context {
    name: String,
    supervisor: Arc<HotReloadSupervisor>,
    // shared with the manager
    shut_down: Arc<AtomicBool>,
}

impl Context {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supervisor(&self) -> &Arc<HotReloadSupervisor> {
        &self.supervisor
    }

    /// Load through the published layer; fails once the manager shut down.
    pub fn load(&self, name: &str) -> LoaderResult<Arc<CodeUnit>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(LoaderError::Shutdown);
        }
        self.supervisor.load(name)
    }

    pub fn current(&self) -> Arc<Layer> {
        self.supervisor.current()
    }
}

/// Serializable view of one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    pub name: String,
    pub status: SupervisorStatus,
    pub layer: LayerSummary,
}

/// Registry entry of one name. The context is published once built; `init`
/// serializes creation for this name only.
#[derive(Default)]
struct Slot {
    init: Mutex<()>,
    context: ArcSwapOption<Context>,
}

/// Registry of contexts keyed by name.
pub struct ContextManager {
    contexts: DashMap<String, Arc<Slot>>,
    parent: ParentLayer,
    access: Arc<dyn ResourceAccess>,
    settings: SupervisorSettings,
    config: Arc<dyn ContextsConfig>,
    runtime: Handle,
    shut_down: Arc<AtomicBool>,
}

impl ContextManager {
    pub fn new(
        parent: impl Into<ParentLayer>,
        access: Arc<dyn ResourceAccess>,
        settings: SupervisorSettings,
        config: Arc<dyn ContextsConfig>,
        runtime: Handle,
    ) -> Self {
        Self {
            contexts: DashMap::new(),
            parent: parent.into(),
            access,
            settings,
            config,
            runtime,
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_live(&self) -> LoaderResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(LoaderError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// The context named `name`, created on first use.
    pub fn get(&self, name: &str) -> LoaderResult<Arc<Context>> {
        self.ensure_live()?;
        if let Some(context) = self.contexts.get(name).and_then(|slot| slot.context.load_full()) {
            return Ok(context);
        }

        let spec = self
            .config
            .context_spec(name)
            .ok_or_else(|| LoaderError::UnknownContext(name.to_string()))?;
        let slot = Arc::clone(self.contexts.entry(name.to_string()).or_default().value());

        // the shard guard is released; only callers of this name wait here
        let _guard = slot.init.lock();
        self.ensure_live()?;
        if let Some(context) = slot.context.load_full() {
            return Ok(context);
        }

        let supervisor = HotReloadSupervisor::start(
            spec,
            LayerTier::Context(name.to_string()),
            self.parent.clone(),
            Arc::clone(&self.access),
            self.settings.clone(),
            &self.runtime,
        );
        info!("Created context '{}'", name);
        let context = Arc::new(Context {
            name: name.to_string(),
            supervisor,
            shut_down: Arc::clone(&self.shut_down),
        });
        slot.context.store(Some(Arc::clone(&context)));
        Ok(context)
    }

    /// Stop and evict `name`. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let Some((_, slot)) = self.contexts.remove(name) else {
            return false;
        };
        let _guard = slot.init.lock();
        match slot.context.swap(None) {
            Some(context) => {
                context.supervisor.stop();
                info!("Removed context '{}'", name);
                true
            }
            None => false,
        }
    }

    fn live(&self) -> Vec<Arc<Context>> {
        self.contexts
            .iter()
            .filter_map(|e| e.value().context.load_full())
            .collect()
    }

    /// Stop and evict every context not in `in_use`; returns the evicted names.
    pub fn retain(&self, in_use: &HashSet<String>) -> Vec<String> {
        let stale: Vec<String> = self
            .names()
            .into_iter()
            .filter(|name| !in_use.contains(name))
            .collect();

        let mut evicted: Vec<String> = stale.into_iter().filter(|name| self.remove(name)).collect();
        evicted.sort();
        if !evicted.is_empty() {
            debug!("Evicted unused contexts: {:?}", evicted);
        }
        evicted
    }

    /// Point-in-time view of every context, sorted by name.
    pub fn snapshot(&self) -> Vec<ContextSummary> {
        let mut summaries: Vec<ContextSummary> = self
            .live()
            .iter()
            .map(|context| ContextSummary {
                name: context.name.clone(),
                status: context.supervisor.status(),
                layer: context.current().summary(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Names of live contexts, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.live().iter().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    /// Context names available in configuration
    pub fn configured_names(&self) -> Vec<String> {
        self.config.context_names()
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop every context and clear the registry. Contexts already handed
    /// out fail further lookups. Idempotent.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let names: Vec<String> = self.contexts.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.remove(&name);
        }
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("contexts", &self.names())
            .finish()
    }
}
