//! Process-wide loading state
//!
//! [`ProcessState`] builds the resource-access manager, the default hierarchy
//! and the context manager lazily, exactly once, and tears them down once on
//! [`ProcessState::shutdown`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use strata_kernel::config::{Env, LoaderConfig, process_env};
use strata_kernel::resource::ResourceAccess;
use strata_kernel::unit::{CodeUnit, HostRuntime, InMemoryHost};
use strata_kernel::{LoaderError, LoaderResult};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::context::{Context, ContextManager, ContextsConfig};
use crate::diagnostics::Diagnostics;
use crate::hierarchy::{Hierarchy, HierarchyAssembler};
use crate::supervisor::{LayerAccessor, SupervisorSettings};
use crate::vfs::FileSystemManager;

/// Builder for [`ProcessState`]
pub struct ProcessStateBuilder {
    config: LoaderConfig,
    host: Option<Arc<dyn HostRuntime>>,
    env: Option<Env>,
    runtime: Option<Handle>,
    access: Option<Arc<dyn ResourceAccess>>,
    remote: bool,
}

impl ProcessStateBuilder {
    pub fn with_host(mut self, host: Arc<dyn HostRuntime>) -> Self {
        self.host = Some(host);
        self
    }

    /// Environment used for placeholder expansion (process environment by default).
    pub fn with_env(mut self, env: Env) -> Self {
        self.env = Some(env);
        self
    }

    /// Runtime the supervisors run on (the ambient runtime by default).
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Use `access` instead of building a [`FileSystemManager`].
    pub fn with_access(mut self, access: Arc<dyn ResourceAccess>) -> Self {
        self.access = Some(access);
        self
    }

    /// Register the HTTP(S) provider on the built manager.
    pub fn with_remote(mut self, enabled: bool) -> Self {
        self.remote = enabled;
        self
    }

    pub fn build(self) -> ProcessState {
        ProcessState {
            config: Arc::new(self.config),
            host: self
                .host
                .unwrap_or_else(|| Arc::new(InMemoryHost::new("strata"))),
            env: Arc::new(self.env.unwrap_or_else(process_env)),
            runtime: self.runtime,
            access: self.access,
            remote: self.remote,
            state: ArcSwapOption::empty(),
            contexts: ArcSwapOption::empty(),
            init_lock: Mutex::new(()),
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct Initialized {
    access: Arc<dyn ResourceAccess>,
    // set when the manager was built here and must be closed on shutdown
    manager: Option<Arc<FileSystemManager>>,
    settings: SupervisorSettings,
    hierarchy: Hierarchy,
    runtime: Handle,
}

/// Lazily initialized loading state for one process.
pub struct ProcessState {
    config: Arc<LoaderConfig>,
    host: Arc<dyn HostRuntime>,
    env: Arc<Env>,
    runtime: Option<Handle>,
    access: Option<Arc<dyn ResourceAccess>>,
    remote: bool,
    state: ArcSwapOption<Initialized>,
    contexts: ArcSwapOption<ContextManager>,
    init_lock: Mutex<()>,
    // shared with every accessor handed out
    shut_down: Arc<AtomicBool>,
}

impl ProcessState {
    pub fn builder(config: LoaderConfig) -> ProcessStateBuilder {
        ProcessStateBuilder {
            config,
            host: None,
            env: None,
            runtime: None,
            access: None,
            remote: true,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn ensure_live(&self) -> LoaderResult<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(LoaderError::Shutdown)
        } else {
            Ok(())
        }
    }

    fn initialized(&self) -> LoaderResult<Arc<Initialized>> {
        self.ensure_live()?;
        if let Some(state) = self.state.load_full() {
            return Ok(state);
        }

        let _guard = self.init_lock.lock();
        self.ensure_live()?;
        if let Some(state) = self.state.load_full() {
            return Ok(state);
        }

        let state = Arc::new(self.initialize()?);
        self.state.store(Some(Arc::clone(&state)));
        Ok(state)
    }

    fn initialize(&self) -> LoaderResult<Initialized> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current()
                .map_err(|e| LoaderError::Initialization(format!("no tokio runtime: {e}")))?,
        };

        let (access, manager) = match &self.access {
            Some(access) => (Arc::clone(access), None),
            None => {
                let cache_dir = self.config.cache_dir(&self.env);
                let manager = FileSystemManager::builder(&cache_dir)
                    .with_remote(self.remote)
                    .build()
                    .map_err(|e| {
                        LoaderError::Initialization(format!(
                            "resource-access manager at {}: {e}",
                            cache_dir.display()
                        ))
                    })?;
                let manager = Arc::new(manager);
                let access: Arc<dyn ResourceAccess> = Arc::clone(&manager) as Arc<dyn ResourceAccess>;
                (access, Some(manager))
            }
        };

        let settings = SupervisorSettings::from_config(&self.config, Arc::clone(&self.env));
        let assembler = HierarchyAssembler::new(
            Arc::clone(&access),
            Arc::clone(&self.config),
            settings.clone(),
        );
        let hierarchy = assembler.assemble_default(Arc::clone(&self.host), &runtime);
        info!("Loader initialized");

        Ok(Initialized {
            access,
            manager,
            settings,
            hierarchy,
            runtime,
        })
    }

    /// Lookup handle over the default hierarchy's dynamic tier. It fails
    /// lookups once the process state is shut down.
    pub fn default_accessor(&self) -> LoaderResult<LayerAccessor> {
        let state = self.initialized()?;
        Ok(LayerAccessor::new(Arc::clone(&state.hierarchy.dynamic))
            .with_shutdown_flag(Arc::clone(&self.shut_down)))
    }

    /// Load `name` through the default hierarchy.
    pub fn load_code_unit(&self, name: &str) -> LoaderResult<Arc<CodeUnit>> {
        self.default_accessor()?.load(name)
    }

    /// The context manager, created on first use.
    pub fn context_manager(&self) -> LoaderResult<Arc<ContextManager>> {
        let state = self.initialized()?;
        if let Some(contexts) = self.contexts.load_full() {
            return Ok(contexts);
        }

        let _guard = self.init_lock.lock();
        self.ensure_live()?;
        if let Some(contexts) = self.contexts.load_full() {
            return Ok(contexts);
        }

        debug!("Creating context manager");
        // contexts delegate through the default dynamic tier
        let contexts = Arc::new(ContextManager::new(
            Arc::clone(&state.hierarchy.dynamic),
            Arc::clone(&state.access),
            state.settings.clone(),
            Arc::clone(&self.config) as Arc<dyn ContextsConfig>,
            state.runtime.clone(),
        ));
        self.contexts.store(Some(Arc::clone(&contexts)));
        Ok(contexts)
    }

    /// The context named `name`, created on first use.
    pub fn context(&self, name: &str) -> LoaderResult<Arc<Context>> {
        self.context_manager()?.get(name)
    }

    /// Load `name` through context `context`.
    pub fn load_code_unit_in(&self, context: &str, name: &str) -> LoaderResult<Arc<CodeUnit>> {
        self.context(context)?.load(name)
    }

    /// Dump of the default chain and every live context.
    pub fn diagnostics(&self) -> LoaderResult<Diagnostics> {
        let state = self.initialized()?;
        let contexts = self
            .contexts
            .load_full()
            .map(|contexts| contexts.snapshot())
            .unwrap_or_default();
        Ok(Diagnostics::new(&state.hierarchy.dynamic.current(), contexts))
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop every supervisor and release the resource-access manager.
    /// Idempotent, and a no-op beyond flagging when nothing was initialized.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _guard = self.init_lock.lock();

        if let Some(contexts) = self.contexts.swap(None) {
            contexts.shutdown();
        }
        if let Some(state) = self.state.swap(None) {
            state.hierarchy.dynamic.stop();
            if let Some(manager) = &state.manager {
                manager.close();
            }
        }
        info!("Loader shut down");
    }
}

impl Drop for ProcessState {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessState")
            .field("initialized", &self.state.load().is_some())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
