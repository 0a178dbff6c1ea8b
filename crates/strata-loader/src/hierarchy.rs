//! Default hierarchy assembly
//!
//! host -> extra -> vfs (skipped when it resolves to nothing) -> dynamic.
//! The static tiers are built once; only the dynamic tier hot-reloads.

use std::sync::Arc;

use strata_kernel::config::LoaderConfig;
use strata_kernel::resource::{ResourceAccess, ResourceHandle};
use strata_kernel::unit::HostRuntime;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::layer::{Layer, LayerTier};
use crate::resolver::PathResolver;
use crate::supervisor::{HotReloadSupervisor, SupervisorSettings};

/// The assembled default chain.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    /// Output of the static tiers, parent of the dynamic tier and of every context.
    pub base: Arc<Layer>,
    pub dynamic: Arc<HotReloadSupervisor>,
}

/// Builds the default hierarchy from configuration.
#[derive(Clone)]
pub struct HierarchyAssembler {
    access: Arc<dyn ResourceAccess>,
    config: Arc<LoaderConfig>,
    settings: SupervisorSettings,
}

impl HierarchyAssembler {
    pub fn new(
        access: Arc<dyn ResourceAccess>,
        config: Arc<LoaderConfig>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            access,
            config,
            settings,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// host -> extra -> vfs
    pub fn assemble_base(&self, host: Arc<dyn HostRuntime>) -> Arc<Layer> {
        let resolver = PathResolver::new(Arc::clone(&self.access));
        let root = Arc::new(Layer::host(host));

        let extra = resolver.resolve(&self.config.extra_classpath, &self.settings.env);
        let mut base = Arc::new(self.static_layer(LayerTier::Extra, extra.entries, root));

        let vfs = resolver.resolve(&self.config.vfs_system_classpath, &self.settings.env);
        if vfs.is_empty() {
            debug!("Virtual-resource classpath resolved to nothing, skipping tier");
        } else {
            base = Arc::new(self.static_layer(LayerTier::Vfs, vfs.entries, base));
        }

        info!("Assembled base hierarchy ({} layers)", base.depth() + 1);
        base
    }

    fn static_layer(
        &self,
        tier: LayerTier,
        entries: Vec<ResourceHandle>,
        parent: Arc<Layer>,
    ) -> Layer {
        Layer::build(
            tier,
            0,
            entries,
            parent,
            Arc::clone(&self.access),
            Arc::clone(&self.settings.extensions),
        )
    }

    /// Start the hot-reloading tier over `parent`.
    pub fn dynamic_supervisor(&self, parent: Arc<Layer>, runtime: &Handle) -> Arc<HotReloadSupervisor> {
        let spec = self.config.effective_dynamic_classpath(&self.settings.env);
        HotReloadSupervisor::start(
            spec,
            LayerTier::Dynamic,
            parent,
            Arc::clone(&self.access),
            self.settings.clone(),
            runtime,
        )
    }

    /// Assemble the full default chain.
    pub fn assemble_default(&self, host: Arc<dyn HostRuntime>, runtime: &Handle) -> Hierarchy {
        let base = self.assemble_base(host);
        let dynamic = self.dynamic_supervisor(Arc::clone(&base), runtime);
        Hierarchy { base, dynamic }
    }
}
