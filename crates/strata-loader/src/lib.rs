//! Strata Loader
//!
//! Layered, hot-reloadable code-unit loading:
//! - [`vfs`]: the multi-scheme resource-access manager
//! - [`resolver`]: classpath spec resolution
//! - [`layer`]: parent-first loader layers
//! - [`supervisor`]: polling hot-reload of one tier
//! - [`hierarchy`]: assembly of the default chain
//! - [`context`]: named, isolated contexts
//! - [`process`]: lazily initialized process-wide state
//!
//! # Example
//!
//! ```rust,no_run
//! use strata_kernel::config::LoaderConfig;
//! use strata_loader::ProcessState;
//!
//! # async fn run() -> strata_kernel::LoaderResult<()> {
//! let state = ProcessState::builder(LoaderConfig::load("strata.toml")?).build();
//! let unit = state.load_code_unit("com.acme.Filter")?;
//! println!("{} bytes from {}", unit.len(), unit.origin());
//! state.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod diagnostics;
pub mod hierarchy;
pub mod layer;
pub mod process;
pub mod resolver;
pub mod supervisor;
pub mod vfs;

pub use context::{Context, ContextManager, ContextSummary, ContextsConfig};
pub use diagnostics::Diagnostics;
pub use hierarchy::{Hierarchy, HierarchyAssembler};
pub use layer::{Layer, LayerSummary, LayerTier};
pub use process::{ProcessState, ProcessStateBuilder};
pub use resolver::{PathResolver, Resolution, ResolveWarning, WarningKind};
pub use supervisor::{
    CheckOutcome, HotReloadSupervisor, LayerAccessor, ReloadError, ReloadEvent, SupervisorSettings,
    SupervisorStatus,
};
pub use vfs::{CacheStrategy, FileSystemManager};
