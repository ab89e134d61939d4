//! Terrace Installation Pipeline
//!
//! Computes what an installation deploys. It includes:
//! - Persistence of opaque per-execution template state
//! - Import construction, data mappings and offline import validation
//! - The execution orchestrator driving the template engines
//! - Target reference resolution and deploy item materialization
//! - Component resolution and offline blueprint rendering

pub mod deploy_items;
pub mod error;
pub mod imports;
pub mod options;
pub mod orchestrator;
pub mod render;
pub mod resolver;
pub mod state;
pub mod target;

pub use error::{PipelineError, Result};
pub use imports::{ConstructedImports, ImportConstructor, ImportOperation, ImportedValues};
pub use options::{BlueprintExecutionOptions, DeployExecutionOptions, ExportExecutionOptions};
pub use orchestrator::{ExecutionKind, ExecutionOrchestrator, ImportExecutionResult};
pub use render::{BlueprintRenderOut, RenderArgs, render_blueprint};
pub use resolver::{ComponentResolver, LocalBlobResolver, LocalComponentResolver};
pub use state::{InstallationStateHandler, MemoryStateHandler, StateError, StateHandler};
