//! Terrace Controller
//!
//! Watches deploy items for deployers that never pick them up, never finish,
//! or ignore an abort request, and cleans up deployer registrations.
//!
//! Architecture:
//! - Configuration: timeouts and intervals from the environment or defaults
//! - Timeout: pure checks that mutate a deploy item in place
//! - Reconciler: fetches items, runs the checks, writes back changes
//! - Client: deploy item storage (in memory or a manifest directory)
//! - Cleanup: bounded parallel removal of a registration's deployers

pub mod cleanup;
pub mod client;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod timeout;

pub use cleanup::{
    DeployerManager, DeployerRegistration, Environment, RegistrationStore, cleanup_registration,
};
pub use client::{DeployItemClient, DirDeployItemClient, MemoryDeployItemClient};
pub use config::Config;
pub use error::{ControllerError, Result};
pub use reconciler::{DeployItemController, ReconcileResult};
pub use timeout::TimeoutDetector;
