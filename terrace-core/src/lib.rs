//! Terrace Core
//!
//! Core types and abstractions for the Terrace installation pipeline.
//!
//! This crate contains:
//! - Domain types: Blueprints, imports, template executors, installations and deploy items
//! - Annotation helpers shared between the pipeline, the controller and deployers
//! - A minimal filesystem abstraction used to read blueprint files

pub mod annotations;
pub mod domain;
pub mod error;
pub mod field;
pub mod fs;

pub use error::{CoreError, Result};
pub use field::FieldPath;
pub use fs::{DirFs, FileSystem, MemoryFs};
