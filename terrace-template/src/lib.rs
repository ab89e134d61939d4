//! Terrace Template Engines
//!
//! This crate provides the template engines of the installation pipeline.
//! It includes:
//! - The `Templater` trait and a registry keyed by template type
//! - The structured-text engine (`GoTemplate`, handlebars based)
//! - The declarative-merge engine (`Spiff`, YAML with Lua expressions)
//! - The Lua sandbox and helper modules used by expressions
//! - Component descriptor lookups shared by both engines

pub mod blob;
pub mod context;
pub mod error;
pub mod gotemplate;
pub mod lookup;
pub mod module;
pub mod modules;
pub mod sandbox;
pub mod spiff;
pub mod templater;

pub use blob::BlobResolver;
pub use context::TemplateContext;
pub use error::{Result, TemplateError};
pub use gotemplate::GoTemplater;
pub use module::{ModuleRegistry, TemplateModule};
pub use spiff::SpiffTemplater;
pub use templater::{TemplateOutput, Templater, TemplaterRegistry};
