//! Import resolution
//!
//! Turns the values fetched for an installation into the `imports` map seen
//! by templates: data mappings first, then typed construction with
//! required-ness and schema checks, then the blueprint's import executions.

mod constructor;
mod mappings;
mod operation;
mod schema;
mod validate;
mod values;

pub use constructor::{ConstructedImports, ImportConstructor, construct_imports};
pub use mappings::{DataMappings, template_data_mappings};
pub use operation::ImportOperation;
pub use schema::validate_schema;
pub use validate::{FieldError, validate_imports};
pub use values::{ImportProvider, ImportProviders, ImportedValues};
