//! Core domain types
//!
//! This module contains the structures that flow through the installation pipeline.
//! Wire names follow the JSON/YAML shape that blueprints and installations are
//! authored in, so every type round-trips through serde unchanged.

pub mod blueprint;
pub mod component;
pub mod deploy_item;
pub mod execution;
pub mod import;
pub mod installation;
pub mod meta;

pub use blueprint::{Blueprint, BlueprintDefinition, ExportDefinition, SubinstallationDefinition};
pub use component::{ComponentDescriptor, ComponentDescriptorList, Resource};
pub use deploy_item::{
    DeployItem, DeployItemPhase, DeployItemSpec, DeployItemSpecification, DeployItemStatus,
    DeployItemTemplate, LastError, TargetReference,
};
pub use execution::{TemplateExecutor, TemplateSource, TemplateType};
pub use import::{ImportDefinition, ImportType};
pub use installation::{Installation, InstallationTemplate};
pub use meta::{Condition, ConditionStatus, ObjectMeta, ObjectReference};
