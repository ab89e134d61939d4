//! Helper modules available to declarative-merge expressions

pub mod codec;
pub mod component;

pub use codec::{Base64Module, JsonModule, YamlModule};
pub use component::ComponentModule;
