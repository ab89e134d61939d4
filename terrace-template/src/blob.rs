//! Access to resource blobs of a component

use std::fmt;

use terrace_core::domain::component::Resource;

use crate::error::Result;

/// Fetches the content of component resources
///
/// Template helpers use this to inline resource content into rendered output.
pub trait BlobResolver: Send + Sync + fmt::Debug {
    /// Returns the raw bytes of the given resource
    fn fetch(&self, resource: &Resource) -> Result<Vec<u8>>;
}
