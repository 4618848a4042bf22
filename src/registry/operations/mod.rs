//! Registry operations grouped by resource kind
//!
//! [`RegistryClient`](crate::registry::RegistryClient) composes these and
//! exposes them through the [`Registry`](crate::registry::Registry) trait.

pub mod blob_operations;
pub mod manifest_operations;

pub use blob_operations::BlobOperations;
pub use manifest_operations::ManifestOperations;
