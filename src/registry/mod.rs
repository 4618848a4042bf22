//! Registry module for Docker Registry HTTP API v2 interactions
//!
//! [`Registry`] is the capability set the migration engine consumes. The
//! HTTP implementation is [`RegistryClient`]; tests substitute in-memory
//! registries behind the same trait.

pub mod client;
pub mod operations;

pub use client::{RegistryClient, RegistryClientBuilder};

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Streaming blob body. Dropping it closes the underlying connection.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Manifest as served by a registry
#[derive(Debug, Clone)]
pub struct FetchedManifest {
    pub media_type: String,
    pub payload: Bytes,
    pub digest: String,
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// Whether a manifest exists for `repository:reference`
    async fn has_manifest(&self, repository: &str, reference: &str) -> Result<bool>;

    /// Digest of the manifest stored under `repository:reference`
    async fn manifest_digest(&self, repository: &str, reference: &str) -> Result<String>;

    async fn has_layer(&self, repository: &str, digest: &str) -> Result<bool>;

    async fn download_layer(&self, repository: &str, digest: &str) -> Result<BlobReader>;

    async fn upload_layer(
        &self,
        repository: &str,
        digest: &str,
        content: BlobReader,
    ) -> Result<()>;

    /// Store a manifest and return the digest the registry assigned to it
    async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        payload: Bytes,
    ) -> Result<String>;

    async fn fetch_manifest(&self, repository: &str, reference: &str) -> Result<FetchedManifest>;
}
