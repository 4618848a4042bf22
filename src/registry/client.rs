//! HTTP implementation of [`Registry`] for Docker Registry API v2 endpoints

use crate::error::{MigrateError, Result};
use crate::registry::operations::{BlobOperations, ManifestOperations};
use crate::registry::{BlobReader, FetchedManifest, Registry};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use url::Url;

pub struct RegistryClientBuilder {
    address: String,
    skip_tls: bool,
    timeout: Duration,
}

impl RegistryClientBuilder {
    pub fn new(address: String) -> Self {
        Self {
            address,
            skip_tls: false,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    /// Connect and per-read timeout; long transfers are not cut off as long as data flows
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let address = normalize_address(&self.address)?;

        let client = Client::builder()
            .danger_accept_invalid_certs(self.skip_tls)
            .connect_timeout(self.timeout)
            .read_timeout(self.timeout)
            .user_agent(concat!("image-migrator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(RegistryClient {
            blobs: BlobOperations::new(client.clone(), address.clone()),
            manifests: ManifestOperations::new(client, address.clone()),
            address,
        })
    }
}

pub struct RegistryClient {
    address: String,
    blobs: BlobOperations,
    manifests: ManifestOperations,
}

impl RegistryClient {
    pub fn new(address: &str, skip_tls: bool) -> Result<Self> {
        Self::builder(address.to_string())
            .with_skip_tls(skip_tls)
            .build()
    }

    pub fn builder(address: String) -> RegistryClientBuilder {
        RegistryClientBuilder::new(address)
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn has_manifest(&self, repository: &str, reference: &str) -> Result<bool> {
        self.manifests.manifest_exists(repository, reference).await
    }

    async fn manifest_digest(&self, repository: &str, reference: &str) -> Result<String> {
        self.manifests.manifest_digest(repository, reference).await
    }

    async fn has_layer(&self, repository: &str, digest: &str) -> Result<bool> {
        self.blobs.check_blob_exists(repository, digest).await
    }

    async fn download_layer(&self, repository: &str, digest: &str) -> Result<BlobReader> {
        self.blobs.download_blob(repository, digest).await
    }

    async fn upload_layer(
        &self,
        repository: &str,
        digest: &str,
        content: BlobReader,
    ) -> Result<()> {
        self.blobs.upload_blob(repository, digest, content).await
    }

    async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        payload: Bytes,
    ) -> Result<String> {
        self.manifests
            .push_manifest(repository, reference, media_type, payload)
            .await
    }

    async fn fetch_manifest(&self, repository: &str, reference: &str) -> Result<FetchedManifest> {
        self.manifests.pull_manifest(repository, reference).await
    }
}

/// Validate a registry base URL and strip any trailing slash
fn normalize_address(address: &str) -> Result<String> {
    let url = Url::parse(address)?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MigrateError::Config(format!(
                "Registry URL must use http or https, got '{}'",
                other
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(MigrateError::Config(format!(
            "Registry URL has no host: {}",
            address
        )));
    }
    Ok(address.trim_end_matches('/').to_string())
}
