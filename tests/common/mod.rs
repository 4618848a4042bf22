//! In-memory registry used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image_migrator::digest::DigestUtils;
use image_migrator::image::manifest::DOCKER_MANIFEST_V2;
use image_migrator::registry::{BlobReader, FetchedManifest, Registry};
use image_migrator::{Image, ImageReference, MigrateError, Result};
use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    HasManifest(String),
    ManifestDigest(String),
    HasLayer(String),
    Download(String),
    Upload(String),
    PushManifest(String),
    FetchManifest(String),
}

impl Call {
    pub fn is_transfer(&self) -> bool {
        matches!(self, Call::Download(_) | Call::Upload(_) | Call::PushManifest(_))
    }
}

#[derive(Default)]
pub struct MemoryRegistry {
    blobs: Mutex<HashMap<(String, String), Bytes>>,
    manifests: Mutex<HashMap<(String, String), (String, Bytes)>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    failing_uploads: Mutex<HashSet<String>>,
    push_digest_override: Mutex<Option<String>>,
    open_readers: Arc<AtomicUsize>,
}

impl MemoryRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_blob(&self, repository: &str, data: &[u8]) -> String {
        let digest = DigestUtils::compute_docker_digest(data);
        self.blobs.lock().unwrap().insert(
            (repository.to_string(), digest.clone()),
            Bytes::copy_from_slice(data),
        );
        digest
    }

    pub fn put_manifest(&self, repository: &str, reference: &str, payload: Bytes) -> String {
        let digest = DigestUtils::compute_docker_digest(&payload);
        self.manifests.lock().unwrap().insert(
            (repository.to_string(), reference.to_string()),
            (DOCKER_MANIFEST_V2.to_string(), payload),
        );
        digest
    }

    pub fn has_blob(&self, repository: &str, digest: &str) -> bool {
        self.blobs
            .lock()
            .unwrap()
            .contains_key(&(repository.to_string(), digest.to_string()))
    }

    pub fn stored_manifest_digest(&self, repository: &str, reference: &str) -> Option<String> {
        self.manifests
            .lock()
            .unwrap()
            .get(&(repository.to_string(), reference.to_string()))
            .map(|(_, payload)| DigestUtils::compute_docker_digest(payload))
    }

    /// Make every operation touching `key` (a digest or reference) fail
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    /// Fail only the upload of `digest`; existence checks still answer normally
    pub fn fail_uploads_of(&self, digest: &str) {
        self.failing_uploads.lock().unwrap().insert(digest.to_string());
    }

    /// Store pushed manifests as usual but report `digest` for them, both from
    /// the push and from later digest lookups
    pub fn report_push_digest(&self, digest: &str) {
        *self.push_digest_override.lock().unwrap() = Some(digest.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
        self.failing_uploads.lock().unwrap().clear();
        *self.push_digest_override.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self, key: &str, operation: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(key) {
            let message = format!("injected failure for {key}");
            return Err(MigrateError::registry(operation, 500, message));
        }
        Ok(())
    }
}

/// Reader that tracks how many blob streams are still open
struct TrackedReader {
    data: Bytes,
    position: usize,
    open: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let remaining = &self.data[self.position..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        self.position += n;
        Poll::Ready(Ok(()))
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn has_manifest(&self, repository: &str, reference: &str) -> Result<bool> {
        self.record(Call::HasManifest(reference.to_string()));
        self.check_failure(reference, "manifest check")?;
        Ok(self
            .manifests
            .lock()
            .unwrap()
            .contains_key(&(repository.to_string(), reference.to_string())))
    }

    async fn manifest_digest(&self, repository: &str, reference: &str) -> Result<String> {
        self.record(Call::ManifestDigest(reference.to_string()));
        self.check_failure(reference, "manifest digest")?;
        let stored = self.stored_manifest_digest(repository, reference);
        let reported = self.push_digest_override.lock().unwrap().clone();
        stored
            .map(|digest| reported.unwrap_or(digest))
            .ok_or_else(|| MigrateError::registry("manifest digest", 404, "manifest unknown"))
    }

    async fn has_layer(&self, repository: &str, digest: &str) -> Result<bool> {
        self.record(Call::HasLayer(digest.to_string()));
        self.check_failure(digest, "blob existence check")?;
        Ok(self.has_blob(repository, digest))
    }

    async fn download_layer(&self, repository: &str, digest: &str) -> Result<BlobReader> {
        self.record(Call::Download(digest.to_string()));
        self.check_failure(digest, "blob download")?;
        let data = self
            .blobs
            .lock()
            .unwrap()
            .get(&(repository.to_string(), digest.to_string()))
            .cloned()
            .ok_or_else(|| MigrateError::registry("blob download", 404, "blob unknown"))?;
        self.open_readers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(TrackedReader {
            data,
            position: 0,
            open: Arc::clone(&self.open_readers),
        }))
    }

    async fn upload_layer(
        &self,
        repository: &str,
        digest: &str,
        mut content: BlobReader,
    ) -> Result<()> {
        self.record(Call::Upload(digest.to_string()));
        self.check_failure(digest, "blob upload")?;
        if self.failing_uploads.lock().unwrap().contains(digest) {
            return Err(MigrateError::registry("blob upload", 500, "upload rejected"));
        }
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;
        if DigestUtils::compute_docker_digest(&data) != digest {
            return Err(MigrateError::registry("blob upload", 400, "DIGEST_INVALID"));
        }
        self.blobs
            .lock()
            .unwrap()
            .insert((repository.to_string(), digest.to_string()), Bytes::from(data));
        Ok(())
    }

    async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        payload: Bytes,
    ) -> Result<String> {
        self.record(Call::PushManifest(reference.to_string()));
        self.check_failure(reference, "manifest push")?;
        let digest = DigestUtils::compute_docker_digest(&payload);
        self.manifests.lock().unwrap().insert(
            (repository.to_string(), reference.to_string()),
            (media_type.to_string(), payload),
        );
        match self.push_digest_override.lock().unwrap().clone() {
            Some(reported) => Ok(reported),
            None => Ok(digest),
        }
    }

    async fn fetch_manifest(&self, repository: &str, reference: &str) -> Result<FetchedManifest> {
        self.record(Call::FetchManifest(reference.to_string()));
        self.check_failure(reference, "manifest pull")?;
        let (media_type, payload) = self
            .manifests
            .lock()
            .unwrap()
            .get(&(repository.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| MigrateError::registry("manifest pull", 404, "manifest unknown"))?;
        Ok(FetchedManifest {
            digest: DigestUtils::compute_docker_digest(&payload),
            media_type,
            payload,
        })
    }
}

pub struct SeededImage {
    pub image: Image,
    pub config: String,
    pub layers: Vec<String>,
}

/// Store config, layers and a manifest in `registry` and resolve them into an [`Image`]
pub async fn seed_image(
    registry: &MemoryRegistry,
    repository: &str,
    reference: &str,
    config: &[u8],
    layers: &[&[u8]],
) -> SeededImage {
    let config_digest = registry.put_blob(repository, config);
    let layer_digests: Vec<String> = layers
        .iter()
        .map(|data| registry.put_blob(repository, data))
        .collect();

    let manifest = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": DOCKER_MANIFEST_V2,
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "size": config.len(),
            "digest": config_digest,
        },
        "layers": layers.iter().zip(&layer_digests).map(|(data, digest)| serde_json::json!({
            "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
            "size": data.len(),
            "digest": digest,
        })).collect::<Vec<_>>(),
    });
    registry.put_manifest(
        repository,
        reference,
        Bytes::from(serde_json::to_vec(&manifest).unwrap()),
    );

    let image = Image::resolve(registry, &ImageReference::new(repository, reference))
        .await
        .unwrap();
    registry.clear_calls();

    SeededImage {
        image,
        config: config_digest,
        layers: layer_digests,
    }
}
