//! Manifest model and parsing
//!
//! Only single-image manifests (Docker v2 schema 2 and OCI image manifest) can
//! be migrated blob by blob. Manifest lists and OCI indexes are rejected.

use crate::digest::DigestUtils;
use crate::error::{MigrateError, Result};
use bytes::Bytes;
use serde::Deserialize;

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Accept header value for manifest requests
pub const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestType {
    DockerV2,
    DockerList,
    OciManifest,
    OciIndex,
    Unknown,
}

impl ManifestType {
    pub fn from_media_type(media_type: &str) -> Self {
        // Content-Type may carry parameters such as charset
        let essence = media_type.split(';').next().unwrap_or("").trim();
        match essence {
            DOCKER_MANIFEST_V2 => ManifestType::DockerV2,
            DOCKER_MANIFEST_LIST => ManifestType::DockerList,
            OCI_MANIFEST => ManifestType::OciManifest,
            OCI_INDEX => ManifestType::OciIndex,
            _ => ManifestType::Unknown,
        }
    }

    pub fn to_content_type(self) -> &'static str {
        match self {
            ManifestType::DockerV2 | ManifestType::Unknown => DOCKER_MANIFEST_V2,
            ManifestType::DockerList => DOCKER_MANIFEST_LIST,
            ManifestType::OciManifest => OCI_MANIFEST,
            ManifestType::OciIndex => OCI_INDEX,
        }
    }

    pub fn is_index(self) -> bool {
        matches!(self, ManifestType::DockerList | ManifestType::OciIndex)
    }
}

/// A content-addressed blob referenced by a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRef {
    pub digest: String,
    pub size: u64,
    pub media_type: String,
}

impl LayerRef {
    pub fn new(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            size: 0,
            media_type: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub config: LayerRef,
    /// Transfer order; every entry must be at the destination before the manifest push
    pub layers: Vec<LayerRef>,
    pub media_type: String,
    /// Exact bytes as served by the source registry
    pub payload: Bytes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    schema_version: Option<u32>,
    media_type: Option<String>,
    config: Option<RawDescriptor>,
    #[serde(default)]
    layers: Vec<RawDescriptor>,
    manifests: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
    digest: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    media_type: String,
}

impl From<RawDescriptor> for LayerRef {
    fn from(raw: RawDescriptor) -> Self {
        LayerRef {
            digest: raw.digest,
            size: raw.size,
            media_type: raw.media_type,
        }
    }
}

impl Manifest {
    /// Parse a manifest payload. `content_type` is the registry's Content-Type
    /// header, if any; the payload's own `mediaType` is the fallback.
    pub fn parse(payload: Bytes, content_type: Option<&str>) -> Result<Self> {
        let raw: RawManifest = serde_json::from_slice(&payload)?;

        let media_type = content_type
            .filter(|ct| ManifestType::from_media_type(ct) != ManifestType::Unknown)
            .map(|ct| ManifestType::from_media_type(ct).to_content_type().to_string())
            .or_else(|| raw.media_type.clone())
            .unwrap_or_else(|| DOCKER_MANIFEST_V2.to_string());

        if ManifestType::from_media_type(&media_type).is_index() || raw.manifests.is_some() {
            return Err(MigrateError::Manifest(format!(
                "Multi-platform manifest ({}) cannot be migrated as a single image",
                media_type
            )));
        }

        if let Some(version) = raw.schema_version {
            if version != 2 {
                return Err(MigrateError::Manifest(format!(
                    "Unsupported manifest schema version {}",
                    version
                )));
            }
        }

        let config: LayerRef = raw
            .config
            .ok_or_else(|| MigrateError::Manifest("Manifest has no config descriptor".to_string()))?
            .into();
        let layers: Vec<LayerRef> = raw.layers.into_iter().map(LayerRef::from).collect();

        for blob in std::iter::once(&config).chain(layers.iter()) {
            if !DigestUtils::is_valid_docker_digest(&blob.digest) {
                return Err(MigrateError::Manifest(format!(
                    "Invalid blob digest in manifest: {}",
                    blob.digest
                )));
            }
        }

        Ok(Manifest {
            config,
            layers,
            media_type,
            payload,
        })
    }

    /// Digest of the serialized payload
    pub fn digest(&self) -> String {
        DigestUtils::compute_docker_digest(&self.payload)
    }

    pub fn total_size(&self) -> u64 {
        self.config.size + self.layers.iter().map(|l| l.size).sum::<u64>()
    }
}
