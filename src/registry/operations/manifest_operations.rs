//! Manifest operations for registry client
//!
//! Implements Docker Registry v2 and OCI manifest operations:
//! - Manifest existence and digest (HEAD /v2/{name}/manifests/{reference})
//! - Manifest download (GET /v2/{name}/manifests/{reference})
//! - Manifest upload (PUT /v2/{name}/manifests/{reference})

use crate::digest::DigestUtils;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::Result;
use crate::image::manifest::{ManifestType, MANIFEST_ACCEPT};
use crate::registry::FetchedManifest;
use bytes::Bytes;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};

/// Header names are matched case-insensitively; `HeaderMap` wants the lowercase form
pub const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

#[derive(Clone)]
pub struct ManifestOperations {
    client: Client,
    address: String,
}

impl ManifestOperations {
    pub fn new(client: Client, address: String) -> Self {
        Self { client, address }
    }

    fn manifest_url(&self, repository: &str, reference: &str) -> String {
        format!("{}/v2/{}/manifests/{}", self.address, repository, reference)
    }

    async fn head_manifest(&self, repository: &str, reference: &str) -> Result<reqwest::Response> {
        self.client
            .head(self.manifest_url(repository, reference))
            .header(ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "manifest check"))
    }

    pub async fn manifest_exists(&self, repository: &str, reference: &str) -> Result<bool> {
        let response = self.head_manifest(repository, reference).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(HttpErrorHandler::from_response(response, "manifest check").await),
        }
    }

    /// Digest of a stored manifest. Falls back to hashing the payload when the
    /// registry omits the Docker-Content-Digest header.
    pub async fn manifest_digest(&self, repository: &str, reference: &str) -> Result<String> {
        let response = self.head_manifest(repository, reference).await?;
        if !response.status().is_success() {
            return Err(HttpErrorHandler::from_response(response, "manifest digest").await);
        }

        match digest_header(response.headers()) {
            Some(digest) => Ok(digest),
            None => Ok(self.pull_manifest(repository, reference).await?.digest),
        }
    }

    /// Download a manifest with multi-format Accept headers
    pub async fn pull_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<FetchedManifest> {
        tracing::debug!(repository, reference, "pulling manifest");

        let response = self
            .client
            .get(self.manifest_url(repository, reference))
            .header(ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "manifest pull"))?;

        if !response.status().is_success() {
            return Err(HttpErrorHandler::from_response(response, "manifest pull").await);
        }

        let header_digest = digest_header(response.headers());
        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let payload = response.bytes().await.map_err(|e| {
            NetworkErrorHandler::handle_network_error(&e, "manifest pull")
        })?;

        let digest = header_digest.unwrap_or_else(|| DigestUtils::compute_docker_digest(&payload));
        let media_type = media_type.unwrap_or_else(|| {
            payload_media_type(&payload).unwrap_or_else(|| {
                ManifestType::Unknown.to_content_type().to_string()
            })
        });

        Ok(FetchedManifest {
            media_type,
            payload,
            digest,
        })
    }

    /// Upload a manifest and return the digest reported by the registry
    pub async fn push_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        payload: Bytes,
    ) -> Result<String> {
        let computed = DigestUtils::compute_docker_digest(&payload);

        let response = self
            .client
            .put(self.manifest_url(repository, reference))
            .header(CONTENT_TYPE, media_type)
            .body(payload)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "manifest push"))?;

        if !response.status().is_success() {
            return Err(HttpErrorHandler::from_response(response, "manifest push").await);
        }

        Ok(digest_header(response.headers()).unwrap_or(computed))
    }
}

fn digest_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(DOCKER_CONTENT_DIGEST)
        .and_then(|h| h.to_str().ok())
        .and_then(|d| DigestUtils::normalize_digest(d).ok())
}

fn payload_media_type(payload: &[u8]) -> Option<String> {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()?
        .get("mediaType")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_digest_header_is_normalized() {
        let mut headers = HeaderMap::new();
        assert_eq!(digest_header(&headers), None);

        let hex = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        headers.insert(
            DOCKER_CONTENT_DIGEST,
            HeaderValue::from_str(&format!("sha256:{hex}")).unwrap(),
        );
        assert_eq!(digest_header(&headers), Some(format!("sha256:{hex}")));

        headers.insert(DOCKER_CONTENT_DIGEST, HeaderValue::from_static("garbage"));
        assert_eq!(digest_header(&headers), None);
    }

    #[test]
    fn test_payload_media_type() {
        assert_eq!(
            payload_media_type(br#"{"mediaType":"application/vnd.oci.image.manifest.v1+json"}"#),
            Some("application/vnd.oci.image.manifest.v1+json".to_string())
        );
        assert_eq!(payload_media_type(b"{}"), None);
        assert_eq!(payload_media_type(b"not json"), None);
    }
}
