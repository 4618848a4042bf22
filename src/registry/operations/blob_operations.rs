//! Blob operations for registry client
//!
//! Implements Docker Registry v2 blob operations:
//! - Blob existence checks (HEAD /v2/{name}/blobs/{digest})
//! - Streaming blob download (GET /v2/{name}/blobs/{digest})
//! - Monolithic streaming upload (POST /v2/{name}/blobs/uploads/, then PUT ?digest=)

use crate::digest::DigestUtils;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{MigrateError, Result};
use crate::registry::BlobReader;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, StatusCode};
use tokio_util::io::{ReaderStream, StreamReader};

#[derive(Clone)]
pub struct BlobOperations {
    client: Client,
    address: String,
}

impl BlobOperations {
    pub fn new(client: Client, address: String) -> Self {
        Self { client, address }
    }

    fn blob_url(&self, repository: &str, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.address, repository, digest)
    }

    /// Check if blob exists using a HEAD request
    pub async fn check_blob_exists(&self, repository: &str, digest: &str) -> Result<bool> {
        let url = self.blob_url(repository, digest);

        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "blob existence check"))?;

        match response.status() {
            StatusCode::OK => {
                tracing::trace!(repository, digest = DigestUtils::short(digest), "blob exists");
                Ok(true)
            }
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(HttpErrorHandler::from_response(response, "blob existence check").await),
        }
    }

    /// Open a streaming download of a blob
    pub async fn download_blob(&self, repository: &str, digest: &str) -> Result<BlobReader> {
        let url = self.blob_url(repository, digest);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "blob download"))?;

        if !response.status().is_success() {
            return Err(HttpErrorHandler::from_response(response, "blob download").await);
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    /// Upload a blob from a stream under `digest`
    pub async fn upload_blob(
        &self,
        repository: &str,
        digest: &str,
        content: BlobReader,
    ) -> Result<()> {
        let location = self.start_upload_session(repository).await?;
        let url = Self::with_digest_query(&location, digest);

        tracing::trace!(url = %url, "uploading blob data");

        let body = Body::wrap_stream(ReaderStream::new(content));
        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "blob upload"))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(HttpErrorHandler::from_response(response, "blob upload").await)
        }
    }

    async fn start_upload_session(&self, repository: &str) -> Result<String> {
        let url = format!("{}/v2/{}/blobs/uploads/", self.address, repository);

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "upload session start"))?;

        if !response.status().is_success() {
            return Err(HttpErrorHandler::from_response(response, "upload session start").await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .ok_or_else(|| {
                MigrateError::Network("Missing Location header in upload response".to_string())
            })?
            .to_str()
            .map_err(|e| MigrateError::Network(format!("Invalid Location header: {}", e)))?;

        Ok(self.resolve_location(repository, location))
    }

    /// Registries may answer with an absolute URL, an absolute path or a bare upload id
    fn resolve_location(&self, repository: &str, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else if location.starts_with('/') {
            format!("{}{}", self.address, location)
        } else {
            format!("{}/v2/{}/blobs/uploads/{}", self.address, repository, location)
        }
    }

    fn with_digest_query(location: &str, digest: &str) -> String {
        let separator = if location.contains('?') { '&' } else { '?' };
        format!("{}{}digest={}", location, separator, digest)
    }
}
