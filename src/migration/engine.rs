//! Check-then-copy migration of one image
//!
//! Transfer order is config blob, layers in manifest order, then the manifest.
//! The first failing step aborts the migration; blobs uploaded before the
//! failure stay at the destination and are skipped on the next attempt.

use crate::digest::DigestUtils;
use crate::error::{MigrateError, Result};
use crate::image::Image;
use crate::logging::format_size;
use crate::migration::{ImageMigrator, MigrationOutcome};
use crate::ratelimit::{RateLimit, RateLimitedReader};
use crate::registry::{BlobReader, Registry};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct Engine {
    source: Arc<dyn Registry>,
    destination: Arc<dyn Registry>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(source: Arc<dyn Registry>, destination: Arc<dyn Registry>) -> Self {
        Self {
            source,
            destination,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight registry calls when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn guarded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MigrateError::Cancelled),
            result = operation => result,
        }
    }

    /// Whether the destination needs a copy of `image`
    pub async fn check(&self, image: &Image) -> Result<bool> {
        let exists = self
            .guarded(self.destination.has_manifest(&image.repository, &image.reference))
            .await?;
        if !exists {
            return Ok(true);
        }

        let destination_digest = self
            .guarded(
                self.destination
                    .manifest_digest(&image.repository, &image.reference),
            )
            .await?;

        if destination_digest != image.digest {
            tracing::debug!(
                image = %image,
                source = %image.digest,
                destination = %destination_digest,
                "destination manifest differs"
            );
            return Ok(true);
        }

        Ok(false)
    }

    /// Copy `image` unless the destination already has it
    pub async fn migrate(
        &self,
        image: &Image,
        rate_limit: Option<RateLimit>,
    ) -> Result<MigrationOutcome> {
        if self.check(image).await? {
            self.start(image, rate_limit).await
        } else {
            tracing::info!(image = %image, digest = %image.digest, "already in sync, skipping");
            Ok(MigrationOutcome::Skipped)
        }
    }

    /// Transfer config, layers and manifest without checking the manifest first
    pub async fn start(
        &self,
        image: &Image,
        rate_limit: Option<RateLimit>,
    ) -> Result<MigrationOutcome> {
        let started = Instant::now();
        tracing::info!(
            image = %image,
            blobs = image.blob_count(),
            size = %format_size(image.manifest.total_size()),
            rate_limit = ?rate_limit.map(|r| r.to_string()),
            "migrating image"
        );

        let mut uploaded_blobs = 0;

        let config = &image.manifest.config;
        if self
            .migrate_layer(&config.digest, &image.repository, rate_limit)
            .await?
        {
            uploaded_blobs += 1;
        }

        for layer in &image.manifest.layers {
            if self
                .migrate_layer(&layer.digest, &image.repository, rate_limit)
                .await?
            {
                uploaded_blobs += 1;
            }
        }

        let digest = self
            .guarded(self.destination.push_manifest(
                &image.repository,
                &image.reference,
                &image.manifest.media_type,
                image.manifest.payload.clone(),
            ))
            .await?;

        if digest != image.digest {
            return Err(MigrateError::Digest(format!(
                "Destination reported manifest digest {} for {}, expected {}",
                digest, image, image.digest
            )));
        }

        tracing::info!(
            image = %image,
            digest = %digest,
            uploaded_blobs,
            elapsed = %crate::logging::format_duration(started.elapsed()),
            "manifest pushed"
        );

        Ok(MigrationOutcome::Copied {
            digest,
            uploaded_blobs,
        })
    }

    /// Copy one blob if the destination lacks it. Returns whether an upload happened.
    async fn migrate_layer(
        &self,
        digest: &str,
        repository: &str,
        rate_limit: Option<RateLimit>,
    ) -> Result<bool> {
        if self
            .guarded(self.destination.has_layer(repository, digest))
            .await?
        {
            tracing::debug!(
                repository,
                digest = DigestUtils::short(digest),
                "blob exists, skipping"
            );
            return Ok(false);
        }

        // Dropping the reader closes the source stream on every path below
        let reader = self
            .guarded(self.source.download_layer(repository, digest))
            .await?;

        let content: BlobReader = match rate_limit {
            Some(limit) => Box::pin(RateLimitedReader::new(reader, limit.bucket())),
            None => reader,
        };

        tracing::debug!(repository, digest = DigestUtils::short(digest), "uploading blob");
        self.guarded(self.destination.upload_layer(repository, digest, content))
            .await?;

        Ok(true)
    }
}

#[async_trait]
impl ImageMigrator for Engine {
    async fn migrate(
        &self,
        image: &Image,
        rate_limit: Option<RateLimit>,
    ) -> Result<MigrationOutcome> {
        Engine::migrate(self, image, rate_limit).await
    }
}
