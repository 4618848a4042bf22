//! Image migration between two registries
//!
//! The [`Engine`] decides per image whether the destination is already in
//! sync and otherwise copies config, layers and manifest in that order.

pub mod engine;

pub use engine::Engine;

use crate::error::Result;
use crate::image::Image;
use crate::ratelimit::RateLimit;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Destination already holds a manifest with the source digest
    Skipped,
    Copied {
        /// Digest reported by the destination for the pushed manifest
        digest: String,
        /// Blobs actually uploaded; the rest were already present
        uploaded_blobs: usize,
    },
}

/// Migrates a single image; implemented by [`Engine`] and driven by the worker pool
#[async_trait]
pub trait ImageMigrator: Send + Sync {
    async fn migrate(
        &self,
        image: &Image,
        rate_limit: Option<RateLimit>,
    ) -> Result<MigrationOutcome>;
}
