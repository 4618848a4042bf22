//! Source-side image model
//!
//! An [`Image`] is resolved from the source registry before it is handed to the
//! migration engine, and is read-only from then on.

pub mod manifest;
pub mod reference;

pub use manifest::{LayerRef, Manifest, ManifestType};
pub use reference::ImageReference;

use crate::error::Result;
use crate::registry::Registry;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub repository: String,
    pub reference: String,
    /// Manifest digest recorded at the source
    pub digest: String,
    pub manifest: Manifest,
}

impl Image {
    pub fn new(
        repository: impl Into<String>,
        reference: impl Into<String>,
        digest: impl Into<String>,
        manifest: Manifest,
    ) -> Self {
        Self {
            repository: repository.into(),
            reference: reference.into(),
            digest: digest.into(),
            manifest,
        }
    }

    /// Fetch and parse the manifest for `reference` from `source`
    pub async fn resolve<R: Registry + ?Sized>(
        source: &R,
        reference: &ImageReference,
    ) -> Result<Self> {
        let fetched = source
            .fetch_manifest(&reference.repository, &reference.reference)
            .await?;
        let manifest = Manifest::parse(fetched.payload, Some(&fetched.media_type))?;
        Ok(Image::new(
            reference.repository.clone(),
            reference.reference.clone(),
            fetched.digest,
            manifest,
        ))
    }

    pub fn blob_count(&self) -> usize {
        self.manifest.layers.len() + 1
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(
            &ImageReference::new(self.repository.clone(), self.reference.clone()),
            f,
        )
    }
}
