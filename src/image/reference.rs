//! Parsing of `repository[:tag]` and `repository@sha256:<hex>` image references

use crate::digest::DigestUtils;
use crate::error::{MigrateError, Result};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub repository: String,
    /// Tag or `sha256:` digest
    pub reference: String,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            reference: reference.into(),
        }
    }

    pub fn is_digest(&self) -> bool {
        DigestUtils::is_valid_docker_digest(&self.reference)
    }
}

impl FromStr for ImageReference {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        let (repository, reference) = if let Some((repo, digest)) = s.split_once('@') {
            (repo, DigestUtils::normalize_digest(digest)?)
        } else {
            // A colon after the last slash separates the tag; earlier ones belong to a host:port
            let last_slash = s.rfind('/').map(|p| p + 1).unwrap_or(0);
            match s[last_slash..].rfind(':') {
                Some(pos) => {
                    let split = last_slash + pos;
                    (&s[..split], s[split + 1..].to_string())
                }
                None => (s, DEFAULT_TAG.to_string()),
            }
        };

        if repository.is_empty() {
            return Err(MigrateError::Config(format!(
                "Image reference '{}' has an empty repository",
                s
            )));
        }
        if reference.is_empty() {
            return Err(MigrateError::Config(format!(
                "Image reference '{}' has an empty tag",
                s
            )));
        }
        if repository
            .chars()
            .any(|c| c.is_ascii_uppercase() || c.is_whitespace())
        {
            return Err(MigrateError::Config(format!(
                "Repository name must be lowercase without whitespace: '{}'",
                repository
            )));
        }

        Ok(ImageReference::new(repository, reference))
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_digest() {
            write!(f, "{}@{}", self.repository, self.reference)
        } else {
            write!(f, "{}:{}", self.repository, self.reference)
        }
    }
}
