use crate::error::MigrateError;
use crate::migration::MigrationOutcome;

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationFailure {
    pub image: String,
    pub error: MigrateError,
}

/// Aggregated outcome of every migration the pool ran
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolReport {
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<MigrationFailure>,
    pub uploaded_blobs: usize,
}

impl PoolReport {
    pub fn record(&mut self, image: &str, result: &Result<MigrationOutcome, MigrateError>) {
        match result {
            Ok(MigrationOutcome::Skipped) => self.skipped.push(image.to_string()),
            Ok(MigrationOutcome::Copied { uploaded_blobs, .. }) => {
                self.copied.push(image.to_string());
                self.uploaded_blobs += uploaded_blobs;
            }
            Err(error) => self.failures.push(MigrationFailure {
                image: image.to_string(),
                error: error.clone(),
            }),
        }
    }

    pub fn total(&self) -> usize {
        self.copied.len() + self.skipped.len() + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}
