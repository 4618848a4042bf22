//! Image Migrator Library
//!
//! Copies container images (config, layers, manifest) from one registry to
//! another, skipping anything the destination already holds, with an
//! optional global bandwidth budget split across a fixed worker pool.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod digest;
pub mod error;
pub mod image;
pub mod logging;
pub mod migration;
pub mod ratelimit;
pub mod registry;

pub use concurrency::{MigrationHandle, PoolReport, WorkerPool};
pub use error::{MigrateError, PoolError, Result};
pub use image::{Image, ImageReference, LayerRef, Manifest};
pub use migration::{Engine, ImageMigrator, MigrationOutcome};
pub use ratelimit::RateLimit;
pub use registry::{Registry, RegistryClient};
