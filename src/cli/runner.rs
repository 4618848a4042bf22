//! Runs a migration plan: resolve images, dispatch them to the pool, report

use crate::cli::args::Args;
use crate::concurrency::{MigrationFailure, MigrationHandle, PoolReport, WorkerPool};
use crate::config::{AppConfig, ConfigLayer};
use crate::error::{MigrateError, PoolError, Result};
use crate::image::{Image, ImageReference};
use crate::logging::format_duration;
use crate::migration::Engine;
use crate::registry::{Registry, RegistryClient};
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct Runner {
    config: AppConfig,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Merge file, environment and CLI layers into a validated config
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => ConfigLayer::load(path)?,
            None => ConfigLayer::default(),
        };
        let layer = file.merge(ConfigLayer::from_env()?).merge(args.to_layer());
        Ok(Self::new(AppConfig::from_layer(layer)?))
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> std::result::Result<PoolReport, PoolError> {
        let started = Instant::now();
        let source = self.build_client(&self.config.source)?;
        let destination = self.build_client(&self.config.destination)?;

        let engine = Engine::new(source.clone(), destination)
            .with_cancellation(self.cancel.clone());

        tracing::info!(
            source = %self.config.source,
            destination = %self.config.destination,
            images = self.config.images.len(),
            "resolving source images"
        );
        let (images, mut resolve_failures) = resolve_images(
            source.as_ref(),
            &self.config.images,
            self.config.workers,
            &self.cancel,
        )
        .await;

        let mut pool = WorkerPool::new(self.config.workers)
            .with_queue_capacity(self.config.queue_capacity);
        pool.configure(self.config.rate_limit);
        pool.start(Arc::new(engine))?;

        let mut pending: VecDeque<MigrationHandle> = VecDeque::new();
        for image in images {
            let handle = loop {
                match pool.submit(image.clone()) {
                    Err(PoolError::QueueFull { .. }) => match pending.pop_front() {
                        // Outcomes are collected in the pool report
                        Some(oldest) => {
                            let _ = oldest.wait().await;
                        }
                        None => tokio::task::yield_now().await,
                    },
                    other => break other?,
                }
            };
            pending.push_back(handle);
        }

        let mut report = pool.close().await?;
        report.failures.append(&mut resolve_failures);

        self.log_summary(&report, started);
        Ok(report)
    }

    fn build_client(&self, address: &str) -> Result<Arc<dyn Registry>> {
        let client = RegistryClient::builder(address.to_string())
            .with_skip_tls(self.config.skip_tls)
            .with_timeout(self.config.timeout)
            .build()?;
        Ok(Arc::new(client))
    }

    fn log_summary(&self, report: &PoolReport, started: Instant) {
        tracing::info!(
            copied = report.copied.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            uploaded_blobs = report.uploaded_blobs,
            elapsed = %format_duration(started.elapsed()),
            "migration finished"
        );
        for failure in &report.failures {
            tracing::error!(image = %failure.image, error = %failure.error, "failed");
        }
    }
}

/// Fetch source manifests with at most `concurrency` requests in flight
async fn resolve_images(
    source: &dyn Registry,
    references: &[ImageReference],
    concurrency: usize,
    cancel: &CancellationToken,
) -> (Vec<Image>, Vec<MigrationFailure>) {
    let lookups = references.iter().map(|reference| async move {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MigrateError::Cancelled),
            result = Image::resolve(source, reference) => result,
        };
        (reference, result)
    });

    let results: Vec<_> = stream::iter(lookups)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut images = Vec::new();
    let mut failures = Vec::new();
    for (reference, result) in results {
        match result {
            Ok(image) => images.push(image),
            Err(error) => {
                tracing::error!(image = %reference, error = %error, "cannot resolve source image");
                failures.push(MigrationFailure {
                    image: reference.to_string(),
                    error,
                });
            }
        }
    }
    (images, failures)
}
