mod common;

use common::{Call, MemoryRegistry, seed_image};
use image_migrator::concurrency::PoolState;
use image_migrator::{Engine, MigrationOutcome, PoolError, RateLimit, WorkerPool};
use std::sync::Arc;

async fn seed_many(source: &MemoryRegistry, count: usize) -> Vec<image_migrator::Image> {
    let mut images = Vec::new();
    for i in 0..count {
        let config = format!(r#"{{"image":{i}}}"#);
        let layer = format!("layer of image {i}");
        let shared: &[u8] = b"base layer shared by every image";
        let seeded = seed_image(
            source,
            "team/app",
            &format!("v{i}"),
            config.as_bytes(),
            &[shared, layer.as_bytes()],
        )
        .await;
        images.push(seeded.image);
    }
    images
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_migrates_every_image_and_second_run_skips() {
    let source = MemoryRegistry::new();
    let destination = MemoryRegistry::new();
    let images = seed_many(&source, 6).await;
    let engine = Arc::new(Engine::new(source.clone(), destination.clone()));

    let mut pool = WorkerPool::new(3);
    pool.configure(Some(RateLimit::new(1_000_000.0).unwrap()));
    pool.start(engine.clone()).unwrap();

    let handles: Vec<_> = images
        .iter()
        .map(|image| pool.submit(image.clone()).unwrap())
        .collect();
    for handle in handles {
        let outcome = handle.wait().await.unwrap();
        assert!(matches!(outcome, MigrationOutcome::Copied { .. }));
    }

    let report = pool.close().await.unwrap();
    assert_eq!(pool.state(), PoolState::Closed);
    assert!(report.is_success());
    assert_eq!(report.copied.len(), 6);
    for image in &images {
        assert_eq!(
            destination.stored_manifest_digest("team/app", &image.reference),
            Some(image.digest.clone())
        );
    }

    destination.clear_calls();
    let mut second = WorkerPool::new(2);
    second.start(engine).unwrap();
    for image in &images {
        second.submit(image.clone()).unwrap();
    }
    let report = second.close().await.unwrap();
    assert_eq!(report.skipped.len(), 6);
    assert_eq!(report.uploaded_blobs, 0);
    assert!(!destination.calls().iter().any(Call::is_transfer));
}

#[tokio::test]
async fn test_failed_image_does_not_stop_others() {
    let source = MemoryRegistry::new();
    let destination = MemoryRegistry::new();
    let images = seed_many(&source, 3).await;
    destination.fail_on("v1");

    let mut pool = WorkerPool::new(2);
    pool.start(Arc::new(Engine::new(source.clone(), destination.clone())))
        .unwrap();
    let handles: Vec<_> = images
        .iter()
        .map(|image| pool.submit(image.clone()).unwrap())
        .collect();

    let mut failed = 0;
    for handle in handles {
        let name = handle.image().to_string();
        match handle.wait().await {
            Ok(_) => {}
            Err(PoolError::Migration(_)) => {
                assert_eq!(name, "team/app:v1");
                failed += 1;
            }
            Err(other) => panic!("unexpected pool error: {other}"),
        }
    }
    assert_eq!(failed, 1);

    let report = pool.close().await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.copied.len(), 2);
    assert_eq!(report.failures[0].image, "team/app:v1");
}

#[tokio::test]
async fn test_full_queue_rejects_submission() {
    let source = MemoryRegistry::new();
    let destination = MemoryRegistry::new();
    let images = seed_many(&source, 4).await;

    let mut pool = WorkerPool::new(1).with_queue_capacity(1);
    pool.start(Arc::new(Engine::new(source.clone(), destination.clone())))
        .unwrap();

    // Current-thread runtime: the worker cannot take anything off the queue
    // until this task yields
    let first = pool.submit(images[0].clone()).unwrap();
    assert_eq!(
        pool.submit(images[1].clone()).err(),
        Some(PoolError::QueueFull { capacity: 1 })
    );

    first.wait().await.unwrap();
    let report = pool.close().await.unwrap();
    assert_eq!(report.total(), 1);
}
