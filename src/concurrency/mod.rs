//! Concurrent dispatch of image migrations
//!
//! A [`WorkerPool`] bounds the number of migrations in flight and splits a
//! global bandwidth budget evenly across its workers. Every submission gets a
//! [`MigrationHandle`] and every outcome lands in the [`PoolReport`] returned
//! by [`WorkerPool::close`], so no failure goes unseen.

pub mod pool;
pub mod report;

pub use pool::{MigrationHandle, PoolState, WorkerPool, DEFAULT_QUEUE_CAPACITY};
pub use report::{MigrationFailure, PoolReport};
