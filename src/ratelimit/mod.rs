//! Bandwidth limiting for blob transfers
//!
//! A [`TokenBucket`] caps the long-run average rate while allowing bursts up
//! to its capacity; [`RateLimitedReader`] applies a bucket to any `AsyncRead`.

pub mod bucket;
pub mod reader;

pub use bucket::TokenBucket;
pub use reader::RateLimitedReader;

use crate::error::{MigrateError, Result};
use std::fmt;

/// Burst capacity as a multiple of the configured rate
pub const BURST_FACTOR: f64 = 1.2;

/// Throughput cap in bytes per second
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RateLimit(f64);

impl RateLimit {
    pub fn new(bytes_per_sec: f64) -> Result<Self> {
        if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
            return Err(MigrateError::Config(format!(
                "Rate limit must be a positive number of bytes per second, got {}",
                bytes_per_sec
            )));
        }
        Ok(RateLimit(bytes_per_sec))
    }

    /// Interpret a configured value, where zero means unthrottled
    pub fn from_config(value: Option<f64>) -> Result<Option<Self>> {
        match value {
            None => Ok(None),
            Some(v) if v == 0.0 => Ok(None),
            Some(v) => Self::new(v).map(Some),
        }
    }

    pub fn bytes_per_sec(self) -> f64 {
        self.0
    }

    /// Burst allowance in bytes, never below one byte
    pub fn burst(self) -> u64 {
        ((self.0 * BURST_FACTOR) as u64).max(1)
    }

    /// Even share of a global budget for one of `workers` workers
    pub fn per_worker(global: Option<RateLimit>, workers: usize) -> Option<RateLimit> {
        match global {
            Some(limit) if workers > 0 => Some(RateLimit(limit.0 / workers as f64)),
            _ => None,
        }
    }

    pub fn bucket(self) -> TokenBucket {
        TokenBucket::new(self.0, self.burst())
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::logging::format_rate(self.0))
    }
}
