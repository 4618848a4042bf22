//! Command-line argument parsing

use crate::config::ConfigLayer;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "image-migrator")]
#[command(about = "Copy container images between registries, skipping content already present")]
#[command(version)]
pub struct Args {
    /// Images to migrate, as repository[:tag] or repository@sha256:<digest>
    #[arg(value_name = "IMAGE")]
    pub images: Vec<String>,

    #[arg(long = "source", short = 's', help = "Source registry URL, e.g. https://registry-a.example.com")]
    pub source: Option<String>,

    #[arg(long = "destination", short = 'd', help = "Destination registry URL")]
    pub destination: Option<String>,

    #[arg(
        long = "rate-limit",
        short = 'l',
        value_name = "BYTES_PER_SEC",
        help = "Global transfer budget in bytes per second, split evenly across workers (0 = unlimited)"
    )]
    pub rate_limit: Option<f64>,

    #[arg(long = "workers", short = 'j', help = "Number of concurrent workers [default: logical CPU count]")]
    pub workers: Option<usize>,

    #[arg(long = "queue-capacity", help = "Maximum number of images waiting for a worker [default: 1024]")]
    pub queue_capacity: Option<usize>,

    #[arg(long = "timeout", short = 't', value_name = "SECS", help = "Connect and read timeout for registry requests [default: 300]")]
    pub timeout: Option<u64>,

    #[arg(long = "skip-tls", short = 'k', help = "Skip TLS certificate verification")]
    pub skip_tls: bool,

    #[arg(long = "config", short = 'c', value_name = "FILE", help = "JSON plan file with registries, images and limits")]
    pub config: Option<PathBuf>,

    #[arg(long = "verbose", short = 'v', help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(long = "quiet", short = 'q', conflicts_with = "verbose", help = "Only log warnings and errors")]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Settings given on the command line; unset flags leave lower layers alone
    pub fn to_layer(&self) -> ConfigLayer {
        ConfigLayer {
            source: self.source.clone(),
            destination: self.destination.clone(),
            rate_limit: self.rate_limit,
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            timeout_secs: self.timeout,
            skip_tls: self.skip_tls.then_some(true),
            images: self.images.clone(),
        }
    }
}
