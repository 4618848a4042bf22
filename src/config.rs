//! Configuration layering and validation
//!
//! Settings come from three layers, later ones winning: an optional JSON
//! plan file, `IMAGE_MIGRATOR_*` environment variables, and CLI flags.

use crate::error::{MigrateError, Result};
use crate::image::ImageReference;
use crate::ratelimit::RateLimit;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const ENV_PREFIX: &str = "IMAGE_MIGRATOR_";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// One layer of partially specified settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub source: Option<String>,
    pub destination: Option<String>,
    /// Global budget in bytes per second, 0 for unthrottled
    pub rate_limit: Option<f64>,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub skip_tls: Option<bool>,
    pub images: Vec<String>,
}

impl ConfigLayer {
    /// Read a JSON plan file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            MigrateError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = ConfigLayer::default();
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "SOURCE" => layer.source = Some(value),
                "DESTINATION" => layer.destination = Some(value),
                "RATE_LIMIT" => layer.rate_limit = Some(parse_env(&key, &value)?),
                "WORKERS" => layer.workers = Some(parse_env(&key, &value)?),
                "QUEUE_CAPACITY" => layer.queue_capacity = Some(parse_env(&key, &value)?),
                "TIMEOUT" => layer.timeout_secs = Some(parse_env(&key, &value)?),
                "SKIP_TLS" => layer.skip_tls = Some(matches!(value.as_str(), "1" | "true" | "yes")),
                _ => {}
            }
        }
        Ok(layer)
    }

    /// Overlay `higher` on top of `self`
    pub fn merge(self, higher: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            source: higher.source.or(self.source),
            destination: higher.destination.or(self.destination),
            rate_limit: higher.rate_limit.or(self.rate_limit),
            workers: higher.workers.or(self.workers),
            queue_capacity: higher.queue_capacity.or(self.queue_capacity),
            timeout_secs: higher.timeout_secs.or(self.timeout_secs),
            skip_tls: higher.skip_tls.or(self.skip_tls),
            images: if higher.images.is_empty() {
                self.images
            } else {
                higher.images
            },
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MigrateError::Config(format!("Invalid value for {}: '{}'", key, value)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub source: String,
    pub destination: String,
    pub images: Vec<ImageReference>,
    pub rate_limit: Option<RateLimit>,
    pub workers: usize,
    pub queue_capacity: usize,
    pub timeout: Duration,
    pub skip_tls: bool,
}

impl AppConfig {
    pub fn from_layer(layer: ConfigLayer) -> Result<Self> {
        let source = validate_registry_url("source", layer.source)?;
        let destination = validate_registry_url("destination", layer.destination)?;

        if layer.images.is_empty() {
            return Err(MigrateError::Config(
                "At least one image must be given".to_string(),
            ));
        }
        let images = layer
            .images
            .iter()
            .map(|s| s.parse::<ImageReference>())
            .collect::<Result<Vec<_>>>()?;

        let rate_limit = RateLimit::from_config(layer.rate_limit)?;

        let workers = match layer.workers {
            Some(0) => {
                return Err(MigrateError::Config(
                    "Worker count must be greater than 0".to_string(),
                ));
            }
            Some(n) => n,
            None => num_cpus::get(),
        };

        let queue_capacity = match layer.queue_capacity {
            Some(0) => {
                return Err(MigrateError::Config(
                    "Queue capacity must be greater than 0".to_string(),
                ));
            }
            Some(n) => n,
            None => crate::concurrency::DEFAULT_QUEUE_CAPACITY,
        };

        let timeout_secs = layer.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(MigrateError::Config(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        Ok(AppConfig {
            source,
            destination,
            images,
            rate_limit,
            workers,
            queue_capacity,
            timeout: Duration::from_secs(timeout_secs),
            skip_tls: layer.skip_tls.unwrap_or(false),
        })
    }
}

fn validate_registry_url(role: &str, url: Option<String>) -> Result<String> {
    let url = url.ok_or_else(|| MigrateError::Config(format!("No {} registry given", role)))?;
    let parsed = Url::parse(&url).map_err(|e| {
        MigrateError::Config(format!("Invalid {} registry URL '{}': {}", role, url, e))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MigrateError::Config(format!(
            "{} registry URL must start with http:// or https://",
            role
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigLayer {
        ConfigLayer {
            source: Some("https://src.example.com".to_string()),
            destination: Some("https://dst.example.com".to_string()),
            images: vec!["app:v1".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_env_vars_are_parsed() {
        let vars = vec![
            ("IMAGE_MIGRATOR_SOURCE".to_string(), "https://a".to_string()),
            ("IMAGE_MIGRATOR_RATE_LIMIT".to_string(), "1000000".to_string()),
            ("IMAGE_MIGRATOR_WORKERS".to_string(), "4".to_string()),
            ("IMAGE_MIGRATOR_SKIP_TLS".to_string(), "true".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let layer = ConfigLayer::from_vars(vars).unwrap();
        assert_eq!(layer.source.as_deref(), Some("https://a"));
        assert_eq!(layer.rate_limit, Some(1_000_000.0));
        assert_eq!(layer.workers, Some(4));
        assert_eq!(layer.skip_tls, Some(true));

        let bad = vec![("IMAGE_MIGRATOR_WORKERS".to_string(), "many".to_string())];
        assert!(ConfigLayer::from_vars(bad).is_err());
    }

    #[test]
    fn test_merge_prefers_higher_layer() {
        let file = ConfigLayer {
            workers: Some(2),
            rate_limit: Some(10.0),
            images: vec!["a".to_string()],
            ..Default::default()
        };
        let cli = ConfigLayer {
            workers: Some(8),
            ..Default::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.workers, Some(8));
        assert_eq!(merged.rate_limit, Some(10.0));
        assert_eq!(merged.images, vec!["a".to_string()]);
    }

    #[test]
    fn test_plan_file_json() {
        let layer: ConfigLayer = serde_json::from_str(
            r#"{"source":"https://a","destination":"https://b","rate_limit":500,"images":["x:1","y"]}"#,
        )
        .unwrap();
        assert_eq!(layer.images.len(), 2);
        assert!(serde_json::from_str::<ConfigLayer>(r#"{"sauce":"x"}"#).is_err());
    }

    #[test]
    fn test_validation() {
        let config = AppConfig::from_layer(base()).unwrap();
        assert_eq!(config.images, vec![ImageReference::new("app", "v1")]);
        assert_eq!(config.rate_limit, None);
        assert!(config.workers >= 1);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let mut no_images = base();
        no_images.images.clear();
        assert!(AppConfig::from_layer(no_images).is_err());

        let mut zero_workers = base();
        zero_workers.workers = Some(0);
        assert!(AppConfig::from_layer(zero_workers).is_err());

        let mut bad_url = base();
        bad_url.destination = Some("ftp://dst".to_string());
        assert!(AppConfig::from_layer(bad_url).is_err());

        let mut negative = base();
        negative.rate_limit = Some(-5.0);
        assert!(AppConfig::from_layer(negative).is_err());
    }
}
