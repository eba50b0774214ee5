//! Configuration for the caching layer.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Tunables for the caching layer.
///
/// All fields have defaults; durations parse in humantime format
/// (`30m`, `90s`, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a cache entry is served before it expires.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Maximum number of entries held per cache.
    pub max_capacity: usize,

    /// Bloom filter width in bits (`m`).
    pub bloom_bits: usize,

    /// Number of Bloom hash functions per key (`k`).
    pub bloom_hashes: u32,

    /// How often the early-refresh scheduler reloads hot keys.
    ///
    /// Must stay below `ttl`; what matters is the ratio, not the unit.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Aggressiveness of probabilistic early recomputation.
    pub beta: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl: Duration::from_secs(30 * 60),
            max_capacity: 10_000,
            bloom_bits: 1 << 20,
            bloom_hashes: 4,
            refresh_interval: Duration::from_secs(29 * 60),
            beta: 1.0,
        }
    }
}

impl CacheConfig {
    /// Loads and validates a configuration from a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to open config file at {}", path.display()))?;
        let config: CacheConfig =
            serde_yaml::from_str(&source).context("failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants between the tunables.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_capacity > 0, "max_capacity must be positive");
        ensure!(self.bloom_bits > 0, "bloom_bits must be positive");
        ensure!(self.bloom_hashes > 0, "bloom_hashes must be positive");
        ensure!(self.beta >= 0.0, "beta must not be negative");
        ensure!(
            !self.refresh_interval.is_zero(),
            "refresh_interval must be positive"
        );
        ensure!(
            self.refresh_interval < self.ttl,
            "refresh_interval must stay below ttl"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        CacheConfig::default().validate().unwrap();
    }

    #[test]
    fn test_parse_yaml() {
        let config: CacheConfig = serde_yaml::from_str(
            r"
            ttl: 10m
            max_capacity: 500
            refresh_interval: 9m
            beta: 1.5
            ",
        )
        .unwrap();

        assert_eq!(config.ttl, Duration::from_secs(600));
        assert_eq!(config.max_capacity, 500);
        assert_eq!(config.refresh_interval, Duration::from_secs(540));
        assert_eq!(config.beta, 1.5);
        // unset fields keep their defaults
        assert_eq!(config.bloom_hashes, 4);
        config.validate().unwrap();
    }

    #[test]
    fn test_refresh_interval_must_undercut_ttl() {
        let config = CacheConfig {
            ttl: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
