// src/utils/dedupe_config.rs
use log::{info, warn};
use std::env;
use std::str::FromStr;

use crate::clustering::entity_clustering::DEFAULT_THRESHOLD;
use crate::matching::blocking::DEFAULT_MAX_BLOCK_SIZE;
use crate::rl::classifier::{
    TrainerConfig, DEFAULT_EPOCHS, DEFAULT_L2_PENALTY, DEFAULT_LEARNING_RATE, DEFAULT_SEED,
};
use crate::utils::workers::default_worker_count;

/// Tunables of a deduplication run.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupeConfig {
    /// Minimum match probability for a pair to link two records.
    pub threshold: f64,
    pub max_block_size: usize,
    pub workers: usize,
    pub seed: u64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2_penalty: f64,
    /// Report records without accepted edges as one-member clusters.
    pub include_singletons: bool,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            workers: default_worker_count(),
            seed: DEFAULT_SEED,
            learning_rate: DEFAULT_LEARNING_RATE,
            epochs: DEFAULT_EPOCHS,
            l2_penalty: DEFAULT_L2_PENALTY,
            include_singletons: false,
        }
    }
}

impl DedupeConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Missing keys take their
    /// default; unparsable or out-of-range values take it with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let threshold = parse_or(&lookup, "DEDUPE_THRESHOLD", defaults.threshold, |t: &f64| {
            (0.0..=1.0).contains(t)
        });
        Self {
            threshold,
            max_block_size: parse_or(&lookup, "DEDUPE_MAX_BLOCK_SIZE", defaults.max_block_size, |n| *n >= 2),
            workers: parse_or(&lookup, "DEDUPE_WORKERS", defaults.workers, |n| *n >= 1),
            seed: parse_or(&lookup, "DEDUPE_SEED", defaults.seed, |_| true),
            learning_rate: parse_or(&lookup, "DEDUPE_LEARNING_RATE", defaults.learning_rate, |r: &f64| {
                r.is_finite() && *r > 0.0
            }),
            epochs: parse_or(&lookup, "DEDUPE_EPOCHS", defaults.epochs, |n| *n >= 1),
            l2_penalty: parse_or(&lookup, "DEDUPE_L2_PENALTY", defaults.l2_penalty, |p: &f64| {
                p.is_finite() && *p >= 0.0
            }),
            include_singletons: parse_or(
                &lookup,
                "DEDUPE_INCLUDE_SINGLETONS",
                defaults.include_singletons,
                |_| true,
            ),
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            learning_rate: self.learning_rate,
            epochs: self.epochs,
            l2_penalty: self.l2_penalty,
            seed: self.seed,
        }
    }

    /// Log the current configuration
    pub fn log_config(&self) {
        info!("⚙️  Dedupe configuration:");
        info!("   Match threshold: {:.2}", self.threshold);
        info!("   Max block size: {}", self.max_block_size);
        info!("   Worker threads: {}", self.workers);
        info!(
            "   Classifier: learning rate {}, {} epochs, L2 penalty {}, seed {}",
            self.learning_rate, self.epochs, self.l2_penalty, self.seed
        );
        if self.include_singletons {
            info!("   Unlinked records are reported as singleton clusters");
        }
    }
}

fn parse_or<T, F, V>(lookup: &F, key: &str, default: T, valid: V) -> T
where
    T: FromStr + std::fmt::Display + Copy,
    F: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!("Invalid value '{}' for {}, using default {}", raw, key, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> DedupeConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DedupeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config, DedupeConfig::default());
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.max_block_size, 1000);
        assert_eq!(config.seed, 42);
        assert!(!config.include_singletons);
        assert!(config.workers >= 1);
    }

    #[test]
    fn test_values_are_read() {
        let config = config_from(&[
            ("DEDUPE_THRESHOLD", "0.8"),
            ("DEDUPE_MAX_BLOCK_SIZE", "50"),
            ("DEDUPE_WORKERS", "3"),
            ("DEDUPE_EPOCHS", " 10 "),
            ("DEDUPE_INCLUDE_SINGLETONS", "true"),
        ]);
        assert_eq!(config.threshold, 0.8);
        assert_eq!(config.max_block_size, 50);
        assert_eq!(config.workers, 3);
        assert_eq!(config.epochs, 10);
        assert!(config.include_singletons);
        assert_eq!(config.trainer_config().epochs, 10);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("DEDUPE_THRESHOLD", "1.5"),
            ("DEDUPE_WORKERS", "0"),
            ("DEDUPE_SEED", "abc"),
            ("DEDUPE_L2_PENALTY", "-1"),
        ]);
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.workers, DedupeConfig::default().workers);
        assert_eq!(config.seed, 42);
        assert_eq!(config.l2_penalty, 0.001);
    }

    #[test]
    fn test_non_finite_rates_fall_back() {
        let config = config_from(&[
            ("DEDUPE_LEARNING_RATE", "inf"),
            ("DEDUPE_L2_PENALTY", "NaN"),
        ]);
        assert_eq!(config.learning_rate, DedupeConfig::default().learning_rate);
        assert_eq!(config.l2_penalty, DedupeConfig::default().l2_penalty);

        let config = config_from(&[("DEDUPE_L2_PENALTY", "inf")]);
        assert_eq!(config.l2_penalty, DedupeConfig::default().l2_penalty);
    }
}
