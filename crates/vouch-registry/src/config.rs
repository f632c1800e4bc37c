//! Registry configuration: embedded defaults plus optional file override.
//!
//! The embedded defaults carry the dev seed table and the standard plan
//! tiers; a deployment points [`RegistryConfig::load`] at its own TOML to
//! replace them wholesale. There is no layering or merging - a seed table
//! is all-or-nothing.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::plan::Plan;
use crate::seed::Seed;

/// Embedded default configuration (dev seeds, standard plans).
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying io error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    #[error("cannot parse config {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying toml error.
        #[source]
        source: toml::de::Error,
    },
    /// The config parsed but fails an invariant.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables shared by minting and the protocol layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Default coupon lifetime when neither days nor seconds are given.
    #[serde(default = "default_days")]
    pub default_days: u32,
    /// Lifetime of an intent lease, milliseconds.
    #[serde(default = "default_intent_lifetime")]
    pub intent_lifetime_ms: i64,
    /// Grace added on top of expiries that must outlive their source a
    /// little, milliseconds.
    #[serde(default = "default_grace")]
    pub grace_ms: i64,
    /// How long a rate-limit counter document stays in the store,
    /// milliseconds.
    #[serde(default = "default_slot_lifetime")]
    pub slot_limit_lifetime_ms: i64,
}

const fn default_days() -> u32 {
    28
}
const fn default_intent_lifetime() -> i64 {
    15_000
}
const fn default_grace() -> i64 {
    2_000
}
const fn default_slot_lifetime() -> i64 {
    2 * 24 * 60 * 60 * 1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_days: default_days(),
            intent_lifetime_ms: default_intent_lifetime(),
            grace_ms: default_grace(),
            slot_limit_lifetime_ms: default_slot_lifetime(),
        }
    }
}

/// The full registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Algorithm tag peppering the coupon codec. Changing it invalidates
    /// every coupon issued under the old value.
    pub algo: String,
    /// Shared tunables.
    #[serde(default)]
    pub settings: Settings,
    /// Plan tiers by id.
    pub plans: BTreeMap<String, Plan>,
    /// The seed table, scanned front-to-back for prefix matches.
    pub seeds: Vec<Seed>,
}

impl RegistryConfig {
    /// The embedded dev configuration.
    #[must_use]
    pub fn builtin() -> Self {
        let config: Self =
            toml::from_str(DEFAULTS_TOML).expect("embedded defaults parse");
        config.validate().expect("embedded defaults are valid");
        config
    }

    /// Load a deployment's configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        debug!(
            seeds = config.seeds.len(),
            plans = config.plans.len(),
            "registry config loaded"
        );
        Ok(config)
    }

    /// Check table invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first broken invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.algo.is_empty() {
            return Err(ConfigError::Invalid("algo tag is empty".into()));
        }
        let mut prefixes = std::collections::BTreeSet::new();
        for seed in &self.seeds {
            if seed.secret.len() < 6 {
                return Err(ConfigError::Invalid(format!(
                    "seed {} has a secret shorter than 6 characters",
                    seed.prefix
                )));
            }
            if seed.prefix.is_empty() || seed.prefix.contains('-') {
                return Err(ConfigError::Invalid(format!(
                    "seed prefix {:?} must be non-empty and free of '-'",
                    seed.prefix
                )));
            }
            if !prefixes.insert(seed.prefix.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate seed prefix {}",
                    seed.prefix
                )));
            }
            if !self.plans.contains_key(&seed.plan) {
                return Err(ConfigError::Invalid(format!(
                    "seed {} names unknown plan {}",
                    seed.prefix, seed.plan
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::SeedType;

    #[test]
    fn builtin_defaults_carry_all_plans_and_kinds() {
        let config = RegistryConfig::builtin();
        for plan in ["a", "b", "x"] {
            assert!(config.plans.contains_key(plan), "plan {plan}");
            for kind in [
                SeedType::Boss,
                SeedType::Writer,
                SeedType::Updater,
                SeedType::Reader,
                SeedType::Item,
                SeedType::Intent,
                SeedType::Watchable,
            ] {
                assert!(
                    config
                        .seeds
                        .iter()
                        .any(|s| s.kind == kind && s.plan == plan),
                    "seed {kind}/{plan}"
                );
            }
        }
        assert_eq!(config.settings.intent_lifetime_ms, 15_000);
    }

    #[test]
    fn validation_rejects_short_secrets() {
        let mut config = RegistryConfig::builtin();
        config.seeds[0].secret = "tiny".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn validation_rejects_duplicate_prefixes() {
        let mut config = RegistryConfig::builtin();
        let clone = config.seeds[0].clone();
        config.seeds.push(clone);
        assert!(config.validate().is_err());
    }
}
