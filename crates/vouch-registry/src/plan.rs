//! Plan tiers and their rate-limiter configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What a limiter counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LimiterKind {
    /// Each admitted request costs one.
    #[default]
    Count,
    /// Each admitted request costs its byte volume.
    Quota,
}

/// One named sliding-bucket limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limiter {
    /// Width of the measurement slot in seconds.
    pub seconds: i64,
    /// Maximum `used` per slot.
    pub rate: i64,
    /// Whether the limiter counts requests or bytes.
    #[serde(default)]
    pub kind: LimiterKind,
}

/// A named tenant tier.
///
/// Plans are static configuration: looked up by id, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Largest serialized item accepted for a single write, in bytes.
    pub max_size: usize,
    /// Hard ceiling on a requested item lifetime, in seconds.
    pub max_lifetime: i64,
    /// Default item lifetime, in seconds.
    pub lifetime: i64,
    /// Named limiters; every one must admit a request for it to pass.
    #[serde(default)]
    pub limiters: BTreeMap<String, Limiter>,
}
