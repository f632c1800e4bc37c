//! Seed resolution and coupon typing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use vouch_core::{Clock, Code, Outcome, SystemClock};
use vouch_coupon::{Codec, encode_base32};

use crate::config::{RegistryConfig, Settings};
use crate::plan::Plan;
use crate::seed::{Seed, SeedType};

/// Account id used when a coupon carries no embedded account.
pub(crate) const NO_ACCOUNT: &str = "unknown";

/// A decoded, typed, authenticated coupon.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KeyPack {
    /// The coupon as presented.
    pub key: String,
    /// Capability class of the issuing seed.
    pub kind: SeedType,
    /// Plan of the issuing seed.
    pub plan: String,
    /// Embedded account id in base-32, or `"unknown"`.
    pub account_id: String,
    /// Expiry in epoch milliseconds; zero when the coupon was invalid.
    pub valid_till: i64,
}

impl KeyPack {
    /// The expiry rendered as an RFC 3339 timestamp, or empty when unset.
    #[must_use]
    pub fn valid_till_iso(&self) -> String {
        if self.valid_till <= 0 {
            return String::new();
        }
        DateTime::<Utc>::from_timestamp_millis(self.valid_till)
            .map(|d| d.to_rfc3339())
            .unwrap_or_default()
    }

    /// Whether this pack carries a usable account id.
    #[must_use]
    pub fn has_account(&self) -> bool {
        self.account_id != NO_ACCOUNT && !self.account_id.is_empty()
    }
}

/// The process-wide capability table: seeds, plans, codec, settings.
///
/// Initialized once at startup and shared read-only; nothing here mutates
/// after construction.
pub struct Registry {
    codec: Codec,
    seeds: Vec<Seed>,
    plans: BTreeMap<String, Plan>,
    settings: Settings,
    clock: Arc<dyn Clock>,
}

impl Registry {
    /// Build a registry from configuration, on the wall clock.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a registry on an injected clock.
    #[must_use]
    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        // front-to-back scan order; longer prefixes first so the most
        // specific seed wins
        let mut seeds = config.seeds;
        seeds.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self {
            codec: Codec::new(&config.algo),
            seeds,
            plans: config.plans,
            settings: config.settings,
            clock,
        }
    }

    /// The coupon codec this registry signs with.
    #[must_use]
    pub const fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Shared tunables.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Look up a plan tier.
    #[must_use]
    pub fn plan(&self, id: &str) -> Option<&Plan> {
        self.plans.get(id)
    }

    /// Find the seed whose prefix starts the presented coupon.
    #[must_use]
    pub fn find_seed(&self, code: &str) -> Option<&Seed> {
        self.seeds.iter().find(|s| code.starts_with(&s.prefix))
    }

    /// Find the seed for a capability kind under a plan.
    #[must_use]
    pub fn find_pair(&self, kind: SeedType, plan: &str) -> Option<&Seed> {
        self.seeds
            .iter()
            .find(|s| s.kind == kind && s.plan == plan)
    }

    /// Decode and type a presented coupon.
    ///
    /// Structurally invalid coupons (or ones no seed claims) come back
    /// `BadRequest`; valid-but-expired ones come back `Unauthorized`.
    /// Callers branch on the difference.
    #[must_use]
    pub fn key_pack(&self, code: &str, unlock: &str) -> Outcome<KeyPack> {
        let Some(seed) = self.find_seed(code) else {
            return Outcome::fail(
                Code::BadRequest,
                format!("key or alias {code} is invalid"),
            );
        };
        let secret = format!("{}{unlock}", seed.secret);
        let decoded = self.codec.decode(&secret, code);

        let account_id = if decoded.extra_days > 0 {
            encode_base32(decoded.extra_days)
        } else {
            NO_ACCOUNT.to_owned()
        };
        let pack = KeyPack {
            key: decoded.coupon.clone(),
            kind: seed.kind,
            plan: seed.plan.clone(),
            account_id,
            valid_till: decoded.expiry,
        };
        Outcome::good(pack)
            .ensure(
                decoded.valid,
                Code::BadRequest,
                format!("key or alias {code} is invalid"),
            )
            .ensure(
                !decoded.expired,
                Code::Unauthorized,
                format!("key {code} has expired"),
            )
    }

    /// Whether a presented id is an item-class coupon. Expired item
    /// coupons still count: the stored document's own expiry governs.
    #[must_use]
    pub fn is_item_key(&self, id: &str, unlock: &str) -> bool {
        let pack = self.key_pack(id, unlock);
        let is_item = pack
            .value()
            .is_some_and(|p| p.kind == SeedType::Item);
        is_item && (pack.is_ok() || pack.code() == Code::Unauthorized)
    }

    /// Current time from the registry's clock, epoch milliseconds.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("seeds", &self.seeds.len())
            .field("plans", &self.plans.len())
            .finish_non_exhaustive()
    }
}
