//! Named document collections.

use serde::{Deserialize, Serialize};

/// The collections the exchange keeps documents in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Stored items, keyed by item-class coupon.
    Items,
    /// Alias indirections, keyed by `alias-accesskey`.
    Aliases,
    /// Intent lease records, keyed by item id.
    Intents,
    /// Rate-limit counters, keyed by account id.
    SlotLimits,
    /// Tenant accounts, keyed by account id.
    Accounts,
    /// Registered boss coupons, keyed by the coupon itself.
    Bosses,
    /// Update subscriptions, keyed by watchable-class coupon.
    Watchables,
    /// Operational odds and ends (ping targets, counters).
    Services,
}

impl Collection {
    /// Stable collection name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Aliases => "aliases",
            Self::Intents => "intents",
            Self::SlotLimits => "slotlimits",
            Self::Accounts => "accounts",
            Self::Bosses => "bosses",
            Self::Watchables => "watchables",
            Self::Services => "services",
        }
    }

    /// Every collection, for sweeps.
    #[must_use]
    pub const fn all() -> [Self; 8] {
        [
            Self::Items,
            Self::Aliases,
            Self::Intents,
            Self::SlotLimits,
            Self::Accounts,
            Self::Bosses,
            Self::Watchables,
            Self::Services,
        ]
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
