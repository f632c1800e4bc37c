//! Capability seed definitions.

use serde::{Deserialize, Serialize};

/// The capability class a seed issues coupons for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedType {
    /// Administrative key that can be swapped for access keys.
    Boss,
    /// May create, update, and delete items.
    Writer,
    /// May update items it is listed on.
    Updater,
    /// May read items it is listed on.
    Reader,
    /// An item id; the coupon doubles as the stored document's key.
    Item,
    /// A short-lived exclusive update lease.
    Intent,
    /// A registered update subscription.
    Watchable,
}

impl SeedType {
    /// Whether coupons of this class may be presented as access keys for
    /// item reads.
    #[must_use]
    pub const fn can_read(self) -> bool {
        matches!(self, Self::Writer | Self::Updater | Self::Reader)
    }

    /// Whether coupons of this class may mutate existing items.
    #[must_use]
    pub const fn can_update(self) -> bool {
        matches!(self, Self::Writer | Self::Updater)
    }
}

impl std::fmt::Display for SeedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Boss => "boss",
            Self::Writer => "writer",
            Self::Updater => "updater",
            Self::Reader => "reader",
            Self::Item => "item",
            Self::Intent => "intent",
            Self::Watchable => "watchable",
        };
        write!(f, "{name}")
    }
}

/// A capability definition: one entry of the static seed table.
///
/// A coupon is matched to its seed by literal prefix: the seed's `prefix`
/// must be a leading substring of the coupon's prefix segment. Full
/// equality is deliberately not required - issued prefixes append derived
/// text such as the account id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seed {
    /// Capability class this seed issues.
    pub kind: SeedType,
    /// Plan the seed belongs to.
    pub plan: String,
    /// Leading prefix of every coupon this seed issues.
    pub prefix: String,
    /// Signing secret, at least six characters.
    pub secret: String,
    /// For boss seeds: the capability kinds a boss coupon may be swapped
    /// for. Empty for every other kind.
    #[serde(default)]
    pub grants: Vec<SeedType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_classes() {
        assert!(SeedType::Writer.can_read());
        assert!(SeedType::Updater.can_update());
        assert!(!SeedType::Reader.can_update());
        assert!(!SeedType::Item.can_read());
        assert!(!SeedType::Intent.can_update());
    }

    #[test]
    fn seed_parses_from_toml() {
        let seed: Seed = toml::from_str(
            r#"
            kind = "boss"
            plan = "a"
            prefix = "bsa"
            secret = "dev-boss-a"
            grants = ["writer", "reader", "updater"]
            "#,
        )
        .unwrap();
        assert_eq!(seed.kind, SeedType::Boss);
        assert_eq!(seed.grants.len(), 3);

        let plain: Seed = toml::from_str(
            r#"
            kind = "reader"
            plan = "x"
            prefix = "rdx"
            secret = "dev-reader-x"
            "#,
        )
        .unwrap();
        assert!(plain.grants.is_empty());
    }
}
