//! Typed document shapes and their JSON conversions.
//!
//! The store deals in raw JSON values; the protocol layer round-trips
//! these structs through it. Every document carries a top-level `expires`
//! millisecond stamp the store's freshness check keys on.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vouch_core::{Code, Outcome};

/// Access metadata stored alongside an item's data.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ItemMeta {
    /// The writer coupon that created the item.
    pub writer: String,
    /// Reader coupons granted access.
    #[serde(default)]
    pub readers: Vec<String>,
    /// Updater coupons granted access.
    #[serde(default)]
    pub updaters: Vec<String>,
    /// Caller-supplied session tag.
    #[serde(default)]
    pub session: String,
    /// Last mutation time, epoch milliseconds.
    pub modified: i64,
}

/// A stored item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDoc {
    /// The item's payload.
    pub data: Value,
    /// Access metadata.
    pub meta: ItemMeta,
    /// Expiry, epoch milliseconds.
    pub expires: i64,
}

/// An intent lease: one identity's exclusive right to one update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDoc {
    /// The updater coupon holding the lease.
    pub updater: String,
    /// The intent coupon that must be presented to consume the lease.
    pub intent: String,
    /// What the lease is for; only `"update"` exists.
    pub intention: String,
    /// Expiry, epoch milliseconds.
    pub expires: i64,
}

/// An alias indirection record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasDoc {
    /// The item id the alias currently points at.
    pub id: String,
    /// Expiry, epoch milliseconds.
    pub expires: i64,
}

/// One limiter's counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlotEntry {
    /// The time bucket the counter belongs to.
    pub slot: i64,
    /// Usage charged inside that bucket.
    pub used: i64,
}

/// Per-account rate-limit counters, one entry per plan limiter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlotDoc {
    /// Counters by limiter name.
    #[serde(default)]
    pub entries: BTreeMap<String, SlotEntry>,
    /// Expiry, epoch milliseconds.
    #[serde(default)]
    pub expires: i64,
}

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDoc {
    /// Plan tier the account is on.
    pub plan_id: String,
    /// Inactive accounts fail every guarded operation.
    pub active: bool,
    /// Last change, epoch milliseconds.
    pub modified: i64,
    /// Expiry; zero means the account does not lapse on its own.
    #[serde(default)]
    pub expires: i64,
}

/// A registered boss coupon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BossDoc {
    /// Account the boss coupon belongs to.
    pub account_id: String,
    /// Registration time, epoch milliseconds.
    pub modified: i64,
    /// Expiry, matching the coupon's own.
    pub expires: i64,
}

/// Bookkeeping stored on a watchable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WatchMeta {
    /// Caller-supplied session tag.
    #[serde(default)]
    pub session: String,
    /// Last change, epoch milliseconds.
    pub modified: i64,
    /// The `alias-key` pair the subscription rode in on, empty when the
    /// item was addressed directly.
    #[serde(default)]
    pub alias_key: String,
}

/// A registered update subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchableDoc {
    /// The item under observation. Repointing an alias rewrites this.
    pub id: String,
    /// Alias the subscription was registered through, or empty.
    #[serde(default)]
    pub alias: String,
    /// Observed event type; only `"update"` exists.
    pub event: String,
    /// The access key that registered the subscription.
    pub key: String,
    /// Registration options (message, push id, and so on), opaque here.
    pub options: Value,
    /// Observed update times keyed by their own millisecond stamp.
    #[serde(default)]
    pub observations: BTreeMap<String, i64>,
    /// The newest observation, zero before the first.
    #[serde(default)]
    pub latest_observation: i64,
    /// Bookkeeping.
    pub meta: WatchMeta,
    /// Expiry, epoch milliseconds.
    pub expires: i64,
}

/// Serialize a document, store failures becoming `Internal`.
pub(crate) fn to_doc<T: Serialize>(doc: &T) -> Outcome<Value> {
    match serde_json::to_value(doc) {
        Ok(v) => Outcome::good(v),
        Err(err) => Outcome::fail(Code::Internal, format!("encode failed: {err}")),
    }
}

/// Deserialize a document, malformed content becoming `Internal`.
pub(crate) fn from_doc<T: DeserializeOwned>(value: Value) -> Outcome<T> {
    match serde_json::from_value(value) {
        Ok(v) => Outcome::good(v),
        Err(err) => Outcome::fail(Code::Internal, format!("decode failed: {err}")),
    }
}
