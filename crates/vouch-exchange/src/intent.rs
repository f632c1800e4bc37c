//! The intent lock protocol.
//!
//! An intent is a short-lived exclusive lease on one update of one item,
//! expressed purely as data: a record in the `intents` collection that the
//! store validates transactionally. There are no in-process locks. A lease
//! is acquired by a read-with-intention, consumed by exactly one matching
//! update, or expires on its own; expired, released, and consumed leases
//! are indistinguishable from no lease at all.

use vouch_core::{Code, Outcome};
use vouch_registry::SeedType;
use vouch_store::{Collection, DocStore, Txn, require_fresh};

use crate::docs::{IntentDoc, from_doc, to_doc};
use crate::{Exchange, store_outcome};

/// What a successful acquisition hands back.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IntentGrant {
    /// The intent coupon to present with the update.
    pub intent: String,
    /// Whole seconds until the lease lapses. On a `Locked` failure this
    /// reports the remaining life of the other holder's lease instead.
    pub intent_expires: i64,
}

/// Release parameters.
#[derive(Debug, Clone, Default)]
pub struct ReleaseRequest {
    /// The updater coupon holding the lease.
    pub updater: String,
    /// The intent coupon being released.
    pub intent: String,
    /// The item the lease is on.
    pub id: String,
    /// Unlock text for locked coupons.
    pub unlock: String,
}

/// Check a live intent record against what the caller presented.
///
/// Returns `Ok(true)` when a live record exists and matches (the lease is
/// being used), `Ok(false)` when there is no live record at all. Mismatches
/// fail: a missing supplied coupon or a wrong holder is `Locked`, a record
/// with a foreign intention is `BadRequest`.
pub(crate) fn verify_intent(
    t: &mut dyn Txn,
    item_id: &str,
    supplied: Option<&str>,
    updater_key: &str,
    now: i64,
) -> Outcome<bool> {
    let got = store_outcome(t.get(Collection::Intents, item_id));
    if !got.is_ok() {
        return got.recast();
    }
    let fresh = require_fresh(
        Collection::Intents,
        item_id,
        got.into_value().flatten(),
        now,
    );
    if !fresh.is_ok() {
        // expired or absent records read as no lease
        return Outcome::good(false);
    }
    let doc = fresh.and_then(from_doc::<IntentDoc>);
    let Some(rec) = doc.value().cloned() else {
        return doc.recast();
    };

    Outcome::good(true)
        .ensure(
            supplied.is_some(),
            Code::Locked,
            "Update rejected as no intent key provided for locked item",
        )
        .ensure(
            supplied == Some(rec.intent.as_str()),
            Code::Locked,
            "item is already locked by another intent",
        )
        .ensure(
            rec.intention == "update",
            Code::BadRequest,
            format!("intent {} not qualified for update", rec.intent),
        )
        .ensure(
            rec.updater == updater_key,
            Code::Locked,
            format!("intent not assigned to this updater {updater_key}"),
        )
}

impl<S: DocStore + 'static> Exchange<S> {
    /// Acquire an intent lease on an item, inside the caller's read
    /// transaction.
    ///
    /// If another unexpired lease is pending the outcome fails `Locked`
    /// and its carried grant reports the seconds left on that lease.
    #[allow(clippy::arithmetic_side_effects)]
    pub(crate) fn acquire_intent(
        &self,
        t: &mut dyn Txn,
        item_id: &str,
        plan: &str,
        account_id: &str,
        updater_key: &str,
        intention: &str,
    ) -> Outcome<IntentGrant> {
        let minted = self.registry().mint_intent(plan, account_id, intention);
        let Some(coupon) = minted.value().cloned() else {
            return minted.recast();
        };
        // decode our own mint to learn its exact expiry
        let pack = self.registry().key_pack(&coupon, "");
        let Some(pack) = pack.value().filter(|_| pack.is_ok()).cloned() else {
            return Outcome::fail(Code::Internal, "minted intent failed to validate");
        };

        let now = self.now_millis();
        let got = store_outcome(t.get(Collection::Intents, item_id));
        if !got.is_ok() {
            return got.recast();
        }
        let existing = require_fresh(
            Collection::Intents,
            item_id,
            got.into_value().flatten(),
            now,
        );
        if existing.is_ok() {
            let remaining = existing
                .into_value()
                .and_then(|v| from_doc::<IntentDoc>(v).into_value())
                .map_or(0, |d| seconds_left(d.expires, now));
            return Outcome::good(IntentGrant {
                intent: String::new(),
                intent_expires: remaining,
            })
            .ensure(false, Code::Locked, "item is already locked by another key");
        }

        let record = IntentDoc {
            updater: updater_key.to_owned(),
            intent: coupon.clone(),
            intention: intention.to_owned(),
            expires: pack.valid_till,
        };
        let value = to_doc(&record);
        let Some(value) = value.value().cloned() else {
            return value.recast();
        };
        let put = store_outcome(t.set(Collection::Intents, item_id, value));
        if !put.is_ok() {
            return put.recast();
        }
        Outcome::good(IntentGrant {
            intent: coupon,
            intent_expires: seconds_left(pack.valid_till, now),
        })
    }

    /// Release an unconsumed intent. Idempotence is soft: releasing a
    /// lease that is not registered reports `NotFound`, not a hard
    /// failure.
    #[must_use]
    pub fn release_intent(&self, req: &ReleaseRequest) -> Outcome<()> {
        let updater = self.key_of(&req.updater, SeedType::Updater, "release intents", &req.unlock);
        let Some(updater) = updater.value().filter(|_| updater.is_ok()).cloned() else {
            return updater.recast();
        };
        let intent = self.key_of(&req.intent, SeedType::Intent, "release intents", &req.unlock);
        if !intent.is_ok() {
            return intent.recast();
        }
        let id = self.key_of(&req.id, SeedType::Item, "release intents", &req.unlock);
        let Some(id) = id.value().filter(|_| id.is_ok()).cloned() else {
            return id.recast();
        };

        let account = self.check_account(&id.account_id);
        if !account.is_ok() {
            return account.recast();
        }

        let now = self.now_millis();
        self.store().transact(|t| {
            let used = verify_intent(t, &id.key, Some(req.intent.as_str()), &updater.key, now);
            let Some(&used) = used.value().filter(|_| used.is_ok()) else {
                return used.recast();
            };
            if !used {
                return Outcome::fail(
                    Code::NotFound,
                    format!("intent {} not found", req.intent),
                );
            }
            let gone = store_outcome(t.delete(Collection::Intents, &id.key));
            gone.finish(Code::NoContent)
        })
    }

    /// Type-check a presented coupon for an operation.
    pub(crate) fn key_of(
        &self,
        code: &str,
        expected: SeedType,
        doing: &str,
        unlock: &str,
    ) -> Outcome<vouch_registry::KeyPack> {
        let pack = self.registry().key_pack(code, unlock);
        let kind = pack.value().map(|p| p.kind);
        pack.ensure(
            kind == Some(expected),
            Code::Unauthorized,
            format!("You need a {expected} key to {doing}"),
        )
    }
}

/// Whole seconds until `expires`, rounded up, never negative.
#[allow(clippy::arithmetic_side_effects)]
fn seconds_left(expires: i64, now: i64) -> i64 {
    ((expires.saturating_sub(now)).max(0) + 999) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seconds_round_up() {
        assert_eq!(seconds_left(15_000, 0), 15);
        assert_eq!(seconds_left(14_001, 0), 15);
        assert_eq!(seconds_left(1, 0), 1);
        assert_eq!(seconds_left(0, 10), 0);
    }

    #[test]
    fn verify_treats_missing_and_expired_as_unlocked() {
        let store = vouch_store::MemoryDocStore::new();
        let out = store.transact(|t| verify_intent(t, "item-1", None, "upa-key", 1_000));
        assert_eq!(out.into_value(), Some(false));

        store
            .set(
                Collection::Intents,
                "item-1",
                json!({
                    "updater": "upa-key",
                    "intent": "ina-coupon",
                    "intention": "update",
                    "expires": 500
                }),
            )
            .expect("set");
        let out = store.transact(|t| verify_intent(t, "item-1", None, "upa-key", 1_000));
        assert_eq!(out.into_value(), Some(false));
    }

    #[test]
    fn verify_distinguishes_the_failure_modes() {
        let store = vouch_store::MemoryDocStore::new();
        store
            .set(
                Collection::Intents,
                "item-1",
                json!({
                    "updater": "upa-key",
                    "intent": "ina-coupon",
                    "intention": "update",
                    "expires": 99_000
                }),
            )
            .expect("set");

        // locked item, no intent supplied
        let out = store.transact(|t| verify_intent(t, "item-1", None, "upa-key", 1_000));
        assert_eq!(out.code(), Code::Locked);

        // wrong intent coupon
        let out =
            store.transact(|t| verify_intent(t, "item-1", Some("other"), "upa-key", 1_000));
        assert_eq!(out.code(), Code::Locked);

        // wrong updater
        let out = store
            .transact(|t| verify_intent(t, "item-1", Some("ina-coupon"), "someone-else", 1_000));
        assert_eq!(out.code(), Code::Locked);

        // the happy path marks the lease used
        let out = store
            .transact(|t| verify_intent(t, "item-1", Some("ina-coupon"), "upa-key", 1_000));
        assert_eq!(out.into_value(), Some(true));
    }

    #[test]
    fn foreign_intentions_are_bad_requests() {
        let store = vouch_store::MemoryDocStore::new();
        store
            .set(
                Collection::Intents,
                "item-1",
                json!({
                    "updater": "upa-key",
                    "intent": "ina-coupon",
                    "intention": "delete",
                    "expires": 99_000
                }),
            )
            .expect("set");
        let out = store
            .transact(|t| verify_intent(t, "item-1", Some("ina-coupon"), "upa-key", 1_000));
        assert_eq!(out.code(), Code::BadRequest);
    }
}
