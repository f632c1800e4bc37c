//! Accounts and boss-key administration.

use vouch_core::{Code, Outcome};
use vouch_registry::{KeyBatch, SeedType};
use vouch_store::{Collection, DocStore, require_fresh};

use crate::docs::{AccountDoc, BossDoc, from_doc, to_doc};
use crate::{Exchange, store_outcome};

/// Parameters for swapping a boss coupon for access keys.
#[derive(Debug, Clone)]
pub struct KeySwapRequest {
    /// The registered boss coupon.
    pub boss: String,
    /// Which capability kind to mint.
    pub kind: SeedType,
    /// How many keys; zero still mints one.
    pub count: usize,
    /// Key lifetime in calendar days. Mutually exclusive with `seconds`.
    pub days: Option<u32>,
    /// Key lifetime in seconds. Mutually exclusive with `days`.
    pub seconds: Option<i64>,
    /// Lock text folded into the new keys' secrets.
    pub lock: String,
    /// Unlock text for the boss coupon itself.
    pub unlock: String,
}

impl<S: DocStore + 'static> Exchange<S> {
    /// Confirm an account exists, is fresh, and is active.
    ///
    /// Everything short of a collaborator failure reads as the same
    /// `Unauthorized`: a missing, lapsed, or switched-off account gets no
    /// further detail.
    #[must_use]
    pub fn check_account(&self, account_id: &str) -> Outcome<()> {
        let now = self.now_millis();
        let got = store_outcome(self.store().get(Collection::Accounts, account_id));
        if !got.is_ok() {
            return got.recast();
        }
        let fresh = require_fresh(
            Collection::Accounts,
            account_id,
            got.into_value().flatten(),
            now,
        );
        if !fresh.is_ok() {
            return Outcome::fail(Code::Unauthorized, "account not active");
        }
        let doc = fresh.and_then(from_doc::<AccountDoc>);
        let active = doc.value().is_some_and(|d| d.active);
        doc.map(|_| ())
            .ensure(active, Code::Unauthorized, "account not active")
    }

    /// Register or update an account record.
    #[must_use]
    pub fn put_account(&self, account_id: &str, plan_id: &str, active: bool) -> Outcome<()> {
        if self.registry().plan(plan_id).is_none() {
            return Outcome::fail(Code::BadRequest, format!("unknown plan {plan_id}"));
        }
        let doc = to_doc(&AccountDoc {
            plan_id: plan_id.to_owned(),
            active,
            modified: self.now_millis(),
            expires: 0,
        });
        let Some(value) = doc.value().cloned() else {
            return doc.recast();
        };
        store_outcome(self.store().set(Collection::Accounts, account_id, value))
            .finish(Code::Created)
    }

    /// Remove an account record.
    #[must_use]
    pub fn remove_account(&self, account_id: &str) -> Outcome<()> {
        store_outcome(self.store().delete(Collection::Accounts, account_id))
            .finish(Code::NoContent)
    }

    /// Register a boss coupon so it can later be swapped for access keys.
    #[must_use]
    pub fn register_boss(&self, coupon: &str, unlock: &str) -> Outcome<()> {
        let pack = self.key_of(coupon, SeedType::Boss, "register boss keys", unlock);
        let Some(pack) = pack.value().filter(|_| pack.is_ok()).cloned() else {
            return pack.recast();
        };
        let out: Outcome<()> = Outcome::good(()).ensure(
            pack.has_account(),
            Code::Internal,
            "account id is missing",
        );
        if !out.is_ok() {
            return out;
        }
        let account = self.check_account(&pack.account_id);
        if !account.is_ok() {
            return account.recast();
        }

        let doc = to_doc(&BossDoc {
            account_id: pack.account_id,
            modified: self.now_millis(),
            expires: pack.valid_till,
        });
        let Some(value) = doc.value().cloned() else {
            return doc.recast();
        };
        store_outcome(self.store().set(Collection::Bosses, &pack.key, value))
            .finish(Code::Created)
    }

    /// Swap a registered boss coupon for a batch of access keys.
    #[must_use]
    pub fn generate_keys(&self, req: &KeySwapRequest) -> Outcome<KeyBatch> {
        let pack = self.registry().key_pack(&req.boss, &req.unlock);
        let Some(pack) = pack.value().filter(|_| pack.is_ok()).cloned() else {
            return pack.recast();
        };

        let batch = self.registry().mint_keys(
            &pack,
            req.kind,
            req.count,
            req.days,
            req.seconds,
            &req.lock,
        );
        if !batch.is_ok() {
            return batch;
        }

        // the coupon must actually be registered, not merely well-signed
        let now = self.now_millis();
        let got = store_outcome(self.store().get(Collection::Bosses, &pack.key));
        if !got.is_ok() {
            return got.recast();
        }
        let registered = require_fresh(
            Collection::Bosses,
            &pack.key,
            got.into_value().flatten(),
            now,
        );
        if !registered.is_ok() {
            return registered.recast();
        }
        let account = self.check_account(&pack.account_id);
        if !account.is_ok() {
            return account.recast();
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{activate, exchange, mint};

    #[test]
    fn accounts_gate_on_presence_freshness_and_activity() {
        let (ex, _) = exchange();
        assert_eq!(ex.check_account("1f").code(), Code::Unauthorized);

        activate(&ex, "1f");
        assert!(ex.check_account("1f").is_ok());

        assert!(ex.put_account("1f", "a", false).is_ok());
        assert_eq!(ex.check_account("1f").code(), Code::Unauthorized);

        assert_eq!(ex.remove_account("1f").code(), Code::NoContent);
        assert_eq!(ex.check_account("1f").code(), Code::Unauthorized);
    }

    #[test]
    fn put_account_rejects_unknown_plans() {
        let (ex, _) = exchange();
        assert_eq!(ex.put_account("1f", "zz", true).code(), Code::BadRequest);
    }

    #[test]
    fn boss_registration_requires_an_active_account() {
        let (ex, _) = exchange();
        let boss = mint(&ex, SeedType::Boss, "1f");
        assert_eq!(ex.register_boss(&boss, "").code(), Code::Unauthorized);

        activate(&ex, "1f");
        assert_eq!(ex.register_boss(&boss, "").code(), Code::Created);
    }

    #[test]
    fn key_swap_needs_a_registered_boss() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let boss = mint(&ex, SeedType::Boss, "1f");

        let req = KeySwapRequest {
            boss: boss.clone(),
            kind: SeedType::Reader,
            count: 2,
            days: None,
            seconds: Some(600),
            lock: String::new(),
            unlock: String::new(),
        };
        // well-signed but never registered
        assert_eq!(ex.generate_keys(&req).code(), Code::NotFound);

        assert!(ex.register_boss(&boss, "").is_ok());
        let batch = ex.generate_keys(&req).into_value().expect("batch");
        assert_eq!(batch.keys.len(), 2);
        for key in &batch.keys {
            let pack = ex.validate(key, "").into_value().expect("pack");
            assert_eq!(pack.kind, SeedType::Reader);
            assert_eq!(pack.account_id, "1f");
        }
    }

    #[test]
    fn non_boss_coupons_cannot_register() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        assert_eq!(ex.register_boss(&writer, "").code(), Code::Unauthorized);
    }
}
