//! Coupon minting: access keys, item ids, intents, watchables.

use chrono::{DateTime, Days, Utc};
use rand::Rng as _;
use vouch_core::{Code, Outcome};
use vouch_coupon::decode_base32;

use crate::registry::{KeyPack, Registry};
use crate::seed::SeedType;

/// Parameters for minting one coupon.
#[derive(Debug, Clone)]
pub struct MintRequest {
    /// Capability kind to mint.
    pub kind: SeedType,
    /// Plan tier.
    pub plan: String,
    /// Account id in base-32; embedded in both the prefix and the extra
    /// field.
    pub account_id: String,
    /// Lifetime in calendar days. Mutually exclusive with `seconds`.
    pub days: Option<u32>,
    /// Lifetime in seconds. Mutually exclusive with `days`.
    pub seconds: Option<i64>,
    /// Lock text folded into the signing secret; decoding then needs the
    /// same text as an unlock.
    pub lock: String,
}

/// A batch of access keys swapped for a boss coupon.
#[derive(Debug, Clone, serde::Serialize)]
pub struct KeyBatch {
    /// Capability kind of every key in the batch.
    pub kind: SeedType,
    /// Plan tier.
    pub plan: String,
    /// Account the keys belong to.
    pub account_id: String,
    /// Nominal expiry of the batch, epoch milliseconds. Individual keys
    /// are jittered up to a second earlier.
    pub valid_till: i64,
    /// The minted coupons.
    pub keys: Vec<String>,
}

impl Registry {
    /// Mint one coupon of any kind for an account.
    ///
    /// The account id rides twice: appended to the seed prefix as text and
    /// embedded numerically in the coupon's extra field.
    #[must_use]
    pub fn mint_coupon(&self, req: &MintRequest) -> Outcome<String> {
        let Some(seed) = self.find_pair(req.kind, &req.plan) else {
            return Outcome::fail(
                Code::BadRequest,
                "no matching plan and type for coupon",
            );
        };
        let Some(account) = decode_base32(&req.account_id) else {
            return Outcome::fail(
                Code::BadRequest,
                format!("account id {} is not base-32", req.account_id),
            );
        };
        if req.days.is_some() && req.seconds.is_some() {
            return Outcome::fail(
                Code::BadRequest,
                "choose either seconds or days for key duration",
            );
        }

        let Some(target) = self.expiry_target(req.days, req.seconds) else {
            return Outcome::fail(Code::Internal, "expiry date out of range");
        };
        let secret = format!("{}{}", seed.secret, req.lock);
        let prefix = format!("{}{}", seed.prefix, req.account_id);
        match self.codec().generate(&secret, target, &prefix, account) {
            Ok(coupon) => Outcome::good(coupon),
            Err(err) => Outcome::fail(Code::Internal, err.to_string()),
        }
    }

    /// Swap a boss coupon for a batch of access keys.
    ///
    /// The boss seed's grants say which kinds it may mint; every key is
    /// clamped to the boss coupon's own expiry and jittered a little so
    /// the batch members differ.
    #[must_use]
    pub fn mint_keys(
        &self,
        boss: &KeyPack,
        kind: SeedType,
        count: usize,
        days: Option<u32>,
        seconds: Option<i64>,
        lock: &str,
    ) -> Outcome<KeyBatch> {
        let seed = self.find_seed(&boss.key);
        let granted = seed.is_some_and(|s| {
            s.kind == SeedType::Boss && s.grants.contains(&kind)
        });
        let out: Outcome<()> = Outcome::empty()
            .ensure(
                boss.kind == SeedType::Boss,
                Code::Unauthorized,
                "only boss keys can be swapped for access keys",
            )
            .ensure(seed.is_some(), Code::Internal, "cant find seed for key")
            .ensure(
                granted,
                Code::BadRequest,
                format!("your boss key doesn't allow you to generate {kind} keys"),
            )
            .ensure(boss.has_account(), Code::Internal, "account id is missing")
            .ensure(
                days.is_none() || seconds.is_none(),
                Code::BadRequest,
                "choose either seconds or days for key duration",
            );
        if !out.is_ok() {
            return out.recast();
        }
        let Some(ak) = self.find_pair(kind, &boss.plan) else {
            return Outcome::fail(Code::Internal, "cant find key to swap for boss key");
        };
        let Some(account) = decode_base32(&boss.account_id) else {
            return Outcome::fail(Code::Internal, "account id is missing");
        };

        let max_time = boss.valid_till;
        let target = self
            .expiry_target(days, seconds)
            .unwrap_or(max_time)
            .min(max_time);

        let now = self.now_millis();
        let secret = format!("{}{lock}", ak.secret);
        let mut rng = rand::thread_rng();
        let mut keys = Vec::with_capacity(count.max(1));
        for _ in 0..count.max(1) {
            // jitter makes the keys in a batch all a little different
            let a_bit_random = now.max(target.saturating_sub(rng.gen_range(0..1_000)));
            match self
                .codec()
                .generate(&secret, a_bit_random, &ak.prefix, account)
            {
                Ok(coupon) => keys.push(coupon),
                Err(err) => return Outcome::fail(Code::Internal, err.to_string()),
            }
        }

        Outcome::good(KeyBatch {
            kind,
            plan: boss.plan.clone(),
            account_id: boss.account_id.clone(),
            valid_till: target,
            keys,
        })
    }

    /// Mint an intent coupon: a 15-second exclusive update lease.
    ///
    /// `"update"` is the only intention the protocol accepts.
    #[must_use]
    pub fn mint_intent(
        &self,
        plan: &str,
        account_id: &str,
        intention: &str,
    ) -> Outcome<String> {
        let out: Outcome<()> = Outcome::empty().ensure(
            intention == "update",
            Code::BadRequest,
            "intention=update is the only currently supported value",
        );
        if !out.is_ok() {
            return out.recast();
        }
        let Some(seed) = self.find_pair(SeedType::Intent, plan) else {
            return Outcome::fail(
                Code::Internal,
                format!("couldnt find intent seed for plan {plan}"),
            );
        };
        let account = decode_base32(account_id).unwrap_or_default();
        let expiry = self
            .now_millis()
            .saturating_add(self.settings().intent_lifetime_ms);
        match self
            .codec()
            .generate(&seed.secret, expiry, &seed.prefix, account)
        {
            Ok(coupon) => Outcome::good(coupon),
            Err(err) => Outcome::fail(Code::Internal, err.to_string()),
        }
    }

    /// Mint an item-class coupon used as a fresh document id.
    #[must_use]
    pub fn mint_item_id(
        &self,
        plan: &str,
        account_id: &str,
        lifetime_secs: i64,
    ) -> Outcome<String> {
        self.mint_coupon(&MintRequest {
            kind: SeedType::Item,
            plan: plan.to_owned(),
            account_id: account_id.to_owned(),
            days: None,
            seconds: Some(lifetime_secs),
            lock: String::new(),
        })
    }

    /// Mint a watchable-class coupon expiring at an explicit timestamp.
    #[must_use]
    pub fn mint_watch_id(
        &self,
        plan: &str,
        account_id: &str,
        expiry_millis: i64,
    ) -> Outcome<String> {
        let Some(seed) = self.find_pair(SeedType::Watchable, plan) else {
            return Outcome::fail(
                Code::Internal,
                format!("couldnt find watchable seed for plan {plan}"),
            );
        };
        let account = decode_base32(account_id).unwrap_or_default();
        match self
            .codec()
            .generate(&seed.secret, expiry_millis, &seed.prefix, account)
        {
            Ok(coupon) => Outcome::good(coupon),
            Err(err) => Outcome::fail(Code::Internal, err.to_string()),
        }
    }

    /// Clamp a requested item lifetime to what the plan and the writer
    /// key's remaining validity allow. Returns the lifetime in seconds.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)]
    pub fn prepare_lifetime(
        &self,
        plan_id: &str,
        requested_secs: i64,
        writer_code: &str,
        unlock: &str,
    ) -> Outcome<i64> {
        let Some(plan) = self.plan(plan_id) else {
            return Outcome::fail(
                Code::Internal,
                format!("Can't find plan info for plan:{plan_id}"),
            );
        };
        let out: Outcome<()> = Outcome::empty().ensure(
            requested_secs <= plan.max_lifetime || requested_secs == 0,
            Code::BadRequest,
            format!(
                "Max lifetime for your plan is {} you asked for {requested_secs}",
                plan.max_lifetime
            ),
        );
        if !out.is_ok() {
            return out.recast();
        }

        let writer = self.key_pack(writer_code, unlock);
        let Some(writer) = writer.value().filter(|_| writer.is_ok()) else {
            return Outcome::fail(Code::Internal, "Writer key gone invalid - try again");
        };

        let now = self.now_millis();
        let requested = if requested_secs > 0 {
            requested_secs
        } else {
            plan.lifetime
        };
        let lifetime = requested
            .min((writer.valid_till - now).div_euclid(1000))
            .min(plan.max_lifetime);

        Outcome::good(lifetime).ensure(
            lifetime > 0,
            Code::Internal,
            format!("Item would have a lifetime of {lifetime}"),
        )
    }

    /// Plan write-size guard.
    #[must_use]
    pub fn check_size(&self, plan_id: &str, bytes: usize) -> Outcome<()> {
        let Some(plan) = self.plan(plan_id) else {
            return Outcome::fail(Code::Internal, format!("plan not found {plan_id}"));
        };
        Outcome::good(()).ensure(
            bytes <= plan.max_size,
            Code::Quota,
            format!("exceeded write size of {} for quota", plan.max_size),
        )
    }

    /// Expiry target from optional days/seconds, defaulting to the
    /// configured day count. Calendar-day arithmetic for day lifetimes.
    fn expiry_target(&self, days: Option<u32>, seconds: Option<i64>) -> Option<i64> {
        let now = self.now_millis();
        if let Some(secs) = seconds {
            return Some(now.saturating_add(secs.saturating_mul(1000)));
        }
        let days = days.unwrap_or(self.settings().default_days);
        DateTime::<Utc>::from_timestamp_millis(now)?
            .checked_add_days(Days::new(u64::from(days)))
            .map(|d| d.timestamp_millis())
    }
}
