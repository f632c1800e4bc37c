//! Watchable subscriptions - the data half of update observation.
//!
//! A watchable is a stored record saying "this key wants to know when
//! that item updates". Delivery (push, webhooks) belongs to an external
//! collaborator; here we register subscriptions, record observations on
//! update, and keep subscriptions pointing at the right item when an
//! alias repoints.

use rand::Rng as _;
use serde_json::Value;
use vouch_core::{Code, Outcome};
use vouch_registry::SeedType;
use vouch_store::{Collection, DocStore, require_fresh};

use crate::alias::alias_key;
use crate::docs::{WatchMeta, WatchableDoc, from_doc, to_doc};
use crate::resolver::ReadRequest;
use crate::{Exchange, store_outcome};

/// Extra life a watchable keeps beyond its nominal expiry, seconds.
const WATCH_SLACK_SECS: i64 = 30;

/// Parameters for registering a watchable.
#[derive(Debug, Clone, Default)]
pub struct WatchRequest {
    /// Access coupon; must be able to read the item.
    pub reader: String,
    /// Item coupon or alias name.
    pub id: String,
    /// Event to observe; only `"update"` exists.
    pub event: String,
    /// Delivery options kept opaque for the push collaborator (message,
    /// push id, and so on).
    pub options: Value,
    /// Caller session tag.
    pub session: String,
    /// Unlock text for locked coupons.
    pub unlock: String,
}

/// What a successful registration reports.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WatchReceipt {
    /// The watchable coupon, used to read or unregister later.
    pub watchable: String,
    /// The item under observation.
    pub id: String,
    /// The alias the registration came through, if any.
    pub alias: Option<String>,
    /// The observed event.
    pub event: String,
    /// Nominal expiry of the subscription, epoch milliseconds.
    pub valid_till: i64,
}

/// A watchable read back by an access key.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WatchView {
    /// The watchable coupon.
    pub watchable: String,
    /// The item under observation.
    pub id: String,
    /// Alias it was registered through, or empty.
    pub alias: String,
    /// The observed event.
    pub event: String,
    /// Observation times, oldest first.
    pub values: Vec<i64>,
    /// The newest observation, zero before the first.
    pub latest_observation: i64,
    /// The registered message: real for writer keys, redacted otherwise.
    pub message: Option<Value>,
    /// Server time of the read.
    pub now: i64,
}

impl<S: DocStore + 'static> Exchange<S> {
    /// Register a watchable on an item (or alias) the key can read.
    ///
    /// Aliased subscriptions outlive the current item: the alias can be
    /// repointed, so their lifetime follows the registering key instead.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn register_watch(&self, req: &WatchRequest) -> Outcome<WatchReceipt> {
        let read = self.read_item(&ReadRequest {
            reader: req.reader.clone(),
            id: req.id.clone(),
            intention: None,
            session: req.session.clone(),
            unlock: req.unlock.clone(),
        });
        let Some(read) = read.value().filter(|_| read.is_ok()).cloned() else {
            return read.recast();
        };

        let checks: Outcome<()> = Outcome::good(())
            .ensure(
                !req.options.is_null(),
                Code::BadRequest,
                "registering a watchable needs log options",
            )
            .ensure(req.event == "update", Code::BadRequest, "unknown event type");
        if !checks.is_ok() {
            return checks.recast();
        }

        let key = self.registry().key_pack(&req.reader, &req.unlock);
        let Some(key) = key.value().filter(|_| key.is_ok()).cloned() else {
            return key.recast();
        };

        let base = if read.alias.is_some() {
            key.valid_till
        } else {
            read.valid_till
        };
        let grace = self.registry().settings().grace_ms;
        let jitter = rand::thread_rng().gen_range(0.0..1.0_f64);
        let valid_till = base.saturating_add(
            ((grace as f64) * (1.0 + jitter)).ceil() as i64,
        );

        let minted = self
            .registry()
            .mint_watch_id(&key.plan, &key.account_id, valid_till);
        let Some(watchable) = minted.value().filter(|_| minted.is_ok()).cloned() else {
            return minted.recast();
        };

        let now = self.now_millis();
        let life_secs = valid_till
            .saturating_sub(now)
            .div_euclid(1000)
            .saturating_add(WATCH_SLACK_SECS);
        let doc = to_doc(&WatchableDoc {
            id: read.id.clone(),
            alias: read.alias.clone().unwrap_or_default(),
            event: req.event.clone(),
            key: req.reader.clone(),
            options: req.options.clone(),
            observations: std::collections::BTreeMap::new(),
            latest_observation: 0,
            meta: WatchMeta {
                session: req.session.clone(),
                modified: now,
                alias_key: read
                    .alias
                    .as_deref()
                    .map(|a| alias_key(a, &req.reader))
                    .unwrap_or_default(),
            },
            expires: now.saturating_add(life_secs.saturating_mul(1000)),
        });
        let Some(value) = doc.value().cloned() else {
            return doc.recast();
        };
        let put = store_outcome(self.store().set(Collection::Watchables, &watchable, value));
        if !put.is_ok() {
            return put.recast();
        }

        Outcome::good(WatchReceipt {
            watchable,
            id: read.id,
            alias: read.alias,
            event: req.event.clone(),
            valid_till,
        })
        .finish(Code::Created)
    }

    /// Read a watchable back. Any access key of the same account may;
    /// only writer keys see the registered message.
    #[must_use]
    pub fn read_watch(&self, reader: &str, watchable: &str, unlock: &str) -> Outcome<WatchView> {
        let key = self.registry().key_pack(reader, unlock);
        let kind = key.value().map(|p| p.kind);
        let key = key.ensure(
            kind.is_some_and(SeedType::can_read),
            Code::Unauthorized,
            "You need a updater or reader or writer key to read watchables",
        );
        let Some(key) = key.value().filter(|_| key.is_ok()).cloned() else {
            return key.recast();
        };
        let wp = self.key_of(watchable, SeedType::Watchable, "read watchables", unlock);
        let Some(wp) = wp.value().filter(|_| wp.is_ok()).cloned() else {
            return wp.recast();
        };
        let gate: Outcome<()> = Outcome::good(()).ensure(
            wp.account_id == key.account_id,
            Code::Unauthorized,
            "These keys are for different accounts",
        );
        if !gate.is_ok() {
            return gate.recast();
        }

        let now = self.now_millis();
        let got = store_outcome(self.store().get(Collection::Watchables, &wp.key));
        if !got.is_ok() {
            return got.recast();
        }
        let doc = require_fresh(Collection::Watchables, &wp.key, got.into_value().flatten(), now)
            .and_then(from_doc::<WatchableDoc>);
        let Some(doc) = doc.value().filter(|_| doc.is_ok()).cloned() else {
            return doc.recast();
        };

        let message = doc.options.get("message").cloned().map(|m| {
            if key.kind == SeedType::Writer {
                m
            } else {
                Value::String("REDACTED: use the writer key to see the message".into())
            }
        });
        Outcome::good(WatchView {
            watchable: wp.key,
            id: doc.id,
            alias: doc.alias,
            event: doc.event,
            values: doc.observations.values().copied().collect(),
            latest_observation: doc.latest_observation,
            message,
            now,
        })
    }

    /// Unregister a watchable by presenting its coupon.
    #[must_use]
    pub fn unregister_watch(&self, watchable: &str, unlock: &str) -> Outcome<()> {
        let wp = self.key_of(watchable, SeedType::Watchable, "remove watchables", unlock);
        let Some(wp) = wp.value().filter(|_| wp.is_ok()).cloned() else {
            return wp.recast();
        };
        let now = self.now_millis();
        self.store().transact(|t| {
            let got = store_outcome(t.get(Collection::Watchables, &wp.key));
            if !got.is_ok() {
                return got.recast();
            }
            let fresh = require_fresh(
                Collection::Watchables,
                &wp.key,
                got.into_value().flatten(),
                now,
            );
            if !fresh.is_ok() {
                return fresh.recast();
            }
            store_outcome(t.delete(Collection::Watchables, &wp.key)).finish(Code::NoContent)
        })
    }

    /// Record an observation on every live watchable of an item, one
    /// transaction for the lot. Returns how many were touched.
    #[must_use]
    pub fn record_update(&self, item_id: &str, event: &str, modified: i64) -> Outcome<usize> {
        let now = self.now_millis();
        self.store().transact(|t| {
            let scanned = store_outcome(t.scan(Collection::Watchables));
            let Some(watchables) = scanned.value().cloned() else {
                return scanned.recast();
            };
            let mut touched = 0_usize;
            for (wid, value) in watchables {
                let Some(mut doc) = from_doc::<WatchableDoc>(value).into_value() else {
                    continue;
                };
                if doc.id != item_id
                    || doc.event != event
                    || (doc.expires > 0 && doc.expires <= now)
                {
                    continue;
                }
                doc.latest_observation = modified;
                doc.observations.insert(modified.to_string(), modified);
                let record = to_doc(&doc);
                let Some(record) = record.value().cloned() else {
                    return record.recast();
                };
                let put = store_outcome(t.set(Collection::Watchables, &wid, record));
                if !put.is_ok() {
                    return put.recast();
                }
                touched = touched.saturating_add(1);
            }
            Outcome::good(touched)
        })
    }
}
