//! Alias indirection: logical names over item ids.
//!
//! An alias record maps `(alias, access key)` to the current item id, so
//! every key sees its own repointable name. Repointing migrates the
//! watchable records that were registered through the alias, keeping
//! subscriptions resolving to the new item.

use vouch_core::{Code, Outcome};
use vouch_store::{Collection, DocStore, Txn, require_fresh};

use crate::docs::{AliasDoc, ItemDoc, WatchableDoc, from_doc, to_doc};
use crate::{Exchange, store_outcome};

/// Parameters for binding an alias to an item for one access key.
#[derive(Debug, Clone, Default)]
pub struct AliasRequest {
    /// The writer coupon that created the item.
    pub writer: String,
    /// The access key the alias is being bound for.
    pub key: String,
    /// The item id the alias will point at.
    pub id: String,
    /// The logical name.
    pub alias: String,
    /// Unlock text for locked coupons.
    pub unlock: String,
}

/// Where an operation's presented id actually landed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Target {
    /// The resolved item id.
    pub item_id: String,
    /// The alias the caller came through, if any.
    pub alias: Option<String>,
    /// Working expiry: the item coupon's, narrowed by the alias record's.
    pub valid_till: i64,
}

/// The alias collection document key for an `(alias, access key)` pair.
pub(crate) fn alias_key(alias: &str, key: &str) -> String {
    format!("{alias}-{key}")
}

impl<S: DocStore + 'static> Exchange<S> {
    /// Resolve a presented id to an item id, following the alias record
    /// for this access key when the id is not an item-class coupon.
    pub(crate) fn resolve_target(
        &self,
        t: &mut dyn Txn,
        presented: &str,
        access_key: &str,
        unlock: &str,
    ) -> Outcome<Target> {
        if self.registry().is_item_key(presented, unlock) {
            let idp = self.registry().key_pack(presented, unlock);
            let Some(pack) = idp.value().filter(|_| idp.is_ok()).cloned() else {
                return idp.recast();
            };
            return Outcome::good(Target {
                item_id: presented.to_owned(),
                alias: None,
                valid_till: pack.valid_till,
            });
        }

        let now = self.now_millis();
        let doc_key = alias_key(presented, access_key);
        let got = store_outcome(t.get(Collection::Aliases, &doc_key));
        if !got.is_ok() {
            return got.recast();
        }
        let fresh = require_fresh(
            Collection::Aliases,
            &doc_key,
            got.into_value().flatten(),
            now,
        );
        let record = fresh.and_then(from_doc::<AliasDoc>);
        let Some(alias_doc) = record.value().filter(|_| record.is_ok()).cloned() else {
            return record.recast();
        };

        let idp = self.registry().key_pack(&alias_doc.id, unlock);
        let Some(pack) = idp.value().filter(|_| idp.is_ok()).cloned() else {
            return idp.recast();
        };
        Outcome::good(Target {
            item_id: alias_doc.id,
            alias: Some(presented.to_owned()),
            valid_till: pack.valid_till.min(alias_doc.expires),
        })
    }

    /// Resolve a presented id standalone: an item coupon comes back as
    /// itself, anything else through the alias record for this access
    /// key. The same resolution every operation performs, exposed for
    /// the API layer.
    #[must_use]
    pub fn resolve_alias(&self, presented: &str, access_key: &str, unlock: &str) -> Outcome<Target> {
        self.store()
            .transact(|t| self.resolve_target(t, presented, access_key, unlock))
    }

    /// Bind an alias to an item for one access key. Only the item's
    /// original writer may do this.
    #[must_use]
    pub fn register_alias(&self, req: &AliasRequest) -> Outcome<()> {
        let writer = self.registry().key_pack(&req.writer, &req.unlock);
        let Some(writer) = writer.value().filter(|_| writer.is_ok()).cloned() else {
            return writer.recast();
        };
        let access = self.registry().key_pack(&req.key, &req.unlock);
        let Some(access) = access.value().filter(|_| access.is_ok()).cloned() else {
            return access.recast();
        };
        let idp = self.registry().key_pack(&req.id, &req.unlock);
        if !idp.is_ok() {
            return idp.recast();
        }
        let out: Outcome<()> = Outcome::good(()).ensure(
            !req.alias.is_empty(),
            Code::BadRequest,
            "an alias name is required",
        );
        if !out.is_ok() {
            return out;
        }

        // no transaction needed here: a half-applied alias is harmless,
        // the store's freshness checks cover the races
        let now = self.now_millis();
        let got = store_outcome(self.store().get(Collection::Items, &req.id));
        if !got.is_ok() {
            return got.recast();
        }
        let item = require_fresh(Collection::Items, &req.id, got.into_value().flatten(), now)
            .and_then(from_doc::<ItemDoc>);
        let Some(item) = item.value().filter(|_| item.is_ok()).cloned() else {
            return item.recast();
        };
        let allowed: Outcome<()> = Outcome::good(()).ensure(
            item.meta.writer == writer.key,
            Code::Unauthorized,
            "Only the original writer key can make aliases",
        );
        if !allowed.is_ok() {
            return allowed;
        }

        self.set_alias(
            &req.alias,
            &req.id,
            item.expires,
            &[(access.key, item.expires)],
        )
        .finish(Code::Created)
    }

    /// Point `alias` at `new_id` for a set of access keys, migrating any
    /// watchables that were registered through the old pointing inside
    /// the same transaction.
    pub(crate) fn set_alias(
        &self,
        alias: &str,
        new_id: &str,
        item_expires: i64,
        key_info: &[(String, i64)],
    ) -> Outcome<()> {
        let now = self.now_millis();
        self.store().transact(|t| {
            for (key, expires) in key_info {
                let doc_key = alias_key(alias, key);
                let got = store_outcome(t.get(Collection::Aliases, &doc_key));
                if !got.is_ok() {
                    return got.recast();
                }
                let live = require_fresh(
                    Collection::Aliases,
                    &doc_key,
                    got.into_value().flatten(),
                    now,
                )
                .and_then(from_doc::<AliasDoc>);
                if let Some(old) = live.value().filter(|_| live.is_ok()) {
                    let moved = self.migrate_watchables(t, alias, &old.id, new_id, item_expires);
                    if !moved.is_ok() {
                        return moved;
                    }
                }

                let record = to_doc(&AliasDoc {
                    id: new_id.to_owned(),
                    expires: *expires,
                });
                let Some(value) = record.value().cloned() else {
                    return record.recast();
                };
                let put = store_outcome(t.set(Collection::Aliases, &doc_key, value));
                if !put.is_ok() {
                    return put.recast();
                }
            }
            Outcome::good(())
        })
    }

    /// Rewrite watchables observing `old_id` through `alias` so they
    /// observe `new_id` instead.
    fn migrate_watchables(
        &self,
        t: &mut dyn Txn,
        alias: &str,
        old_id: &str,
        new_id: &str,
        item_expires: i64,
    ) -> Outcome<()> {
        let now = self.now_millis();
        let scanned = store_outcome(t.scan(Collection::Watchables));
        let Some(watchables) = scanned.value().cloned() else {
            return scanned.recast();
        };
        for (wid, value) in watchables {
            let Some(mut doc) = from_doc::<WatchableDoc>(value).into_value() else {
                continue;
            };
            if doc.id != old_id || doc.alias != alias || (doc.expires > 0 && doc.expires <= now) {
                continue;
            }
            doc.id = new_id.to_owned();
            doc.meta.modified = now;
            doc.expires = item_expires;
            let record = to_doc(&doc);
            let Some(record) = record.value().cloned() else {
                return record.recast();
            };
            let put = store_outcome(t.set(Collection::Watchables, &wid, record));
            if !put.is_ok() {
                return put.recast();
            }
        }
        Outcome::good(())
    }
}
