//! Item operations: write, read, update, remove.
//!
//! Every operation runs the same gauntlet: decode the caller's coupon,
//! confirm the capability class fits the verb, resolve the presented id
//! (item coupon or alias), confirm the account is active, pass the rate
//! limiter, and only then touch the store - updates additionally through
//! the intent lock. The store work for each operation is one transaction.

use serde_json::Value;
use vouch_core::{Code, Outcome};
use vouch_registry::SeedType;
use vouch_store::{Collection, DocStore, require_fresh};

use crate::docs::{ItemDoc, ItemMeta, from_doc, to_doc};
use crate::intent::verify_intent;
use crate::{Exchange, store_outcome};

/// Parameters for creating an item.
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    /// Writer coupon.
    pub writer: String,
    /// The payload; `null` is rejected.
    pub data: Value,
    /// Requested lifetime in seconds; zero takes the plan default.
    pub lifetime_secs: i64,
    /// Reader coupons to grant access.
    pub readers: Vec<String>,
    /// Updater coupons to grant access.
    pub updaters: Vec<String>,
    /// Optional alias to bind for the writer and every accessor.
    pub alias: Option<String>,
    /// Caller session tag.
    pub session: String,
    /// Unlock text for locked coupons.
    pub unlock: String,
}

/// What a successful write reports.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WriteReceipt {
    /// The freshly minted item id.
    pub id: String,
    /// Plan the item was written under.
    pub plan: String,
    /// Owning account.
    pub account_id: String,
    /// Serialized payload size in bytes.
    pub size: usize,
    /// Granted lifetime in seconds, after clamping.
    pub lifetime_secs: i64,
    /// The alias bound, if one was asked for.
    pub alias: Option<String>,
    /// Echo of the session tag.
    pub session: String,
    /// Set when accessor lists failed lenient validation.
    pub warning: Option<String>,
}

/// Parameters for reading an item.
#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    /// Any access coupon the item lists (or its writer).
    pub reader: String,
    /// Item coupon or alias name.
    pub id: String,
    /// `Some("update")` acquires an intent lease with the read.
    pub intention: Option<String>,
    /// Caller session tag.
    pub session: String,
    /// Unlock text for locked coupons.
    pub unlock: String,
}

/// What a successful read reports.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReadReceipt {
    /// The resolved item id.
    pub id: String,
    /// The alias the read came through, if any.
    pub alias: Option<String>,
    /// The item payload.
    pub value: Value,
    /// Session tag stored on the item.
    pub session: String,
    /// Last mutation time.
    pub modified: i64,
    /// Working expiry of the read (item, narrowed by alias).
    pub valid_till: i64,
    /// Accessor lists, exposed to the writer key only.
    pub readers: Option<Vec<String>>,
    /// Accessor lists, exposed to the writer key only.
    pub updaters: Option<Vec<String>>,
    /// The intent lease, when one was acquired.
    pub intent: Option<String>,
    /// Seconds left on the lease - ours on success, the other holder's
    /// when the read failed `Locked`.
    pub intent_expires: Option<i64>,
}

/// Parameters for updating an item.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// Writer or updater coupon.
    pub updater: String,
    /// Item coupon or alias name.
    pub id: String,
    /// Replacement payload; `null` is rejected.
    pub data: Value,
    /// The intent lease acquired by a prior read-with-intention.
    pub intent: Option<String>,
    /// Replacement reader list; writer keys only.
    pub readers: Option<Vec<String>>,
    /// Replacement updater list; writer keys only.
    pub updaters: Option<Vec<String>>,
    /// Must stay zero: lifetimes cannot be changed after creation.
    pub lifetime_secs: i64,
    /// Caller session tag.
    pub session: String,
    /// Unlock text for locked coupons.
    pub unlock: String,
}

/// What a successful update reports.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UpdateReceipt {
    /// The resolved item id.
    pub id: String,
    /// The alias the update came through, if any.
    pub alias: Option<String>,
    /// Serialized payload size in bytes.
    pub size: usize,
    /// Echo of the session tag.
    pub session: String,
}

/// Parameters for removing an item.
#[derive(Debug, Clone, Default)]
pub struct RemoveRequest {
    /// The writer coupon that created the item.
    pub writer: String,
    /// Item coupon or alias name.
    pub id: String,
    /// Caller session tag.
    pub session: String,
    /// Unlock text for locked coupons.
    pub unlock: String,
}

impl<S: DocStore + 'static> Exchange<S> {
    /// Create a new item. Writer keys only.
    #[must_use]
    pub fn write_item(&self, req: &WriteRequest) -> Outcome<WriteReceipt> {
        let key = self.registry().key_pack(&req.writer, &req.unlock);
        let kind = key.value().map(|p| p.kind);
        let key = key.ensure(
            kind == Some(SeedType::Writer),
            Code::Unauthorized,
            "You need a writer key to be able to write new items",
        );
        let Some(key) = key.value().filter(|_| key.is_ok()).cloned() else {
            return key.recast();
        };

        let checks: Outcome<()> = Outcome::good(()).ensure(
            !req.data.is_null(),
            Code::BadRequest,
            "You need to provide some data",
        );
        if !checks.is_ok() {
            return checks.recast();
        }
        let Ok(d_write) = serde_json::to_string(&req.data) else {
            return Outcome::fail(Code::Internal, "data does not serialize");
        };
        let sized = self.registry().check_size(&key.plan, d_write.len());
        if !sized.is_ok() {
            return sized.recast();
        }

        // accessor lists are validated leniently: a bad key is a warning
        // in the receipt, never a failure
        let mut warning = None;
        for (label, list) in [("readers", &req.readers), ("updaters", &req.updaters)] {
            if !list.is_empty() && !self.accessors_usable(list) {
                warning = Some(format!(
                    "warning:{label} keys not validated-they may be locked"
                ));
            }
        }

        let account = self.check_account(&key.account_id);
        if !account.is_ok() {
            return account.recast();
        }

        let lifetime =
            self.registry()
                .prepare_lifetime(&key.plan, req.lifetime_secs, &key.key, &req.unlock);
        let Some(&lifetime_secs) = lifetime.value().filter(|_| lifetime.is_ok()) else {
            return lifetime.recast();
        };

        let minted = self
            .registry()
            .mint_item_id(&key.plan, &key.account_id, lifetime_secs);
        let Some(id) = minted.value().filter(|_| minted.is_ok()).cloned() else {
            return minted
                .recast()
                .ensure(false, Code::Internal, "failed to generate item id");
        };

        let charged = self.check_and_charge(&key.plan, &key.account_id, d_write.len());
        if !charged.is_ok() {
            return charged.recast();
        }

        let now = self.now_millis();
        let expires = now.saturating_add(lifetime_secs.saturating_mul(1000));
        let doc = to_doc(&ItemDoc {
            data: req.data.clone(),
            meta: ItemMeta {
                writer: key.key.clone(),
                readers: req.readers.clone(),
                updaters: req.updaters.clone(),
                session: req.session.clone(),
                modified: now,
            },
            expires,
        });
        let Some(value) = doc.value().cloned() else {
            return doc.recast();
        };
        let put = store_outcome(self.store().set(Collection::Items, &id, value));
        if !put.is_ok() {
            return put.recast();
        }

        if let Some(alias) = &req.alias {
            let bound = self.bind_write_alias(alias, &id, expires, &key.key, req);
            if !bound.is_ok() {
                return bound.recast();
            }
        }

        Outcome::good(WriteReceipt {
            id,
            plan: key.plan,
            account_id: key.account_id,
            size: d_write.len(),
            lifetime_secs,
            alias: req.alias.clone(),
            session: req.session.clone(),
            warning,
        })
        .finish(Code::Created)
    }

    /// Read an item, optionally acquiring an intent lease for a later
    /// update.
    #[must_use]
    pub fn read_item(&self, req: &ReadRequest) -> Outcome<ReadReceipt> {
        let key = self.registry().key_pack(&req.reader, &req.unlock);
        let Some(key) = key.value().filter(|_| key.is_ok()).cloned() else {
            return key.recast();
        };

        let checks: Outcome<()> = Outcome::good(())
            .ensure(!req.id.is_empty(), Code::BadRequest, "You need to supply an ID")
            .ensure(
                req.intention.is_none() || key.kind.can_update(),
                Code::BadRequest,
                "a read with intention must use a writer or updater key",
            );
        if !checks.is_ok() {
            return checks.recast();
        }

        let account = self.check_account(&key.account_id);
        if !account.is_ok() {
            return account.recast();
        }
        let charged = self.check_and_charge(&key.plan, &key.account_id, 0);
        if !charged.is_ok() {
            return charged.recast();
        }

        let now = self.now_millis();
        self.store().transact(|t| {
            let target = self.resolve_target(t, &req.id, &key.key, &req.unlock);
            let Some(target) = target.value().filter(|_| target.is_ok()).cloned() else {
                return target.recast();
            };

            let got = store_outcome(t.get(Collection::Items, &target.item_id));
            if !got.is_ok() {
                return got.recast();
            }
            let item = require_fresh(
                Collection::Items,
                &target.item_id,
                got.into_value().flatten(),
                now,
            )
            .and_then(from_doc::<ItemDoc>);
            let Some(item) = item.value().filter(|_| item.is_ok()).cloned() else {
                return item.recast();
            };

            let meta = &item.meta;
            let allowed = key.key == meta.writer
                || meta.readers.iter().chain(&meta.updaters).any(|k| *k == key.key);
            let gate: Outcome<()> = Outcome::good(()).ensure(
                allowed,
                Code::Unauthorized,
                "that access key is not allowed to read this item",
            );
            if !gate.is_ok() {
                return gate.recast();
            }

            let is_writer = key.key == meta.writer;
            let mut receipt = ReadReceipt {
                id: target.item_id.clone(),
                alias: target.alias.clone(),
                value: item.data.clone(),
                session: meta.session.clone(),
                modified: meta.modified,
                valid_till: target.valid_till,
                readers: is_writer.then(|| meta.readers.clone()),
                updaters: is_writer.then(|| meta.updaters.clone()),
                intent: None,
                intent_expires: None,
            };

            let Some(intention) = req.intention.as_deref() else {
                return Outcome::good(receipt);
            };
            let grant = self.acquire_intent(
                t,
                &target.item_id,
                &key.plan,
                &key.account_id,
                &key.key,
                intention,
            );
            receipt.intent_expires = grant.value().map(|g| g.intent_expires);
            if grant.is_ok() {
                receipt.intent = grant.into_value().map(|g| g.intent);
                Outcome::good(receipt)
            } else {
                Outcome::good(receipt).adopt(&grant)
            }
        })
    }

    /// Replace an item's payload. Writer or updater keys; a pending
    /// intent lease must be presented and is consumed by the update.
    #[must_use]
    pub fn update_item(&self, req: &UpdateRequest) -> Outcome<UpdateReceipt> {
        let key = self.registry().key_pack(&req.updater, &req.unlock);
        let kind = key.value().map(|p| p.kind);
        let key = key
            .ensure(
                kind.is_some_and(SeedType::can_update),
                Code::Unauthorized,
                "You need a writer or updater key to update items",
            )
            .ensure(
                req.lifetime_secs == 0,
                Code::Forbidden,
                "You cant change the lifetime of an existing item",
            );
        let Some(key) = key.value().filter(|_| key.is_ok()).cloned() else {
            return key.recast();
        };

        if let Some(intent) = &req.intent {
            let ip = self.registry().key_pack(intent, &req.unlock);
            let account = ip.value().map(|p| p.account_id.clone());
            let ip = ip.ensure(
                account.as_deref() == Some(key.account_id.as_str()),
                Code::BadRequest,
                "intent key not for this account",
            );
            if !ip.is_ok() {
                return ip.recast();
            }
        }

        let checks: Outcome<()> = Outcome::good(())
            .ensure(
                !req.data.is_null(),
                Code::BadRequest,
                "You need to provide some data",
            )
            .ensure(
                key.kind == SeedType::Writer
                    || (req.readers.is_none() && req.updaters.is_none()),
                Code::Forbidden,
                "Only writer keys can change updaters/readers list",
            );
        if !checks.is_ok() {
            return checks.recast();
        }
        let Ok(d_write) = serde_json::to_string(&req.data) else {
            return Outcome::fail(Code::Internal, "data does not serialize");
        };
        let sized = self.registry().check_size(&key.plan, d_write.len());
        if !sized.is_ok() {
            return sized.recast();
        }

        let account = self.check_account(&key.account_id);
        if !account.is_ok() {
            return account.recast();
        }
        let charged = self.check_and_charge(&key.plan, &key.account_id, d_write.len());
        if !charged.is_ok() {
            return charged.recast();
        }

        let now = self.now_millis();
        self.store().transact(|t| {
            let target = self.resolve_target(t, &req.id, &key.key, &req.unlock);
            let Some(target) = target.value().filter(|_| target.is_ok()).cloned() else {
                return target.recast();
            };

            let got = store_outcome(t.get(Collection::Items, &target.item_id));
            if !got.is_ok() {
                return got.recast();
            }
            let item = require_fresh(
                Collection::Items,
                &target.item_id,
                got.into_value().flatten(),
                now,
            )
            .and_then(from_doc::<ItemDoc>);
            let Some(item) = item.value().filter(|_| item.is_ok()).cloned() else {
                return item.recast();
            };

            let used = verify_intent(t, &target.item_id, req.intent.as_deref(), &key.key, now);
            let Some(&used) = used.value().filter(|_| used.is_ok()) else {
                return used.recast();
            };
            let gate: Outcome<()> = Outcome::good(())
                .ensure(
                    req.intent.is_none() || used,
                    Code::Gone,
                    format!(
                        "intent {} no longer registered",
                        req.intent.as_deref().unwrap_or_default()
                    ),
                )
                .ensure(
                    key.key == item.meta.writer || item.meta.updaters.contains(&key.key),
                    Code::Unauthorized,
                    "that access key is not allowed to update this item",
                );
            if !gate.is_ok() {
                return gate.recast();
            }

            let doc = to_doc(&ItemDoc {
                data: req.data.clone(),
                meta: ItemMeta {
                    writer: item.meta.writer.clone(),
                    readers: req.readers.clone().unwrap_or(item.meta.readers),
                    updaters: req.updaters.clone().unwrap_or(item.meta.updaters),
                    session: req.session.clone(),
                    modified: now,
                },
                expires: target.valid_till,
            });
            let Some(value) = doc.value().cloned() else {
                return doc.recast();
            };
            let put = store_outcome(t.set(Collection::Items, &target.item_id, value));
            if !put.is_ok() {
                return put.recast();
            }
            // a lease buys exactly one update
            if used {
                let gone = store_outcome(t.delete(Collection::Intents, &target.item_id));
                if !gone.is_ok() {
                    return gone.recast();
                }
            }

            Outcome::good(UpdateReceipt {
                id: target.item_id,
                alias: target.alias,
                size: d_write.len(),
                session: req.session.clone(),
            })
        })
    }

    /// Delete an item. Only the writer key that created it may; alias
    /// records are left to lapse on their own.
    #[must_use]
    pub fn remove_item(&self, req: &RemoveRequest) -> Outcome<()> {
        let key = self.registry().key_pack(&req.writer, &req.unlock);
        let kind = key.value().map(|p| p.kind);
        let key = key.ensure(
            kind == Some(SeedType::Writer),
            Code::Unauthorized,
            "You need a writer key to remove items",
        );
        let Some(key) = key.value().filter(|_| key.is_ok()).cloned() else {
            return key.recast();
        };

        let account = self.check_account(&key.account_id);
        if !account.is_ok() {
            return account.recast();
        }
        let charged = self.check_and_charge(&key.plan, &key.account_id, 0);
        if !charged.is_ok() {
            return charged.recast();
        }

        let now = self.now_millis();
        self.store().transact(|t| {
            let target = self.resolve_target(t, &req.id, &key.key, &req.unlock);
            let Some(target) = target.value().filter(|_| target.is_ok()).cloned() else {
                return target.recast();
            };

            let got = store_outcome(t.get(Collection::Items, &target.item_id));
            if !got.is_ok() {
                return got.recast();
            }
            let item = require_fresh(
                Collection::Items,
                &target.item_id,
                got.into_value().flatten(),
                now,
            )
            .and_then(from_doc::<ItemDoc>);
            let Some(item) = item.value().filter(|_| item.is_ok()).cloned() else {
                return item.recast();
            };

            let gate: Outcome<()> = Outcome::good(()).ensure(
                item.meta.writer == key.key,
                Code::Unauthorized,
                "that access key is not allowed to remove this item",
            );
            if !gate.is_ok() {
                return gate;
            }
            store_outcome(t.delete(Collection::Items, &target.item_id))
                .finish(Code::NoContent)
        })
    }

    /// Lenient accessor validation: every key must belong to a seed and
    /// decode valid and unexpired, with no unlock text.
    fn accessors_usable(&self, keys: &[String]) -> bool {
        keys.iter().all(|k| {
            let pack = self.registry().key_pack(k, "");
            pack.is_ok() && pack.value().is_some_and(|p| p.kind.can_read())
        })
    }

    /// Alias binding after a write: the writer and every accessor key get
    /// the alias, each narrowed to its own coupon's expiry.
    fn bind_write_alias(
        &self,
        alias: &str,
        id: &str,
        item_expires: i64,
        writer_key: &str,
        req: &WriteRequest,
    ) -> Outcome<()> {
        let id_pack = self.registry().key_pack(id, "");
        let id_expiry = id_pack.value().map_or(item_expires, |p| p.valid_till);

        let writer_key = writer_key.to_owned();
        let mut key_info = Vec::new();
        for k in std::iter::once(&writer_key)
            .chain(req.readers.iter())
            .chain(req.updaters.iter())
        {
            let pack = self.registry().key_pack(k, "");
            if let Some(p) = pack.value().filter(|_| pack.is_ok()) {
                key_info.push((p.key.clone(), id_expiry.min(p.valid_till)));
            }
        }
        let gate: Outcome<()> = Outcome::good(()).ensure(
            !key_info.is_empty(),
            Code::Internal,
            "Didnt find any keys to alias",
        );
        if !gate.is_ok() {
            return gate;
        }
        self.set_alias(alias, id, item_expires, &key_info)
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::intent::ReleaseRequest;
    use crate::testkit::{activate, exchange, mint, mint_with};
    use serde_json::json;
    use vouch_store::MemoryDocStore;

    fn write(
        ex: &Exchange<MemoryDocStore>,
        writer: &str,
        readers: Vec<String>,
        updaters: Vec<String>,
    ) -> String {
        ex.write_item(&WriteRequest {
            writer: writer.to_owned(),
            data: json!({"greeting": "hi"}),
            readers,
            updaters,
            ..WriteRequest::default()
        })
        .into_value()
        .expect("write")
        .id
    }

    #[test]
    fn write_then_read_roundtrip() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let id = write(&ex, &writer, vec![], vec![]);

        let read = ex
            .read_item(&ReadRequest {
                reader: writer.clone(),
                id: id.clone(),
                ..ReadRequest::default()
            })
            .into_value()
            .expect("read");
        assert_eq!(read.value, json!({"greeting": "hi"}));
        assert_eq!(read.id, id);
        assert!(read.alias.is_none());
        // the writer key sees the accessor lists
        assert_eq!(read.readers, Some(vec![]));
        assert_eq!(read.updaters, Some(vec![]));
    }

    #[test]
    fn writes_need_a_writer_key_and_an_active_account() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let reader = mint(&ex, SeedType::Reader, "1f");
        let out = ex.write_item(&WriteRequest {
            writer: reader,
            data: json!(1),
            ..WriteRequest::default()
        });
        assert_eq!(out.code(), Code::Unauthorized);

        // a writer for an account nobody registered
        let writer = mint(&ex, SeedType::Writer, "2g");
        let out = ex.write_item(&WriteRequest {
            writer,
            data: json!(1),
            ..WriteRequest::default()
        });
        assert_eq!(out.code(), Code::Unauthorized);
    }

    #[test]
    fn null_data_is_a_bad_request() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let out = ex.write_item(&WriteRequest {
            writer,
            data: Value::Null,
            ..WriteRequest::default()
        });
        assert_eq!(out.code(), Code::BadRequest);
    }

    #[test]
    fn oversized_writes_hit_the_size_quota() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let out = ex.write_item(&WriteRequest {
            writer,
            data: json!("x".repeat(500_001)),
            ..WriteRequest::default()
        });
        assert_eq!(out.code(), Code::Quota);
    }

    #[test]
    fn access_lists_gate_reads() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let granted = mint_with(&ex, SeedType::Reader, "1f", 3_000);
        let stranger = mint_with(&ex, SeedType::Reader, "1f", 3_100);
        let id = write(&ex, &writer, vec![granted.clone()], vec![]);

        let read = ex.read_item(&ReadRequest {
            reader: granted,
            id: id.clone(),
            ..ReadRequest::default()
        });
        assert!(read.is_ok());
        // a non-writer key does not see the accessor lists
        assert!(read.value().unwrap().readers.is_none());

        let out = ex.read_item(&ReadRequest {
            reader: stranger,
            id,
            ..ReadRequest::default()
        });
        assert_eq!(out.code(), Code::Unauthorized);
    }

    #[test]
    fn intent_lease_lifecycle() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let u1 = mint_with(&ex, SeedType::Updater, "1f", 3_000);
        let u2 = mint_with(&ex, SeedType::Updater, "1f", 3_100);
        let id = write(&ex, &writer, vec![], vec![u1.clone(), u2.clone()]);

        // u1 acquires the lease with a read-with-intention
        let read = ex
            .read_item(&ReadRequest {
                reader: u1.clone(),
                id: id.clone(),
                intention: Some("update".into()),
                ..ReadRequest::default()
            })
            .into_value()
            .expect("read with intention");
        let intent = read.intent.expect("an intent lease");
        assert_eq!(read.intent_expires, Some(15));

        // u2 cannot acquire while u1's lease is pending
        let locked = ex.read_item(&ReadRequest {
            reader: u2.clone(),
            id: id.clone(),
            intention: Some("update".into()),
            ..ReadRequest::default()
        });
        assert_eq!(locked.code(), Code::Locked);
        let remaining = locked.value().unwrap().intent_expires.unwrap();
        assert!(remaining > 0, "remaining lease seconds reported");

        // u2 cannot update the locked item without the lease
        let out = ex.update_item(&UpdateRequest {
            updater: u2.clone(),
            id: id.clone(),
            data: json!({"v": 2}),
            ..UpdateRequest::default()
        });
        assert_eq!(out.code(), Code::Locked);

        // u1 consumes the lease
        let updated = ex.update_item(&UpdateRequest {
            updater: u1.clone(),
            id: id.clone(),
            data: json!({"v": 3}),
            intent: Some(intent.clone()),
            ..UpdateRequest::default()
        });
        assert!(updated.is_ok(), "{:?}", updated.error());

        // the lease bought exactly one update
        let out = ex.update_item(&UpdateRequest {
            updater: u1,
            id: id.clone(),
            data: json!({"v": 4}),
            intent: Some(intent),
            ..UpdateRequest::default()
        });
        assert_eq!(out.code(), Code::Gone);

        // and the item now reads back updated, unlocked for u2
        let read = ex
            .read_item(&ReadRequest {
                reader: u2,
                id,
                intention: Some("update".into()),
                ..ReadRequest::default()
            })
            .into_value()
            .expect("read");
        assert_eq!(read.value, json!({"v": 3}));
        assert!(read.intent.is_some());
    }

    #[test]
    fn expired_leases_do_not_lock() {
        let (ex, clock) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let u1 = mint_with(&ex, SeedType::Updater, "1f", 3_000);
        let u2 = mint_with(&ex, SeedType::Updater, "1f", 3_100);
        let id = write(&ex, &writer, vec![], vec![u1.clone(), u2.clone()]);

        assert!(
            ex.read_item(&ReadRequest {
                reader: u1,
                id: id.clone(),
                intention: Some("update".into()),
                ..ReadRequest::default()
            })
            .is_ok()
        );

        // let the 15 s lease lapse
        clock.advance(16_000);
        let read = ex.read_item(&ReadRequest {
            reader: u2,
            id,
            intention: Some("update".into()),
            ..ReadRequest::default()
        });
        assert!(read.is_ok(), "{:?}", read.error());
        assert!(read.into_value().unwrap().intent.is_some());
    }

    #[test]
    fn released_leases_free_the_item() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let u1 = mint_with(&ex, SeedType::Updater, "1f", 3_000);
        let u2 = mint_with(&ex, SeedType::Updater, "1f", 3_100);
        let id = write(&ex, &writer, vec![], vec![u1.clone(), u2.clone()]);

        let intent = ex
            .read_item(&ReadRequest {
                reader: u1.clone(),
                id: id.clone(),
                intention: Some("update".into()),
                ..ReadRequest::default()
            })
            .into_value()
            .expect("read")
            .intent
            .expect("lease");

        let released = ex.release_intent(&ReleaseRequest {
            updater: u1.clone(),
            intent: intent.clone(),
            id: id.clone(),
            unlock: String::new(),
        });
        assert_eq!(released.code(), Code::NoContent);

        // releasing again reports the absence, softly
        let again = ex.release_intent(&ReleaseRequest {
            updater: u1,
            intent,
            id: id.clone(),
            unlock: String::new(),
        });
        assert_eq!(again.code(), Code::NotFound);

        assert!(
            ex.read_item(&ReadRequest {
                reader: u2,
                id,
                intention: Some("update".into()),
                ..ReadRequest::default()
            })
            .is_ok()
        );
    }

    #[test]
    fn reads_with_intention_need_an_updating_key() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let reader = mint(&ex, SeedType::Reader, "1f");
        let id = write(&ex, &writer, vec![reader.clone()], vec![]);

        let out = ex.read_item(&ReadRequest {
            reader,
            id,
            intention: Some("update".into()),
            ..ReadRequest::default()
        });
        assert_eq!(out.code(), Code::BadRequest);
    }

    #[test]
    fn lifetime_changes_are_forbidden_on_update() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let id = write(&ex, &writer, vec![], vec![]);

        let out = ex.update_item(&UpdateRequest {
            updater: writer,
            id,
            data: json!(2),
            lifetime_secs: 600,
            ..UpdateRequest::default()
        });
        assert_eq!(out.code(), Code::Forbidden);
    }

    #[test]
    fn only_writers_replace_accessor_lists() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let updater = mint(&ex, SeedType::Updater, "1f");
        let id = write(&ex, &writer, vec![], vec![updater.clone()]);

        let out = ex.update_item(&UpdateRequest {
            updater,
            id,
            data: json!(2),
            readers: Some(vec![]),
            ..UpdateRequest::default()
        });
        assert_eq!(out.code(), Code::Forbidden);
    }

    #[test]
    fn removal_is_for_the_original_writer_only() {
        let (ex, _) = exchange();
        activate(&ex, "1f");
        let writer = mint_with(&ex, SeedType::Writer, "1f", 3_000);
        let other = mint_with(&ex, SeedType::Writer, "1f", 3_100);
        let id = write(&ex, &writer, vec![], vec![]);

        let out = ex.remove_item(&RemoveRequest {
            writer: other,
            id: id.clone(),
            ..RemoveRequest::default()
        });
        assert_eq!(out.code(), Code::Unauthorized);

        let out = ex.remove_item(&RemoveRequest {
            writer: writer.clone(),
            id: id.clone(),
            ..RemoveRequest::default()
        });
        assert_eq!(out.code(), Code::NoContent);

        let out = ex.read_item(&ReadRequest {
            reader: writer,
            id,
            ..ReadRequest::default()
        });
        assert_eq!(out.code(), Code::NotFound);
    }

    #[test]
    fn stale_items_read_as_expired_until_swept() {
        let (ex, clock) = exchange();
        activate(&ex, "1f");
        let writer = mint(&ex, SeedType::Writer, "1f");
        let id = ex
            .write_item(&WriteRequest {
                writer: writer.clone(),
                data: json!(1),
                lifetime_secs: 60,
                ..WriteRequest::default()
            })
            .into_value()
            .expect("write")
            .id;

        clock.advance(61_000);
        let out = ex.read_item(&ReadRequest {
            reader: writer,
            id: id.clone(),
            ..ReadRequest::default()
        });
        assert_eq!(out.code(), Code::Expired);

        // the sweep respects its grace window, then collects
        assert_eq!(ex.sweep().into_value(), Some(0));
        clock.advance(3 * 60 * 1000);
        assert_eq!(ex.sweep().into_value(), Some(1));
        assert!(
            ex.store()
                .get(Collection::Items, &id)
                .expect("get")
                .is_none()
        );
    }
}
