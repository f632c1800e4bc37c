//! In-memory reference backend with optimistic transactions.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;
use vouch_core::{Code, Outcome};

use crate::collection::Collection;
use crate::error::{StoreError, StoreResult};
use crate::store::{DocStore, Txn, expires_of};

/// How many commit conflicts a transaction absorbs before giving up.
const RETRY_BUDGET: usize = 5;

type Key = (Collection, String);

#[derive(Debug, Clone)]
struct Versioned {
    doc: Value,
    version: u64,
}

/// Versioned in-memory document store.
///
/// Each committed write bumps a global version stamp. A transaction
/// records the version of everything it read; commit re-checks those
/// versions under the write lock and conflicts rerun the closure. Good
/// enough to exercise the protocol; a real deployment plugs a database
/// behind [`DocStore`] instead.
#[derive(Debug, Default)]
pub struct MemoryDocStore {
    docs: RwLock<HashMap<Key, Versioned>>,
    stamp: RwLock<u64>,
}

impl MemoryDocStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_version(&self, key: &Key) -> StoreResult<Option<u64>> {
        let docs = self.docs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(docs.get(key).map(|v| v.version))
    }
}

impl DocStore for MemoryDocStore {
    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Value>> {
        let docs = self.docs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(docs
            .get(&(collection, id.to_owned()))
            .map(|v| v.doc.clone()))
    }

    fn set(&self, collection: Collection, id: &str, doc: Value) -> StoreResult<()> {
        let mut docs = self.docs.write().map_err(|_| StoreError::Poisoned)?;
        let mut stamp = self.stamp.write().map_err(|_| StoreError::Poisoned)?;
        *stamp = stamp.saturating_add(1);
        docs.insert(
            (collection, id.to_owned()),
            Versioned {
                doc,
                version: *stamp,
            },
        );
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let mut docs = self.docs.write().map_err(|_| StoreError::Poisoned)?;
        docs.remove(&(collection, id.to_owned()));
        Ok(())
    }

    fn scan(&self, collection: Collection) -> StoreResult<Vec<(String, Value)>> {
        let docs = self.docs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(docs
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|((_, id), v)| (id.clone(), v.doc.clone()))
            .collect())
    }

    fn transact<T>(&self, mut f: impl FnMut(&mut dyn Txn) -> Outcome<T>) -> Outcome<T> {
        for attempt in 0..RETRY_BUDGET {
            let mut txn = MemoryTxn {
                store: self,
                reads: HashMap::new(),
                writes: HashMap::new(),
            };
            let outcome = f(&mut txn);
            if !outcome.is_ok() {
                // aborted by the closure: staged writes just evaporate
                return outcome;
            }
            match txn.commit() {
                Ok(true) => return outcome,
                Ok(false) => {
                    debug!(attempt, "transaction conflict, retrying");
                }
                Err(err) => return Outcome::fail(Code::Internal, err.to_string()),
            }
        }
        Outcome::fail(Code::Locked, StoreError::Contention.to_string())
    }

    fn sweep_expired(&self, older_than_millis: i64) -> StoreResult<usize> {
        let mut docs = self.docs.write().map_err(|_| StoreError::Poisoned)?;
        let before = docs.len();
        docs.retain(|_, v| {
            let expires = expires_of(&v.doc).unwrap_or_default();
            expires <= 0 || expires >= older_than_millis
        });
        Ok(before.saturating_sub(docs.len()))
    }
}

/// Transaction handle over a [`MemoryDocStore`].
struct MemoryTxn<'a> {
    store: &'a MemoryDocStore,
    /// Version observed for every key read; `None` means read-as-absent.
    reads: HashMap<Key, Option<u64>>,
    /// Staged writes; `None` stages a delete.
    writes: HashMap<Key, Option<Value>>,
}

impl MemoryTxn<'_> {
    /// Apply staged writes if nothing read has moved. `Ok(false)` is a
    /// conflict.
    fn commit(self) -> StoreResult<bool> {
        let mut docs = self
            .store
            .docs
            .write()
            .map_err(|_| StoreError::Poisoned)?;
        let mut stamp = self
            .store
            .stamp
            .write()
            .map_err(|_| StoreError::Poisoned)?;

        for (key, seen) in &self.reads {
            let current = docs.get(key).map(|v| v.version);
            if current != *seen {
                return Ok(false);
            }
        }
        for (key, write) in self.writes {
            match write {
                Some(doc) => {
                    *stamp = stamp.saturating_add(1);
                    docs.insert(
                        key,
                        Versioned {
                            doc,
                            version: *stamp,
                        },
                    );
                }
                None => {
                    docs.remove(&key);
                }
            }
        }
        Ok(true)
    }
}

impl Txn for MemoryTxn<'_> {
    fn get(&mut self, collection: Collection, id: &str) -> StoreResult<Option<Value>> {
        let key = (collection, id.to_owned());
        if let Some(staged) = self.writes.get(&key) {
            return Ok(staged.clone());
        }
        let version = self.store.read_version(&key)?;
        self.reads.entry(key.clone()).or_insert(version);
        self.store.get(collection, id)
    }

    fn set(&mut self, collection: Collection, id: &str, doc: Value) -> StoreResult<()> {
        self.writes.insert((collection, id.to_owned()), Some(doc));
        Ok(())
    }

    fn delete(&mut self, collection: Collection, id: &str) -> StoreResult<()> {
        self.writes.insert((collection, id.to_owned()), None);
        Ok(())
    }

    fn scan(&mut self, collection: Collection) -> StoreResult<Vec<(String, Value)>> {
        let mut merged: HashMap<String, Value> = HashMap::new();
        {
            let docs = self
                .store
                .docs
                .read()
                .map_err(|_| StoreError::Poisoned)?;
            for ((c, id), v) in docs.iter() {
                if *c == collection {
                    self.reads
                        .entry((collection, id.clone()))
                        .or_insert(Some(v.version));
                    merged.insert(id.clone(), v.doc.clone());
                }
            }
        }
        for ((c, id), write) in &self.writes {
            if *c != collection {
                continue;
            }
            match write {
                Some(doc) => {
                    merged.insert(id.clone(), doc.clone());
                }
                None => {
                    merged.remove(id);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_delete_roundtrip() {
        let store = MemoryDocStore::new();
        store
            .set(Collection::Items, "a", json!({"data": 1}))
            .unwrap();
        assert_eq!(
            store.get(Collection::Items, "a").unwrap(),
            Some(json!({"data": 1}))
        );
        store.delete(Collection::Items, "a").unwrap();
        assert_eq!(store.get(Collection::Items, "a").unwrap(), None);
    }

    #[test]
    fn collections_are_disjoint() {
        let store = MemoryDocStore::new();
        store.set(Collection::Items, "a", json!(1)).unwrap();
        store.set(Collection::Aliases, "a", json!(2)).unwrap();
        assert_eq!(store.get(Collection::Items, "a").unwrap(), Some(json!(1)));
        assert_eq!(store.scan(Collection::Aliases).unwrap().len(), 1);
    }

    #[test]
    fn transaction_commits_atomically() {
        let store = MemoryDocStore::new();
        let out = store.transact(|t| {
            t.set(Collection::Items, "a", json!(1)).ok();
            t.set(Collection::Intents, "a", json!(2)).ok();
            Outcome::good(())
        });
        assert!(out.is_ok());
        assert!(store.get(Collection::Items, "a").unwrap().is_some());
        assert!(store.get(Collection::Intents, "a").unwrap().is_some());
    }

    #[test]
    fn failed_outcome_aborts_without_writing() {
        let store = MemoryDocStore::new();
        let out: Outcome<()> = store.transact(|t| {
            t.set(Collection::Items, "a", json!(1)).ok();
            Outcome::fail(Code::Locked, "changed our mind")
        });
        assert_eq!(out.code(), Code::Locked);
        assert!(store.get(Collection::Items, "a").unwrap().is_none());
    }

    #[test]
    fn reads_observe_pending_writes() {
        let store = MemoryDocStore::new();
        store.set(Collection::Items, "a", json!("old")).unwrap();
        let out = store.transact(|t| {
            t.set(Collection::Items, "a", json!("new")).ok();
            let seen = t.get(Collection::Items, "a").unwrap_or_default();
            Outcome::good(seen)
        });
        assert_eq!(out.into_value().unwrap(), Some(json!("new")));
    }

    #[test]
    fn conflicting_commit_retries_the_closure() {
        let store = MemoryDocStore::new();
        store.set(Collection::Items, "a", json!(0)).unwrap();
        let mut runs = 0;
        let out = store.transact(|t| {
            runs += 1;
            let _ = t.get(Collection::Items, "a");
            if runs == 1 {
                // someone else wins the race on the first attempt
                store.set(Collection::Items, "a", json!(99)).unwrap();
            }
            t.set(Collection::Items, "b", json!(runs)).ok();
            Outcome::good(())
        });
        assert!(out.is_ok());
        assert_eq!(runs, 2);
        assert_eq!(store.get(Collection::Items, "b").unwrap(), Some(json!(2)));
    }

    #[test]
    fn endless_contention_fails_locked() {
        let store = MemoryDocStore::new();
        store.set(Collection::Items, "a", json!(0)).unwrap();
        let mut runs = 0;
        let out: Outcome<()> = store.transact(|t| {
            runs += 1;
            let _ = t.get(Collection::Items, "a");
            // every attempt loses the race
            store.set(Collection::Items, "a", json!(runs)).unwrap();
            Outcome::good(())
        });
        assert_eq!(out.code(), Code::Locked);
        assert_eq!(runs, RETRY_BUDGET);
    }

    #[test]
    fn sweep_removes_only_stale_documents() {
        let store = MemoryDocStore::new();
        store
            .set(Collection::Items, "stale", json!({"expires": 1_000}))
            .unwrap();
        store
            .set(Collection::Items, "fresh", json!({"expires": 99_000}))
            .unwrap();
        store
            .set(Collection::Services, "pinned", json!({"expires": 0}))
            .unwrap();
        let removed = store.sweep_expired(50_000).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(Collection::Items, "stale").unwrap().is_none());
        assert!(store.get(Collection::Items, "fresh").unwrap().is_some());
        assert!(store.get(Collection::Services, "pinned").unwrap().is_some());
    }
}
