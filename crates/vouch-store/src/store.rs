//! The document store contract.

use serde_json::Value;
use vouch_core::{Code, Outcome};

use crate::collection::Collection;
use crate::error::StoreResult;

/// Operations available inside a transaction.
///
/// Reads observe the transaction's own pending writes. Nothing is visible
/// to other transactions until commit.
pub trait Txn {
    /// Read a document.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend fails.
    fn get(&mut self, collection: Collection, id: &str) -> StoreResult<Option<Value>>;

    /// Stage a write.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend fails.
    fn set(&mut self, collection: Collection, id: &str, doc: Value) -> StoreResult<()>;

    /// Stage a deletion.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend fails.
    fn delete(&mut self, collection: Collection, id: &str) -> StoreResult<()>;

    /// Read every document in a collection, pending writes included.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend fails.
    fn scan(&mut self, collection: Collection) -> StoreResult<Vec<(String, Value)>>;
}

/// A transactional document store.
///
/// One transaction per logical protocol step; a transaction is never held
/// open across calls to other components. Conflicts between concurrent
/// transactions are the store's problem: the closure is simply retried.
pub trait DocStore: Send + Sync {
    /// Read a document outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend fails.
    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Value>>;

    /// Write a document outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend fails.
    fn set(&self, collection: Collection, id: &str, doc: Value) -> StoreResult<()>;

    /// Delete a document outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend fails.
    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()>;

    /// Read every document in a collection.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend fails.
    fn scan(&self, collection: Collection) -> StoreResult<Vec<(String, Value)>>;

    /// Run a closure as one atomic unit.
    ///
    /// A closure returning a failed [`Outcome`] aborts: staged writes are
    /// discarded and the outcome comes back unchanged, no retry. A commit
    /// conflict reruns the closure; past the retry budget the whole call
    /// fails `Locked`.
    fn transact<T>(&self, f: impl FnMut(&mut dyn Txn) -> Outcome<T>) -> Outcome<T>
    where
        Self: Sized;

    /// Remove documents whose `expires` passed before `older_than_millis`.
    /// Returns how many went.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend fails.
    fn sweep_expired(&self, older_than_millis: i64) -> StoreResult<usize>;
}

/// The `expires` stamp of a document, if it carries one.
#[must_use]
pub fn expires_of(doc: &Value) -> Option<i64> {
    doc.get("expires").and_then(Value::as_i64)
}

/// Turn a raw read into an outcome: absent documents are `NotFound`,
/// present-but-stale ones are `Expired`. Documents without an `expires`
/// stamp (or with zero) never go stale.
#[must_use]
pub fn require_fresh(
    collection: Collection,
    id: &str,
    doc: Option<Value>,
    now_millis: i64,
) -> Outcome<Value> {
    let Some(doc) = doc else {
        return Outcome::fail(
            Code::NotFound,
            format!("document {collection}/{id} missing"),
        );
    };
    let expires = expires_of(&doc).unwrap_or_default();
    Outcome::good(doc).ensure(
        expires == 0 || expires > now_millis,
        Code::Expired,
        format!("document {collection}/{id} expired at {expires}"),
    )
}
