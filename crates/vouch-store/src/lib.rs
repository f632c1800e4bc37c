//! Vouch Store - the transactional document store the exchange sits on.
//!
//! The protocol layer never talks to a database directly; it talks to
//! [`DocStore`]: plain `get`/`set`/`delete`/`scan` on JSON documents plus
//! [`DocStore::transact`], which runs a closure against a transaction
//! handle with all-or-nothing commit and conflict-triggered retry.
//!
//! Documents carry a top-level `expires` millisecond timestamp. An expired
//! document may still be present until a sweep removes it, so every reader
//! goes through [`require_fresh`] and treats stale-but-present documents
//! as gone.
//!
//! [`MemoryDocStore`] is the reference backend: versioned documents with
//! optimistic read-set validation at commit.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod collection;
mod error;
mod memory;
mod store;

pub use collection::Collection;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryDocStore;
pub use store::{DocStore, Txn, expires_of, require_fresh};
