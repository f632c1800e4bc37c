//! Vouch Exchange - the protocol layer of the coupon-guarded store.
//!
//! An [`Exchange`] combines the seed registry, the coupon codec, and a
//! transactional document store into the operation surface a thin API
//! layer calls:
//!
//! - item reads, writes, updates, and removals, all authorized by coupon
//! - the optimistic intent lock serializing concurrent updates
//! - the per-account sliding-bucket rate limiter
//! - alias indirection and watchable subscriptions
//! - account and boss-key management
//!
//! Every operation returns a [`vouch_core::Outcome`]; nothing panics or
//! errors past this boundary. Store failures surface as `Internal`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod account;
mod alias;
mod docs;
mod intent;
mod limiter;
mod resolver;
mod watch;

use std::sync::Arc;

use tracing::warn;
use vouch_core::{Code, Outcome};
use vouch_registry::Registry;
use vouch_store::{Collection, DocStore, StoreResult};

pub use account::KeySwapRequest;
pub use alias::{AliasRequest, Target};
pub use docs::{
    AccountDoc, AliasDoc, BossDoc, IntentDoc, ItemDoc, ItemMeta, SlotDoc, SlotEntry,
    WatchMeta, WatchableDoc,
};
pub use intent::{IntentGrant, ReleaseRequest};
pub use resolver::{
    ReadReceipt, ReadRequest, RemoveRequest, UpdateReceipt, UpdateRequest, WriteReceipt,
    WriteRequest,
};
pub use watch::{WatchReceipt, WatchRequest, WatchView};

/// Sweeps leave documents in place for a couple of minutes past expiry so
/// operations in flight keep their footing.
const SWEEP_GRACE_MS: i64 = 2 * 60 * 1000;

/// The exchange: registry + codec + store, one instance per process.
pub struct Exchange<S> {
    store: Arc<S>,
    registry: Arc<Registry>,
}

impl<S: DocStore + 'static> Exchange<S> {
    /// Build an exchange over a store and a registry.
    #[must_use]
    pub fn new(store: Arc<S>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    /// The registry in use.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The store in use.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decode and type a presented coupon; the `validate` operation.
    #[must_use]
    pub fn validate(&self, key: &str, unlock: &str) -> Outcome<vouch_registry::KeyPack> {
        self.registry.key_pack(key, unlock)
    }

    /// Remove documents that expired more than the grace window ago.
    #[must_use]
    pub fn sweep(&self) -> Outcome<usize> {
        let cutoff = self
            .registry
            .now_millis()
            .saturating_sub(SWEEP_GRACE_MS);
        store_outcome(self.store.sweep_expired(cutoff)).finish(Code::NoContent)
    }

    pub(crate) fn now_millis(&self) -> i64 {
        self.registry.now_millis()
    }

    /// Fire-and-forget write: spawned when a runtime is around, inline
    /// otherwise. Failure is logged, never propagated.
    pub(crate) fn best_effort_set(
        &self,
        collection: Collection,
        id: String,
        doc: serde_json::Value,
    ) {
        let store = Arc::clone(&self.store);
        let write = move || {
            if let Err(err) = store.set(collection, &id, doc) {
                warn!(%err, %collection, "best-effort write failed");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

impl<S> std::fmt::Debug for Exchange<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Lift a raw store result into an outcome; backend failures are
/// `Internal`, full stop.
pub(crate) fn store_outcome<T>(result: StoreResult<T>) -> Outcome<T> {
    match result {
        Ok(v) => Outcome::good(v),
        Err(err) => Outcome::fail(Code::Internal, err.to_string()),
    }
}
