//! Vouch Registry - the static capability table behind every coupon.
//!
//! A [`Seed`] binds a capability kind and plan to a signing secret and a
//! coupon prefix; a [`Plan`] names a tenant tier with its size, lifetime,
//! and rate-limiter configuration. Both are loaded once at process start
//! and shared read-only across every concurrent operation.
//!
//! The [`Registry`] combines the seed table, the plan table, and a
//! [`vouch_coupon::Codec`] into the surface the protocol layer talks to:
//! resolving which seed issued a presented coupon, decoding it into a
//! typed [`KeyPack`], and minting new coupons of every kind.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod mint;
mod plan;
mod registry;
mod seed;

pub use config::{ConfigError, RegistryConfig, Settings};
pub use mint::{KeyBatch, MintRequest};
pub use plan::{Limiter, LimiterKind, Plan};
pub use registry::{KeyPack, Registry};
pub use seed::{Seed, SeedType};
