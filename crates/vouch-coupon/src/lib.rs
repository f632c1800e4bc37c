//! Vouch Coupon - generates and decodes signed capability coupons.
//!
//! A coupon is a short self-describing string that doubles as an account
//! identifier, an access grant, and a time-limited lease:
//!
//! ```text
//! prefix-padSIG-expiry32[ext32]
//! ```
//!
//! The prefix names the seed family that issued it, the three signature
//! characters authenticate the payload, and the payload is the base-32
//! expiry timestamp plus an optional base-32 extra field. The signature and
//! payload are scrambled through a keyed permutation so the expiry is not
//! readable without the secret, and up to four cosmetic padding characters
//! make equal coupons look different on the wire.
//!
//! Coupons are immutable: there is no update, only regeneration. Decoding
//! never fails loudly - a malformed coupon or a wrong secret yields
//! `valid: false`, not an error.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod base32;
mod codec;
mod digest;
mod mix;

pub use base32::{decode_base32, encode_base32};
pub use codec::{Codec, CodecError, Decoded};
pub use digest::{digest, sign};
