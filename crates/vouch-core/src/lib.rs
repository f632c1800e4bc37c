//! Vouch Core - shared result plumbing for the coupon exchange.
//!
//! This crate provides:
//! - [`Code`] - the HTTP-flavoured status code table shared by every
//!   operation result
//! - [`Outcome`] - the result pack threaded through the protocol layers,
//!   with first-failure-wins combinators
//! - [`Clock`] - injectable time source so expiry and slot arithmetic can
//!   be tested without sleeping

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod clock;
mod code;
mod outcome;

pub use clock::{Clock, ManualClock, SystemClock, now_millis};
pub use code::Code;
pub use outcome::Outcome;
