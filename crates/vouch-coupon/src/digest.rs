//! Digest and signing primitives for the coupon codec.
//!
//! The construction is deliberately self-referential: a coupon is signed
//! with `HMAC-SHA256(payload, secret + digest(payload, secret))`, and the
//! signature fragment embedded in the coupon is cut from a digest of that
//! signature. The exact bytes determine coupon validity, so this module is
//! reproduced as-is rather than strengthened.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::{Digest as _, Sha1};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Digest a list of parts: SHA-1 over the `-`-joined parts, base64, with
/// `/` and `+` swapped for characters that can live inside a document key.
#[must_use]
pub fn digest(parts: &[&str]) -> String {
    let joined = parts.join("-");
    let mut sha = Sha1::new();
    sha.update(joined.as_bytes());
    STANDARD
        .encode(sha.finalize())
        .replace('/', "_")
        .replace('+', "$")
}

/// Sign a value: HMAC-SHA256 keyed by `secret`, base64-encoded.
#[must_use]
pub fn sign(value: &str, secret: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(value.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}
