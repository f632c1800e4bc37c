//! Coupon generation and decoding.

use chrono::{Days, Months, Utc};
use rand::Rng as _;
use rand::distributions::Alphanumeric;
use thiserror::Error;

use crate::base32::{decode_base32, encode_base32};
use crate::digest::{digest, sign};
use crate::mix;

/// Width of the embedded signature fragment.
const SIG_SIZE: usize = 3;
/// Maximum cosmetic padding prepended to the signature segment.
const MAX_PAD: usize = 4;
/// Folded into the permutation pepper. Changing this invalidates every
/// previously issued coupon.
const ALGO_SUFFIX: &str = "#keel@anchor";

/// Errors from coupon generation. Decoding never errors - a bad coupon or
/// wrong secret comes back as [`Decoded`] with `valid: false`.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The signing secret is shorter than six characters.
    #[error("secret must be at least 6 characters")]
    SecretTooShort,
    /// The expiry timestamp is zero, negative, or too small to fill a
    /// timestamp-width base-32 field.
    #[error("expiry {0} is not a usable millisecond timestamp")]
    ExpiryOutOfRange(i64),
    /// No prefix was supplied.
    #[error("a coupon needs a prefix")]
    EmptyPrefix,
    /// The extra field must be non-negative.
    #[error("extra field {0} is negative")]
    NegativeExtra(i64),
    /// Date arithmetic left the representable range.
    #[error("expiry date out of range")]
    DateOverflow,
}

/// Everything a coupon says about itself once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Whether the coupon regenerated byte-identically under the supplied
    /// secret. Nothing else in this struct is trustworthy when false.
    pub valid: bool,
    /// Expiry timestamp in epoch milliseconds; zero when invalid.
    pub expiry: i64,
    /// The coupon's prefix segment, as presented.
    pub prefix: String,
    /// The coupon as presented.
    pub coupon: String,
    /// True when invalid or when `expiry` is not in the future.
    pub expired: bool,
    /// The overloaded extra field: a lease-extension day count, or an
    /// embedded base-32 account id for account-bearing coupons. Kept
    /// dual-purpose on purpose.
    pub extra_days: i64,
    /// When `extra_days` is a day count: that many days from now, in epoch
    /// milliseconds. Zero otherwise.
    pub extended_expiry: i64,
}

impl Decoded {
    fn invalid(coupon: &str, prefix: &str) -> Self {
        Self {
            valid: false,
            expiry: 0,
            prefix: prefix.to_owned(),
            coupon: coupon.to_owned(),
            expired: true,
            extra_days: 0,
            extended_expiry: 0,
        }
    }
}

/// Outcome of the shared generate/regenerate path.
struct Code32 {
    coupon: String,
    expiry: i64,
    extra_days: i64,
}

/// The coupon codec. One instance per deployment, parameterized by the
/// algorithm tag that peppers every permutation.
#[derive(Debug, Clone)]
pub struct Codec {
    algo: String,
}

impl Codec {
    /// Create a codec for an algorithm tag.
    #[must_use]
    pub fn new(algo: &str) -> Self {
        Self {
            algo: format!("{algo}{ALGO_SUFFIX}"),
        }
    }

    /// Generate a coupon that expires at `expiry_millis`.
    ///
    /// `extra` is the overloaded extra field: pass a day count for
    /// lease-extension coupons or a numeric account id for account-bearing
    /// ones; zero omits the field.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the secret, expiry, prefix, or extra
    /// field cannot make a coupon.
    pub fn generate(
        &self,
        secret: &str,
        expiry_millis: i64,
        prefix: &str,
        extra: i64,
    ) -> Result<String, CodecError> {
        if expiry_millis <= 0 {
            return Err(CodecError::ExpiryOutOfRange(expiry_millis));
        }
        if extra < 0 {
            return Err(CodecError::NegativeExtra(extra));
        }
        let pad = random_padding();
        self.code32(secret, prefix, &encode_base32(expiry_millis), extra, &pad)
            .map(|c| c.coupon)
    }

    /// Generate a coupon expiring `days` calendar days from now, optionally
    /// clamped to `max_millis`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Codec::generate`].
    pub fn generate_days(
        &self,
        secret: &str,
        days: u32,
        prefix: &str,
        extra: i64,
        max_millis: Option<i64>,
    ) -> Result<String, CodecError> {
        let target = Utc::now()
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or(CodecError::DateOverflow)?
            .timestamp_millis();
        let target = max_millis.map_or(target, |m| target.min(m));
        self.generate(secret, target, prefix, extra)
    }

    /// Generate a coupon expiring `months` calendar months from now.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Codec::generate`].
    pub fn generate_months(
        &self,
        secret: &str,
        months: u32,
        prefix: &str,
        extra: i64,
    ) -> Result<String, CodecError> {
        let target = Utc::now()
            .checked_add_months(Months::new(months))
            .ok_or(CodecError::DateOverflow)?
            .timestamp_millis();
        self.generate(secret, target, prefix, extra)
    }

    /// Decode a coupon under a secret.
    ///
    /// Validity means the coupon regenerates byte-identically (padding
    /// aside) from its own recovered payload. A wrong secret, a malformed
    /// shape, or foreign digits all come back as `valid: false`; this
    /// method does not fail.
    #[must_use]
    pub fn decode(&self, secret: &str, coupon: &str) -> Decoded {
        if !coupon.is_ascii() {
            return Decoded::invalid(coupon, "");
        }
        let parts: Vec<&str> = coupon.split('-').collect();
        let &[prefix, sig_seg, payload] = parts.as_slice() else {
            return Decoded::invalid(coupon, parts.first().copied().unwrap_or(""));
        };
        if sig_seg.len() < SIG_SIZE {
            return Decoded::invalid(coupon, prefix);
        }
        let split_at = sig_seg.len().saturating_sub(SIG_SIZE);
        let (padding, sig) = sig_seg.split_at(split_at);
        let scrambled = format!("{sig}{payload}");

        let Some(code) = self.code32_decode(secret, prefix, &scrambled, padding) else {
            return Decoded::invalid(coupon, prefix);
        };

        let valid = code.coupon == coupon;
        let now = Utc::now().timestamp_millis();
        Decoded {
            valid,
            expiry: if valid { code.expiry } else { 0 },
            prefix: prefix.to_owned(),
            coupon: coupon.to_owned(),
            expired: !valid || code.expiry <= now,
            extra_days: code.extra_days,
            extended_expiry: if valid && code.extra_days > 0 {
                extended_expiry(code.extra_days)
            } else {
                0
            },
        }
    }

    /// Generate path: payload is the plain base-32 expiry, the extra field
    /// still numeric, the padding already chosen.
    fn code32(
        &self,
        secret: &str,
        prefix: &str,
        expiry32: &str,
        extra: i64,
        padding: &str,
    ) -> Result<Code32, CodecError> {
        if secret.len() < 6 {
            return Err(CodecError::SecretTooShort);
        }
        if prefix.is_empty() {
            return Err(CodecError::EmptyPrefix);
        }
        if expiry32.len() < timestamp_width() {
            return Err(CodecError::ExpiryOutOfRange(
                decode_base32(expiry32).unwrap_or_default(),
            ));
        }
        // "-" is the segment separator, it cannot live inside a prefix
        let prefix = prefix.replace('-', "_");

        let mut target = expiry32.to_owned();
        if extra > 0 {
            target.push_str(&encode_base32(extra));
        }
        let placeholder = format!("{}{target}", "x".repeat(SIG_SIZE));
        let seq = mix::sequence(&format!("{prefix}{secret}{}", self.algo), placeholder.len());

        self.assemble(secret, &prefix, &target, &seq, padding)
            .ok_or(CodecError::ExpiryOutOfRange(0))
    }

    /// Decode path: the payload arrives scrambled, extra field and all.
    fn code32_decode(
        &self,
        secret: &str,
        prefix: &str,
        scrambled: &str,
        padding: &str,
    ) -> Option<Code32> {
        if secret.len() < 6 || prefix.is_empty() || scrambled.len() < timestamp_width() {
            return None;
        }
        let prefix = prefix.replace('-', "_");
        let seq = mix::sequence(&format!("{prefix}{secret}{}", self.algo), scrambled.len());
        let unscrambled = mix::unscramble(&seq, scrambled)?;
        if unscrambled.len() < SIG_SIZE {
            return None;
        }
        let target = &unscrambled[SIG_SIZE..];
        self.assemble(secret, &prefix, target, &seq, padding)
    }

    /// Shared tail of both paths: recompute the signature for a recovered
    /// or freshly built `target`, rescramble, and rebuild the coupon.
    #[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn assemble(
        &self,
        secret: &str,
        prefix: &str,
        target: &str,
        seq: &[usize],
        padding: &str,
    ) -> Option<Code32> {
        let ts_width = timestamp_width();
        if target.len() < ts_width || !target.is_ascii() {
            return None;
        }
        let expiry32 = &target[..ts_width];
        let ext32 = &target[ts_width..];

        let z = digest(&[prefix, target, secret]);
        let c = sign(
            &format!("{prefix}{target}"),
            &format!("{secret}{z}"),
        );
        let x = digest(&[&c]);

        let expiry = decode_base32(expiry32)?;
        let extra_days = if ext32.is_empty() {
            0
        } else {
            decode_base32(ext32)?
        };

        // cut the signature fragment out of the signed digest, the cut
        // point keyed by the expiry itself
        let window = x.len().checked_sub(SIG_SIZE + 1)?;
        let start = (expiry % window as i64) as usize;
        let sig = x.get(start..start + SIG_SIZE)?.to_lowercase();

        let mixed = mix::scramble(seq, &format!("{sig}{target}"))?;
        let (head, tail) = mixed.split_at(SIG_SIZE);
        Some(Code32 {
            coupon: format!("{prefix}-{padding}{head}-{tail}"),
            expiry,
            extra_days,
        })
    }
}

/// Width of a current millisecond timestamp in base-32 digits. Nine for
/// the whole 2004-3084 era.
fn timestamp_width() -> usize {
    encode_base32(Utc::now().timestamp_millis()).len()
}

/// `extra_days` days from now, in epoch milliseconds.
#[allow(clippy::cast_sign_loss)]
fn extended_expiry(extra_days: i64) -> i64 {
    Utc::now()
        .checked_add_days(Days::new(extra_days as u64))
        .map_or(0, |d| d.timestamp_millis())
}

/// Up to [`MAX_PAD`] random characters. Purely cosmetic: decoding strips
/// them by length, and validity is checked with the presented padding.
fn random_padding() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(0..=MAX_PAD);
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    const SECRET: &str = "abcdef0";
    const EXPIRY: i64 = 1_700_000_000_000;

    fn codec() -> Codec {
        Codec::new("test-algo")
    }

    #[test]
    fn roundtrip_recovers_expiry_and_prefix() {
        let coupon = codec().generate(SECRET, EXPIRY, "wtr", 0).unwrap();
        let decoded = codec().decode(SECRET, &coupon);
        assert!(decoded.valid);
        assert_eq!(decoded.expiry, EXPIRY);
        assert_eq!(decoded.prefix, "wtr");
        assert_eq!(decoded.extra_days, 0);
        // that timestamp is in the past by now
        assert!(decoded.expired);
    }

    #[test]
    fn wrong_secret_is_invalid_not_a_panic() {
        let coupon = codec().generate(SECRET, EXPIRY, "wtr", 0).unwrap();
        let decoded = codec().decode("abcdef1", &coupon);
        assert!(!decoded.valid);
        assert_eq!(decoded.expiry, 0);
        assert!(decoded.expired);
    }

    #[test]
    fn different_algo_tag_invalidates() {
        let coupon = codec().generate(SECRET, EXPIRY, "wtr", 0).unwrap();
        assert!(!Codec::new("other-algo").decode(SECRET, &coupon).valid);
    }

    #[test]
    fn padding_is_cosmetic() {
        let coupon = codec().generate(SECRET, EXPIRY, "wtr", 0).unwrap();
        let parts: Vec<&str> = coupon.split('-').collect();
        let sig = &parts[1][parts[1].len() - 3..];
        for pad in ["", "q", "Zz", "0Xy", "abcd"] {
            let repadded = format!("{}-{pad}{sig}-{}", parts[0], parts[2]);
            let decoded = codec().decode(SECRET, &repadded);
            assert!(decoded.valid, "pad {pad:?} should still decode");
            assert_eq!(decoded.expiry, EXPIRY);
        }
    }

    #[test]
    fn payload_is_stable_under_padding() {
        let a = codec().generate(SECRET, EXPIRY, "wtr", 0).unwrap();
        let b = codec().generate(SECRET, EXPIRY, "wtr", 0).unwrap();
        let strip = |c: &str| {
            let parts: Vec<String> = c.split('-').map(str::to_owned).collect();
            let sig = parts[1][parts[1].len() - 3..].to_owned();
            (parts[0].clone(), sig, parts[2].clone())
        };
        assert_eq!(strip(&a), strip(&b));
    }

    #[test]
    fn extra_field_carries_a_day_count() {
        let coupon = codec().generate(SECRET, EXPIRY, "xtd", 5).unwrap();
        let decoded = codec().decode(SECRET, &coupon);
        assert!(decoded.valid);
        assert_eq!(decoded.extra_days, 5);
        assert!(decoded.extended_expiry > Utc::now().timestamp_millis());
    }

    #[test]
    fn extra_field_carries_an_account_id() {
        let account = decode_base32("1f").unwrap();
        let coupon = codec().generate(SECRET, EXPIRY, "wtr1f", account).unwrap();
        let decoded = codec().decode(SECRET, &coupon);
        assert!(decoded.valid);
        assert_eq!(encode_base32(decoded.extra_days), "1f");
    }

    #[test]
    fn dashes_in_prefix_are_replaced() {
        let coupon = codec().generate(SECRET, EXPIRY, "wtr-a", 0).unwrap();
        assert!(coupon.starts_with("wtr_a-"));
        let decoded = codec().decode(SECRET, &coupon);
        assert!(decoded.valid);
        assert_eq!(decoded.prefix, "wtr_a");
    }

    #[test]
    fn future_coupons_are_not_expired() {
        let future = Utc::now().timestamp_millis() + 60_000;
        let coupon = codec().generate(SECRET, future, "wtr", 0).unwrap();
        let decoded = codec().decode(SECRET, &coupon);
        assert!(decoded.valid);
        assert!(!decoded.expired);
    }

    #[test]
    fn malformed_shapes_never_panic() {
        for bad in [
            "",
            "wtr",
            "wtr-",
            "wtr-ab",
            "wtr-abc",
            "wtr-abcd-",
            "a-b-c-d",
            "wtr-xyz-not*base32!",
            "-abc-0123456789",
            "wtr-€ab-0123456789",
        ] {
            assert!(!codec().decode(SECRET, bad).valid, "{bad:?}");
        }
    }

    #[test]
    fn generate_rejects_bad_inputs() {
        assert!(matches!(
            codec().generate("short", EXPIRY, "wtr", 0),
            Err(CodecError::SecretTooShort)
        ));
        assert!(matches!(
            codec().generate(SECRET, 0, "wtr", 0),
            Err(CodecError::ExpiryOutOfRange(0))
        ));
        assert!(matches!(
            codec().generate(SECRET, EXPIRY, "", 0),
            Err(CodecError::EmptyPrefix)
        ));
        assert!(matches!(
            codec().generate(SECRET, EXPIRY, "wtr", -1),
            Err(CodecError::NegativeExtra(-1))
        ));
        // a tiny timestamp cannot fill the field
        assert!(codec().generate(SECRET, 12_345, "wtr", 0).is_err());
    }

    #[test]
    fn generate_days_clamps_to_max() {
        let max = Utc::now().timestamp_millis() + 1_000;
        let coupon = codec()
            .generate_days(SECRET, 30, "wtr", 0, Some(max))
            .unwrap();
        let decoded = codec().decode(SECRET, &coupon);
        assert!(decoded.valid);
        assert_eq!(decoded.expiry, max);
    }

    #[test]
    fn short_secret_decodes_as_invalid() {
        let coupon = codec().generate(SECRET, EXPIRY, "wtr", 0).unwrap();
        assert!(!codec().decode("abc", &coupon).valid);
    }
}
