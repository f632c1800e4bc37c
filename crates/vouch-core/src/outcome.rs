//! The result pack threaded through every protocol operation.
//!
//! An [`Outcome`] accumulates at most one failure: once a check has marked
//! it not-ok, later [`Outcome::ensure`] calls never overwrite the recorded
//! code or error, and success-code overrides apply only while the pack is
//! still ok. Operations build an outcome through a chain of checks instead
//! of returning early from each one.

use serde::Serialize;

use crate::Code;

/// Result of a protocol operation: `{ok, code, error?, value?}`.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    ok: bool,
    code: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<T>,
}

impl<T> Outcome<T> {
    /// A successful outcome carrying a value.
    #[must_use]
    pub fn good(value: T) -> Self {
        Self {
            ok: true,
            code: Code::Ok,
            error: None,
            value: Some(value),
        }
    }

    /// A successful outcome with no value yet.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ok: true,
            code: Code::Ok,
            error: None,
            value: None,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn fail(code: Code, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            code,
            error: Some(error.into()),
            value: None,
        }
    }

    /// Record a failure unless `test` holds. First failure wins: if the
    /// pack is already not-ok the existing code and error are kept.
    #[must_use]
    pub fn ensure(mut self, test: bool, code: Code, error: impl Into<String>) -> Self {
        if self.ok && !test {
            self.ok = false;
            self.code = code;
            self.error = Some(error.into());
        }
        self
    }

    /// Apply a success code, only while the pack is still ok.
    #[must_use]
    pub fn finish(mut self, code: Code) -> Self {
        if self.ok {
            self.code = code;
        }
        self
    }

    /// Carry a failure over from another outcome, if this one is still ok.
    #[must_use]
    pub fn adopt<U>(mut self, other: &Outcome<U>) -> Self {
        if self.ok && !other.ok {
            self.ok = false;
            self.code = other.code;
            self.error = other.error.clone();
        }
        self
    }

    /// Re-type a failed outcome. The value, if any, is dropped; code and
    /// error carry over. An ok outcome recasts to an ok, valueless pack.
    #[must_use]
    pub fn recast<U>(&self) -> Outcome<U> {
        Outcome {
            ok: self.ok,
            code: self.code,
            error: self.error.clone(),
            value: None,
        }
    }

    /// Replace the value, keeping status.
    #[must_use]
    pub fn with_value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    /// Map the carried value.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            ok: self.ok,
            code: self.code,
            error: self.error,
            value: self.value.map(f),
        }
    }

    /// Chain onto a successful value; failures pass through unchanged.
    #[must_use]
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        if self.ok {
            match self.value {
                Some(v) => f(v),
                None => Outcome::fail(Code::Internal, "outcome has no value to chain"),
            }
        } else {
            self.recast()
        }
    }

    /// Whether the outcome is still ok.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.ok
    }

    /// The status code.
    #[must_use]
    pub const fn code(&self) -> Code {
        self.code
    }

    /// The recorded error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Borrow the carried value.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Take the carried value.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

impl<T> From<Code> for Outcome<T> {
    fn from(code: Code) -> Self {
        if code.is_success() {
            Self::empty().finish(code)
        } else {
            Self::fail(code, code.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_wins() {
        let out: Outcome<()> = Outcome::empty()
            .ensure(true, Code::BadRequest, "fine")
            .ensure(false, Code::Unauthorized, "nope")
            .ensure(false, Code::Internal, "later failure must not overwrite");
        assert!(!out.is_ok());
        assert_eq!(out.code(), Code::Unauthorized);
        assert_eq!(out.error(), Some("nope"));
    }

    #[test]
    fn success_code_only_applies_while_ok() {
        let ok: Outcome<()> = Outcome::empty().finish(Code::NoContent);
        assert_eq!(ok.code(), Code::NoContent);
        assert!(ok.is_ok());

        let bad: Outcome<()> = Outcome::fail(Code::Locked, "held").finish(Code::NoContent);
        assert_eq!(bad.code(), Code::Locked);
    }

    #[test]
    fn adopt_carries_failure_once() {
        let failed: Outcome<u32> = Outcome::fail(Code::Quota, "burst exceeded");
        let out: Outcome<String> = Outcome::good("x".into())
            .adopt(&failed)
            .adopt(&Outcome::<u32>::fail(Code::Internal, "second"));
        assert_eq!(out.code(), Code::Quota);
        // value survives the status flip
        assert_eq!(out.value(), Some(&"x".to_string()));
    }

    #[test]
    fn and_then_short_circuits() {
        let out = Outcome::good(2_u32).and_then(|n| Outcome::good(n.saturating_mul(3)));
        assert_eq!(out.into_value(), Some(6));

        let failed: Outcome<u32> =
            Outcome::<u32>::fail(Code::NotFound, "missing").and_then(Outcome::good);
        assert_eq!(failed.code(), Code::NotFound);
    }

    #[test]
    fn serializes_without_empty_fields() {
        let out = Outcome::good(5_u32);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["value"], 5);
        assert!(json.get("error").is_none());
    }
}
