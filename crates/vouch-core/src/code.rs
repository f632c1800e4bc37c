//! Status codes attached to every operation result.

use serde::{Deserialize, Serialize};

/// Result status, used much like HTTP status codes.
///
/// Two variants share the 404 wire status: [`Code::NotFound`] (no such
/// record) and [`Code::Expired`] (record present but past its `expires`
/// stamp). Callers that need to branch on the difference match on the
/// variant, not on [`Code::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    /// Request succeeded.
    Ok,
    /// A new record was written.
    Created,
    /// Accepted with reservations (used for lenient accessor validation).
    Accepted,
    /// Succeeded, nothing to return (deletions).
    NoContent,
    /// Malformed token or parameters.
    BadRequest,
    /// Valid-but-wrong capability, expired key, or inactive account.
    Unauthorized,
    /// Capability type not permitted for this mutation.
    Forbidden,
    /// No such record.
    NotFound,
    /// Concurrent write conflict.
    Conflict,
    /// Intent token no longer registered after being presented.
    Gone,
    /// Intent held by another updater, or a required intent is missing.
    Locked,
    /// Rate or size limit exceeded.
    Quota,
    /// Collaborator or invariant failure.
    Internal,
    /// Collaborator temporarily unable to serve.
    Unable,
    /// No storage slot available.
    NoSlot,
    /// Record's own `expires` has passed.
    Expired,
}

impl Code {
    /// The numeric wire status for this code.
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::Accepted => 202,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound | Self::Expired => 404,
            Self::Conflict => 409,
            Self::Gone => 410,
            Self::Locked => 423,
            Self::Quota => 429,
            Self::Internal => 500,
            Self::Unable => 503,
            Self::NoSlot => 507,
        }
    }

    /// Whether this code marks a successful result.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.status() < 400
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Created => "CREATED",
            Self::Accepted => "ACCEPTED",
            Self::NoContent => "NO_CONTENT",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Gone => "GONE",
            Self::Locked => "LOCKED",
            Self::Quota => "QUOTA",
            Self::Internal => "INTERNAL",
            Self::Unable => "UNABLE",
            Self::NoSlot => "NO_SLOT",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(Code::Ok.status(), 200);
        assert_eq!(Code::Locked.status(), 423);
        assert_eq!(Code::Quota.status(), 429);
        assert_eq!(Code::Gone.status(), 410);
        // expired shares 404 on the wire but stays distinguishable
        assert_eq!(Code::Expired.status(), 404);
        assert_ne!(Code::Expired, Code::NotFound);
    }

    #[test]
    fn success_codes() {
        assert!(Code::Created.is_success());
        assert!(Code::NoContent.is_success());
        assert!(!Code::Unauthorized.is_success());
    }
}
