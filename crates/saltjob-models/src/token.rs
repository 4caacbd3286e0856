//! Session token returned by `POST /login`.

use chrono::{DateTime, Utc};

use crate::error::ModelError;

/// An immutable session token with an absolute UTC expiry.
///
/// Tokens are never refreshed in place: a new login produces a new
/// `AuthToken` that replaces the old one.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// Create a token from its value and expiry instant.
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Create a token from the `expire` field of a login answer
    /// (fractional seconds since the Unix epoch).
    pub fn from_epoch_seconds(value: impl Into<String>, expire: f64) -> Result<Self, ModelError> {
        if !expire.is_finite() {
            return Err(ModelError::InvalidExpiry(expire));
        }
        let secs = expire.floor();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanos = ((expire - secs) * 1e9) as u32;
        #[allow(clippy::cast_possible_truncation)]
        let expires_at = DateTime::from_timestamp(secs as i64, nanos)
            .ok_or(ModelError::InvalidExpiry(expire))?;
        Ok(Self::new(value, expires_at))
    }

    /// The opaque token value sent as `X-Auth-Token`.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the server stops accepting this token.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// `true` once the current time is strictly past the expiry.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// `true` iff `now` is strictly later than the expiry; the expiry
    /// instant itself still counts as valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn exactly_at_expiry_is_not_expired() {
        let at = Utc::now();
        let token = AuthToken::new("t", at);
        assert!(!token.is_expired_at(at));
        assert!(token.is_expired_at(at + Duration::nanoseconds(1)));
        assert!(!token.is_expired_at(at - Duration::seconds(1)));
    }

    #[test]
    fn past_token_is_expired() {
        let token = AuthToken::new("t", Utc::now() - Duration::seconds(5));
        assert!(token.is_expired());
    }

    #[test]
    fn future_token_is_not_expired() {
        let token = AuthToken::new("t", Utc::now() + Duration::hours(1));
        assert!(!token.is_expired());
    }

    #[test]
    fn from_epoch_seconds_keeps_fraction() {
        let token = AuthToken::from_epoch_seconds("t", 1_700_000_000.5).unwrap();
        assert_eq!(token.expires_at().timestamp(), 1_700_000_000);
        assert_eq!(token.expires_at().timestamp_subsec_millis(), 500);
    }

    #[test]
    fn from_epoch_seconds_rejects_non_finite() {
        assert!(AuthToken::from_epoch_seconds("t", f64::NAN).is_err());
        assert!(AuthToken::from_epoch_seconds("t", f64::INFINITY).is_err());
        assert_eq!(
            AuthToken::from_epoch_seconds("t", 1e300).unwrap_err(),
            ModelError::InvalidExpiry(1e300)
        );
    }

    #[test]
    fn debug_redacts_value() {
        let token = AuthToken::new("abcdef", Utc::now());
        assert!(!format!("{token:?}").contains("abcdef"));
    }
}
