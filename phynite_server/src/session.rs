//! Signed form-session tokens
//!
//! A token is `<issued_at_ms>.<hex hmac>`, issued when the form renders and
//! sent back with every user-initiated call. The issue time doubles as the
//! fallback for the time-on-form check.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// How long a form session stays valid
pub const TOKEN_LIFETIME_HOURS: i64 = 24;

/// Allowed clock skew for tokens issued "in the future"
const MAX_SKEW_SECS: i64 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Missing form session token")]
    Missing,

    #[error("Malformed form session token")]
    Malformed,

    #[error("Invalid form session signature")]
    BadSignature,

    #[error("Form session expired")]
    Expired,
}

/// Issues and verifies form-session tokens
#[derive(Clone)]
pub struct FormSigner {
    secret: Vec<u8>,
}

impl FormSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, issued_at_ms: i64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(format!("signup-form:{}", issued_at_ms).as_bytes());
        mac
    }

    /// Issue a token stamped with `now`
    pub fn issue(&self, now: DateTime<Utc>) -> String {
        let issued_at = now.timestamp_millis();
        let signature = hex::encode(self.mac(issued_at).finalize().into_bytes());
        format!("{}.{}", issued_at, signature)
    }

    /// Verify a token and return when it was issued
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        let (issued_at, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let issued_at: i64 = issued_at.parse().map_err(|_| TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        self.mac(issued_at)
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let issued = Utc
            .timestamp_millis_opt(issued_at)
            .single()
            .ok_or(TokenError::Malformed)?;

        if issued > now + Duration::seconds(MAX_SKEW_SECS) {
            return Err(TokenError::Malformed);
        }
        if now - issued > Duration::hours(TOKEN_LIFETIME_HOURS) {
            return Err(TokenError::Expired);
        }

        Ok(issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_issued_token_verifies() {
        let signer = FormSigner::new("secret");
        let token = signer.issue(now());
        let issued = signer.verify(&token, now() + Duration::seconds(10)).unwrap();
        assert_eq!(issued, now());
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = FormSigner::new("secret").issue(now());
        assert_eq!(
            FormSigner::new("another").verify(&token, now()),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_tampered_timestamp_rejected() {
        let signer = FormSigner::new("secret");
        let token = signer.issue(now());
        let (_, signature) = token.split_once('.').unwrap();
        let earlier = format!("{}.{}", now().timestamp_millis() - 60_000, signature);
        assert_eq!(signer.verify(&earlier, now()), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_malformed_and_missing() {
        let signer = FormSigner::new("secret");
        assert_eq!(signer.verify("", now()), Err(TokenError::Missing));
        assert_eq!(signer.verify("abc", now()), Err(TokenError::Malformed));
        assert_eq!(signer.verify("123.zz", now()), Err(TokenError::Malformed));
    }

    #[test]
    fn test_expiry_and_future_tokens() {
        let signer = FormSigner::new("secret");
        let token = signer.issue(now());
        assert_eq!(
            signer.verify(&token, now() + Duration::hours(25)),
            Err(TokenError::Expired)
        );
        assert_eq!(
            signer.verify(&token, now() - Duration::minutes(1)),
            Err(TokenError::Malformed)
        );
    }
}
