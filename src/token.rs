//! Signed claims tokens
//! --------------------
//! Compact, time-bounded claim sets signed with a single process-wide HS256
//! secret. Issuance allocates a fresh token id (`jti`) and hands back a
//! `TokenRecord` so the caller can persist the token's existence for audit;
//! the signature alone carries the cryptographic trust. Verification folds
//! every failure mode into "no usable claims" — the reason is logged at debug
//! and never branched on by callers.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RFC 7519 registered claim set carried by every openstats token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    pub jti: String,
}

/// Persisted record of an issued token. Exists so a token can be audited (and
/// eventually revoked) independently of signature validity.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: Uuid,
    pub issuer: String,
    pub subject: String,
    pub audience: String,
    pub issued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenEngine {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl TokenEngine {
    pub fn new(secret: &[u8], issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Sign a claim set for `subject`, valid over `[not_before, expires_at]`.
    /// Returns the signed text plus the record the caller must persist.
    pub fn issue(
        &self,
        subject: &str,
        not_before: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<(String, TokenRecord)> {
        let now = Utc::now();
        let record = TokenRecord {
            id: Uuid::now_v7(),
            issuer: self.issuer.clone(),
            subject: subject.to_string(),
            audience: self.audience.clone(),
            issued_at: now,
            not_before,
            expires_at,
        };
        let claims = RegisteredClaims {
            iss: record.issuer.clone(),
            sub: record.subject.clone(),
            aud: record.audience.clone(),
            exp: record.expires_at.timestamp(),
            nbf: record.not_before.timestamp(),
            iat: record.issued_at.timestamp(),
            jti: record.id.to_string(),
        };
        let signed = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((signed, record))
    }

    /// Verify a signed token against this engine's issuer/audience. Any
    /// failure (signature, algorithm, issuer, audience, time bounds) yields
    /// `None`; the detail is only good for logging.
    pub fn verify(&self, token: &str, require_expiration: bool) -> Option<RegisteredClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        if require_expiration {
            validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        } else {
            validation.set_required_spec_claims(&["iss", "aud"]);
        }
        match decode::<RegisteredClaims>(token, &self.decoding, &validation) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                tracing::debug!(target: "auth", "token rejected: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn engine() -> TokenEngine {
        TokenEngine::new(b"unit-test-secret", "openstats", "openstats")
    }

    #[test]
    fn issue_then_verify() {
        let e = engine();
        let now = Utc::now();
        let (signed, record) = e.issue("u_subject", now - Duration::minutes(1), now + Duration::hours(1)).unwrap();
        let claims = e.verify(&signed, true).expect("valid token");
        assert_eq!(claims.sub, "u_subject");
        assert_eq!(claims.iss, "openstats");
        assert_eq!(claims.aud, "openstats");
        assert_eq!(claims.jti, record.id.to_string());
        assert_eq!(claims.exp, record.expires_at.timestamp());
    }

    #[test]
    fn expiry_boundary() {
        let e = engine();
        let now = Utc::now();
        let (past, _) = e.issue("u_subject", now - Duration::hours(2), now - Duration::seconds(1)).unwrap();
        assert!(e.verify(&past, true).is_none());
        let (future, _) = e.issue("u_subject", now - Duration::minutes(1), now + Duration::seconds(5)).unwrap();
        assert!(e.verify(&future, true).is_some());
    }

    #[test]
    fn not_before_in_future_is_rejected() {
        let e = engine();
        let now = Utc::now();
        let (signed, _) = e.issue("u_subject", now + Duration::minutes(5), now + Duration::hours(1)).unwrap();
        assert!(e.verify(&signed, true).is_none());
    }

    #[test]
    fn issuer_and_audience_must_match() {
        let now = Utc::now();
        let other = TokenEngine::new(b"unit-test-secret", "someone-else", "openstats");
        let (signed, _) = other.issue("u_subject", now - Duration::minutes(1), now + Duration::hours(1)).unwrap();
        assert!(engine().verify(&signed, true).is_none());

        let other = TokenEngine::new(b"unit-test-secret", "openstats", "someone-else");
        let (signed, _) = other.issue("u_subject", now - Duration::minutes(1), now + Duration::hours(1)).unwrap();
        assert!(engine().verify(&signed, true).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let other = TokenEngine::new(b"a-different-secret", "openstats", "openstats");
        let (signed, _) = other.issue("u_subject", now - Duration::minutes(1), now + Duration::hours(1)).unwrap();
        assert!(engine().verify(&signed, true).is_none());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let e = engine();
        let now = Utc::now();
        let (signed, _) = e.issue("u_subject", now - Duration::minutes(1), now + Duration::hours(1)).unwrap();
        let mut parts: Vec<String> = signed.split('.').map(str::to_string).collect();
        let mut sig: Vec<char> = parts[2].chars().collect();
        sig[0] = if sig[0] == 'A' { 'B' } else { 'A' };
        parts[2] = sig.into_iter().collect();
        assert!(e.verify(&parts.join("."), true).is_none());
    }
}
