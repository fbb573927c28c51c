//! HS256 token signing and verification.
//!
//! Signature handling wraps `jsonwebtoken`; the time-window checks stay in
//! `claims::validate_claims` so they remain deterministic and testable with
//! an injected clock.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("token encoding failed: {0}")]
    Encode(String),
}

/// Verifies a bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// HS256 validator over a shared secret.
pub struct Hs256JwtValidator {
    decoding: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_ref()),
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        // Expiry lives in our own claims (RFC3339 timestamps), so the
        // library's numeric `exp` handling is disabled and the time window is
        // checked by `validate_claims`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

/// HS256 issuer over the same shared secret.
pub struct Hs256TokenIssuer {
    encoding: EncodingKey,
}

impl Hs256TokenIssuer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_ref()),
        }
    }

    pub fn issue(&self, claims: &JwtClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use millbook_core::MillId;

    use crate::{PrincipalId, Role};

    fn claims(issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: PrincipalId::new(),
            mill_id: MillId::new(),
            roles: vec![Role::new("manager")],
            issued_at,
            expires_at,
        }
    }

    #[test]
    fn issue_then_validate_round_trips() {
        let now = Utc::now();
        let issuer = Hs256TokenIssuer::new("test-secret");
        let validator = Hs256JwtValidator::new("test-secret");

        let claims = claims(now, now + Duration::minutes(10));
        let token = issuer.issue(&claims).unwrap();

        let decoded = validator.validate(&token, now).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let now = Utc::now();
        let issuer = Hs256TokenIssuer::new("test-secret");
        let validator = Hs256JwtValidator::new("test-secret");

        let token = issuer
            .issue(&claims(now - Duration::hours(2), now - Duration::hours(1)))
            .unwrap();

        match validator.validate(&token, now) {
            Err(TokenError::Claims(TokenValidationError::Expired)) => {}
            other => panic!("expected expired-token error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let issuer = Hs256TokenIssuer::new("secret-a");
        let validator = Hs256JwtValidator::new("secret-b");

        let token = issuer.issue(&claims(now, now + Duration::minutes(10))).unwrap();
        assert!(matches!(
            validator.validate(&token, now),
            Err(TokenError::Malformed(_))
        ));
    }
}
