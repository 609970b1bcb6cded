//! HS256 session-token codec.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::claims::{SessionClaims, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl TokenError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Signs and verifies session tokens with one process-wide secret.
///
/// Expiry is checked by [`validate_claims`] against an explicit clock rather
/// than by the JWT library, so the `_at` variants are fully deterministic.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec").field("alg", &Algorithm::HS256).finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issue(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        self.issue_at(claims, Utc::now())
    }

    /// Refuses to sign claims that would not verify at `now`.
    pub fn issue_at(&self, claims: &SessionClaims, now: DateTime<Utc>) -> Result<String, TokenError> {
        validate_claims(claims, now)?;
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn parse(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.parse_at(token, Utc::now())
    }

    pub fn parse_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use kb_core::{IdentityId, TenantId};
    use proptest::prelude::*;

    use super::*;
    use crate::Role;

    const SECRET: &[u8] = b"test-secret";

    fn alice(now: DateTime<Utc>) -> SessionClaims {
        SessionClaims::for_identity(IdentityId::new(1), "alice", Role::Analyst, vec![TenantId::new(7)], now)
    }

    #[test]
    fn issue_then_parse_round_trips() {
        let codec = TokenCodec::new(SECRET);
        let claims = alice(Utc::now());
        let token = codec.issue(&claims).unwrap();
        assert_eq!(codec.parse(&token).unwrap(), claims);
    }

    #[test]
    fn expired_token_is_expired_not_invalid() {
        let codec = TokenCodec::new(SECRET);
        let issued = Utc::now();
        let token = codec.issue_at(&alice(issued), issued).unwrap();

        let later = issued + Duration::hours(24) + Duration::seconds(1);
        assert_eq!(codec.parse_at(&token, later), Err(TokenError::Expired));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = TokenCodec::new(SECRET).issue(&alice(Utc::now())).unwrap();
        let other = TokenCodec::new(b"another-secret");
        assert!(matches!(other.parse(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn other_algorithm_is_invalid() {
        let claims = alice(Utc::now());
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(matches!(TokenCodec::new(SECRET).parse(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn garbage_is_invalid() {
        let codec = TokenCodec::new(SECRET);
        for raw in ["", "abc", "a.b.c", "eyJhbGciOiJIUzI1NiJ9.e30.AAAA"] {
            assert!(matches!(codec.parse(raw), Err(TokenError::Invalid(_))), "{raw}");
        }
    }

    #[test]
    fn missing_claims_are_invalid() {
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({ "user_id": 1, "username": "x", "role": "viewer" }),
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(matches!(TokenCodec::new(SECRET).parse(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn refuses_to_sign_a_dead_window() {
        let now = Utc::now();
        let mut claims = alice(now);
        claims.expires_at = claims.issued_at;
        assert!(matches!(TokenCodec::new(SECRET).issue_at(&claims, now), Err(TokenError::Invalid(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn claims_survive_the_wire(
            id in any::<i64>(),
            name in "[a-z]{1,16}",
            role_idx in 0usize..6,
            tenants in prop::collection::vec(any::<i64>(), 0..6),
            offset_secs in 0i64..86_399,
        ) {
            let codec = TokenCodec::new(SECRET);
            let now = Utc::now();
            let claims = SessionClaims::for_identity(
                IdentityId::new(id),
                name,
                Role::ALL[role_idx],
                tenants.into_iter().map(TenantId::new).collect(),
                now,
            );
            let token = codec.issue_at(&claims, now).unwrap();
            let parsed = codec.parse_at(&token, now + Duration::seconds(offset_secs)).unwrap();
            prop_assert_eq!(parsed, claims);
        }
    }
}
