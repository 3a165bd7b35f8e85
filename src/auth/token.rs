//! Session tokens.
//!
//! Issued after a successful challenge login. The token binds only the
//! wallet address; privilege flags are re-read from the read model on
//! every request.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Address;

use super::AuthError;

/// Session JWT claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Wallet address.
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// Signs and validates session tokens with an HMAC secret.
pub struct SessionTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl SessionTokenIssuer {
    pub fn new(secret: &[u8], issuer: &str, audience: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            ttl,
        }
    }

    pub fn issue(&self, address: &Address) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: address.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Validate a token and return the wallet address it was issued to.
    pub fn validate(&self, token: &str) -> Result<Address, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let data =
            decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => AuthError::InvalidToken(e.to_string()),
                }
            })?;

        data.claims
            .sub
            .parse::<Address>()
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::WalletKey;

    fn issuer_with_ttl(ttl: Duration) -> SessionTokenIssuer {
        SessionTokenIssuer::new(b"test-secret-key", "certledger", "certledger-api", ttl)
    }

    #[test]
    fn issue_and_validate_round_trip() {
        let issuer = issuer_with_ttl(Duration::hours(1));
        let address = WalletKey::generate().address();

        let token = issuer.issue(&address).unwrap();
        assert_eq!(issuer.validate(&token).unwrap(), address);
    }

    #[test]
    fn expired_token_is_rejected() {
        // -120s to clear jsonwebtoken's default 60s leeway
        let issuer = issuer_with_ttl(Duration::seconds(-120));
        let address = WalletKey::generate().address();

        let token = issuer.issue(&address).unwrap();
        assert_eq!(issuer.validate(&token).unwrap_err(), AuthError::TokenExpired);
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let a = issuer_with_ttl(Duration::hours(1));
        let b = SessionTokenIssuer::new(
            b"other-secret",
            "certledger",
            "certledger-api",
            Duration::hours(1),
        );
        let address = WalletKey::generate().address();

        let token = a.issue(&address).unwrap();
        assert!(matches!(
            b.validate(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }
}
