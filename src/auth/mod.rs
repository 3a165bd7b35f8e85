//! Wallet-based authentication.
//!
//! Login is a challenge-response over the account's Ed25519 wallet key:
//! the server hands out a short-lived challenge message, the wallet signs
//! it, and a valid signature yields a session token. Possession of the key
//! is the only credential; there are no passwords.

mod challenge;
mod middleware;
mod token;

pub use challenge::{ChallengeConfig, ChallengeSessionManager};
pub use middleware::{auth_middleware, AuthLayerState, Authenticated};
pub use token::{SessionClaims, SessionTokenIssuer};

use crate::domain::Address;

/// Authentication and authorization errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No outstanding challenge for the address.
    #[error("no challenge outstanding for this address")]
    NoSuchChallenge,

    /// The challenge exists but its TTL has elapsed.
    #[error("challenge expired")]
    ExpiredChallenge,

    /// The challenge was already consumed by a previous login attempt.
    #[error("challenge already consumed")]
    AlreadyConsumed,

    /// The signature does not verify against the address's public key.
    #[error("signature verification failed")]
    SignatureMismatch,

    #[error("session token expired")]
    TokenExpired,

    #[error("invalid session token: {0}")]
    InvalidToken(String),

    #[error("missing authentication")]
    MissingAuth,

    /// Token subject is not a registered account.
    #[error("unknown account")]
    UnknownAccount,

    /// The account exists but is not allowed to perform this operation.
    #[error("not authorized")]
    NotAuthorized,
}

/// Identity attached to an authenticated request.
///
/// `is_admin` and `is_authorized` are re-read from the read model on every
/// request rather than trusted from token claims, so a revoked account
/// loses access as soon as the revocation is indexed.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub address: Address,
    pub is_admin: bool,
    pub is_authorized: bool,
}

impl AuthContext {
    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AuthError::NotAuthorized)
        }
    }
}
