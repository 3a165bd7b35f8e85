//! Login challenges.
//!
//! One outstanding challenge per address. Requesting a new challenge
//! replaces any previous one, and a challenge can be consumed exactly
//! once; replaying a signature against a consumed challenge fails even
//! though the signature itself is still valid.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use tokio::sync::Mutex;
use tracing::debug;

use crate::crypto::verify_signature_hex;
use crate::domain::Address;

use super::AuthError;

/// Challenge lifecycle configuration.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    pub ttl: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

struct ChallengeSession {
    message: String,
    issued_at: DateTime<Utc>,
    consumed: bool,
}

/// Issues and verifies login challenges, keyed by wallet address.
pub struct ChallengeSessionManager {
    config: ChallengeConfig,
    sessions: Mutex<HashMap<Address, ChallengeSession>>,
}

impl ChallengeSessionManager {
    pub fn new(config: ChallengeConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create a challenge for the address, replacing any outstanding one.
    /// Returns the message the wallet must sign.
    pub async fn create_challenge(&self, address: &Address) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let issued_at = Utc::now();
        let message = format!(
            "certledger login challenge\naddress: {}\nnonce: {}\nissued: {}",
            address,
            hex::encode(nonce),
            issued_at.to_rfc3339(),
        );

        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            address.clone(),
            ChallengeSession {
                message: message.clone(),
                issued_at,
                consumed: false,
            },
        );
        debug!(address = %address, "challenge created");
        message
    }

    /// Verify a signature over the outstanding challenge and consume it.
    ///
    /// Expiry is reported before signature state: an expired challenge is
    /// [`AuthError::ExpiredChallenge`] even if the signature is garbage.
    pub async fn verify_and_consume(
        &self,
        address: &Address,
        signature_hex: &str,
    ) -> Result<(), AuthError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(address).ok_or(AuthError::NoSuchChallenge)?;

        let age = Utc::now().signed_duration_since(session.issued_at);
        if age.num_seconds() < 0 || age.num_seconds() as u64 >= self.config.ttl.as_secs() {
            sessions.remove(address);
            return Err(AuthError::ExpiredChallenge);
        }
        if session.consumed {
            return Err(AuthError::AlreadyConsumed);
        }
        if !verify_signature_hex(address, session.message.as_bytes(), signature_hex) {
            return Err(AuthError::SignatureMismatch);
        }

        session.consumed = true;
        debug!(address = %address, "challenge consumed");
        Ok(())
    }

    /// Drop expired sessions. Called opportunistically; correctness does
    /// not depend on it since `verify_and_consume` checks expiry itself.
    pub async fn prune(&self) {
        let ttl = self.config.ttl;
        let now = Utc::now();
        self.sessions.lock().await.retain(|_, s| {
            let age = now.signed_duration_since(s.issued_at);
            age.num_seconds() >= 0 && (age.num_seconds() as u64) < ttl.as_secs()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::WalletKey;

    fn manager() -> ChallengeSessionManager {
        ChallengeSessionManager::new(ChallengeConfig::default())
    }

    #[tokio::test]
    async fn valid_signature_consumes_challenge() {
        let manager = manager();
        let key = WalletKey::generate();
        let address = key.address();

        let message = manager.create_challenge(&address).await;
        let signature = key.sign_hex(message.as_bytes());
        manager
            .verify_and_consume(&address, &signature)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn consumed_challenge_rejects_replay() {
        let manager = manager();
        let key = WalletKey::generate();
        let address = key.address();

        let message = manager.create_challenge(&address).await;
        let signature = key.sign_hex(message.as_bytes());
        manager
            .verify_and_consume(&address, &signature)
            .await
            .unwrap();

        // Same valid signature, second attempt
        let err = manager
            .verify_and_consume(&address, &signature)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AlreadyConsumed);
    }

    #[tokio::test]
    async fn wrong_key_is_a_mismatch() {
        let manager = manager();
        let key = WalletKey::generate();
        let other = WalletKey::generate();
        let address = key.address();

        let message = manager.create_challenge(&address).await;
        let signature = other.sign_hex(message.as_bytes());
        let err = manager
            .verify_and_consume(&address, &signature)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SignatureMismatch);
    }

    #[tokio::test]
    async fn missing_challenge_is_distinct_from_mismatch() {
        let manager = manager();
        let key = WalletKey::generate();
        let err = manager
            .verify_and_consume(&key.address(), "00")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NoSuchChallenge);
    }

    #[tokio::test]
    async fn expired_challenge_is_reported_before_signature_state() {
        let manager = ChallengeSessionManager::new(ChallengeConfig {
            ttl: Duration::from_secs(0),
        });
        let key = WalletKey::generate();
        let address = key.address();

        let message = manager.create_challenge(&address).await;
        let signature = key.sign_hex(message.as_bytes());
        let err = manager
            .verify_and_consume(&address, &signature)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::ExpiredChallenge);
    }

    #[tokio::test]
    async fn prune_drops_expired_sessions() {
        let manager = ChallengeSessionManager::new(ChallengeConfig {
            ttl: Duration::from_secs(0),
        });
        let key = WalletKey::generate();
        let address = key.address();

        let message = manager.create_challenge(&address).await;
        manager.prune().await;

        // The expired entry is gone entirely, not just unusable
        let signature = key.sign_hex(message.as_bytes());
        let err = manager
            .verify_and_consume(&address, &signature)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::NoSuchChallenge);
    }

    #[tokio::test]
    async fn prune_keeps_live_sessions() {
        let manager = manager();
        let key = WalletKey::generate();
        let address = key.address();

        let message = manager.create_challenge(&address).await;
        manager.prune().await;

        let signature = key.sign_hex(message.as_bytes());
        manager
            .verify_and_consume(&address, &signature)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn new_challenge_replaces_old() {
        let manager = manager();
        let key = WalletKey::generate();
        let address = key.address();

        let first = manager.create_challenge(&address).await;
        let _second = manager.create_challenge(&address).await;

        // A signature over the replaced challenge no longer verifies
        let stale = key.sign_hex(first.as_bytes());
        let err = manager
            .verify_and_consume(&address, &stale)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SignatureMismatch);
    }
}
