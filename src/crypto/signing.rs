//! Wallet keys and signature verification.
//!
//! Addresses are Ed25519 public keys; proving control of an address means
//! producing a valid Ed25519 signature over a server-issued message.
//! Verification fails closed: malformed input of any kind yields `false`,
//! never an error path a caller could mistake for success.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey, SIGNATURE_LENGTH};
use rand::rngs::OsRng;

use crate::domain::Address;

/// Ed25519 signature bytes (64 bytes).
pub type Signature64 = [u8; SIGNATURE_LENGTH];

/// Errors from signing-side operations. Verification never returns these;
/// it only ever returns a boolean.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid signature format")]
    InvalidSignatureFormat,

    #[error("invalid secret key format")]
    InvalidSecretKeyFormat,
}

/// A wallet keypair. Used by tests, tooling, and clients; the service itself
/// only ever verifies.
#[derive(Clone)]
pub struct WalletKey {
    signing_key: SigningKey,
}

impl WalletKey {
    /// Generate a fresh random wallet key.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore from secret key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The address controlled by this key.
    pub fn address(&self) -> Address {
        Address::from_public_key_bytes(&self.signing_key.verifying_key().to_bytes())
    }

    /// Sign an arbitrary message.
    pub fn sign(&self, message: &[u8]) -> Signature64 {
        self.signing_key.sign(message).to_bytes()
    }

    /// Sign and hex-encode, the form the auth API accepts.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        signature_to_hex(&self.sign(message))
    }
}

impl std::fmt::Debug for WalletKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Verify that `signature` over `message` was produced by the key
/// controlling `address`.
///
/// Fails closed: a malformed address, wrong-length signature, or any
/// verification error returns `false`.
pub fn verify_signature(address: &Address, message: &[u8], signature: &[u8]) -> bool {
    let key_bytes = match address.to_public_key_bytes() {
        Ok(b) => b,
        Err(_) => return false,
    };
    let verifying_key = match VerifyingKey::from_bytes(&key_bytes) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let sig_bytes: Signature64 = match signature.try_into() {
        Ok(b) => b,
        Err(_) => return false,
    };
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

/// Verify a hex-encoded signature. Fails closed on malformed hex.
pub fn verify_signature_hex(address: &Address, message: &[u8], signature_hex: &str) -> bool {
    match signature_from_hex(signature_hex) {
        Ok(sig) => verify_signature(address, message, &sig),
        Err(_) => false,
    }
}

/// Encode signature bytes as 0x-prefixed hex.
pub fn signature_to_hex(signature: &Signature64) -> String {
    format!("0x{}", hex::encode(signature))
}

/// Parse a signature from hex, with or without the 0x prefix.
pub fn signature_from_hex(hex_str: &str) -> Result<Signature64, SigningError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(hex_str).map_err(|_| SigningError::InvalidSignatureFormat)?;
    bytes
        .try_into()
        .map_err(|_| SigningError::InvalidSignatureFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = WalletKey::generate();
        let message = b"challenge message";
        let sig = key.sign(message);

        assert!(verify_signature(&key.address(), message, &sig));
        assert!(!verify_signature(&key.address(), b"other message", &sig));
    }

    #[test]
    fn wrong_key_fails() {
        let key = WalletKey::generate();
        let impostor = WalletKey::generate();
        let message = b"challenge message";
        let sig = impostor.sign(message);

        assert!(!verify_signature(&key.address(), message, &sig));
    }

    #[test]
    fn malformed_input_fails_closed() {
        let key = WalletKey::generate();
        let message = b"challenge";
        let sig = key.sign(message);

        // Truncated signature
        assert!(!verify_signature(&key.address(), message, &sig[..32]));
        // Empty signature
        assert!(!verify_signature(&key.address(), message, &[]));
        // Address bytes that are not a valid curve point still just fail
        let bogus = Address::from_public_key_bytes(&[0xffu8; 32]);
        assert!(!verify_signature(&bogus, message, &sig));
        // Malformed hex
        assert!(!verify_signature_hex(&key.address(), message, "0xzz"));
    }

    #[test]
    fn hex_roundtrip() {
        let key = WalletKey::generate();
        let sig = key.sign(b"msg");
        let hex_str = signature_to_hex(&sig);
        assert!(hex_str.starts_with("0x"));
        assert_eq!(signature_from_hex(&hex_str).unwrap(), sig);
        assert_eq!(signature_from_hex(&hex_str[2..]).unwrap(), sig);
    }

    #[test]
    fn key_restore_roundtrip() {
        let key = WalletKey::generate();
        let restored = WalletKey::from_bytes(&key.to_bytes());
        assert_eq!(key.address(), restored.address());
    }
}
