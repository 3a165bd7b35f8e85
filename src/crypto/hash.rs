//! Deterministic, domain-separated hashing.
//!
//! Certificate identity hashes are computed over RFC 8785 (JCS) canonical
//! JSON so the same logical content always yields the same hash, regardless
//! of key order or serializer quirks. Every hash carries a domain prefix so
//! digests from different contexts can never collide.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::domain::{Address, CertHash, CertificateAttributes};

/// 32-byte SHA-256 digest.
pub type Hash256 = [u8; 32];

/// Domain prefix for certificate content hashes.
pub const DOMAIN_CERT: &[u8] = b"CERTLEDGER_CERT_V1";

/// Canonicalize a JSON value per RFC 8785.
pub fn canonicalize_json(value: &serde_json::Value) -> String {
    // Canonicalization of an already-valid Value cannot fail.
    serde_json_canonicalizer::to_string(value).unwrap_or_default()
}

/// SHA-256 over the canonical JSON encoding of a value.
pub fn canonical_json_hash(value: &serde_json::Value) -> Hash256 {
    let canonical = canonicalize_json(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().into()
}

/// Compute the deterministic content hash identifying one certificate
/// version.
///
/// Covers `{subject_id, version, attributes, issuer_address, issuance_time}`
/// with millisecond-precision RFC 3339 time, hashed under [`DOMAIN_CERT`].
pub fn cert_content_hash(
    subject_id: &str,
    version: u32,
    attributes: &CertificateAttributes,
    issuer_address: &Address,
    issuance_time: &DateTime<Utc>,
) -> CertHash {
    let content = serde_json::json!({
        "subject_id": subject_id,
        "version": version,
        "subject_name": attributes.subject_name,
        "program": attributes.program,
        "credential_value": attributes.credential_value.scaled(),
        "issuing_authority": attributes.issuing_authority,
        "issuer_address": issuer_address.as_str(),
        "issuance_time": issuance_time.to_rfc3339_opts(SecondsFormat::Millis, true),
    });

    let canonical = canonicalize_json(&content);
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_CERT);
    hasher.update(canonical.as_bytes());
    let digest: Hash256 = hasher.finalize().into();
    CertHash::from_bytes(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CredentialValue;

    fn attrs() -> CertificateAttributes {
        CertificateAttributes {
            subject_name: "Test Subject".to_string(),
            program: "CS".to_string(),
            credential_value: CredentialValue::from_scaled(400),
            issuing_authority: "Registry".to_string(),
        }
    }

    #[test]
    fn canonical_hash_ignores_key_order() {
        let a = serde_json::json!({"a": 1, "b": 2});
        let b = serde_json::json!({"b": 2, "a": 1});
        assert_eq!(canonical_json_hash(&a), canonical_json_hash(&b));
    }

    #[test]
    fn cert_hash_is_stable() {
        let issuer = Address::from_public_key_bytes(&[9u8; 32]);
        let t = Utc::now();
        let h1 = cert_content_hash("S1", 1, &attrs(), &issuer, &t);
        let h2 = cert_content_hash("S1", 1, &attrs(), &issuer, &t);
        assert_eq!(h1, h2);
    }

    #[test]
    fn cert_hash_sensitive_to_every_field() {
        let issuer = Address::from_public_key_bytes(&[9u8; 32]);
        let other = Address::from_public_key_bytes(&[10u8; 32]);
        let t = Utc::now();

        let base = cert_content_hash("S1", 1, &attrs(), &issuer, &t);
        assert_ne!(base, cert_content_hash("S2", 1, &attrs(), &issuer, &t));
        assert_ne!(base, cert_content_hash("S1", 2, &attrs(), &issuer, &t));
        assert_ne!(base, cert_content_hash("S1", 1, &attrs(), &other, &t));

        let mut changed = attrs();
        changed.credential_value = CredentialValue::from_scaled(401);
        assert_ne!(base, cert_content_hash("S1", 1, &changed, &issuer, &t));
    }
}
