//! Certificates and their lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::cert_content_hash;

use super::{Address, CertHash, CredentialValue};

/// Bounds on the revocation reason text.
pub const MIN_REVOCATION_REASON_LEN: usize = 1;
pub const MAX_REVOCATION_REASON_LEN: usize = 500;

/// Content attributes covered by the certificate hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateAttributes {
    pub subject_name: String,
    pub program: String,
    pub credential_value: CredentialValue,
    pub issuing_authority: String,
}

/// Lifecycle state of a single `(subject_id, version)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Active,
    Revoked,
}

impl CertificateStatus {
    /// Legal lifecycle transitions: ACTIVE <-> REVOKED, any number of times.
    pub fn can_transition_to(self, next: CertificateStatus) -> bool {
        match (self, next) {
            (CertificateStatus::Active, CertificateStatus::Revoked) => true,
            (CertificateStatus::Revoked, CertificateStatus::Active) => true,
            _ => false,
        }
    }
}

/// One version of a credential, identified externally by its content hash.
///
/// Versions for a subject form a strictly increasing, gap-free sequence
/// starting at 1. Only the highest version is "current" for status queries,
/// but every version is independently queryable and revocable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub subject_id: String,
    pub version: u32,
    pub attributes: CertificateAttributes,
    pub issuer_address: Address,
    pub issuance_time: DateTime<Utc>,

    /// Deterministic content hash over subject, version, attributes, issuer
    /// and issuance time. Globally unique.
    pub cert_hash: CertHash,

    pub is_revoked: bool,

    /// Present iff revoked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
}

impl Certificate {
    /// Build a new active certificate and compute its content hash.
    pub fn new(
        subject_id: impl Into<String>,
        version: u32,
        attributes: CertificateAttributes,
        issuer_address: Address,
        issuance_time: DateTime<Utc>,
    ) -> Self {
        let subject_id = subject_id.into();
        let cert_hash = cert_content_hash(
            &subject_id,
            version,
            &attributes,
            &issuer_address,
            &issuance_time,
        );
        Self {
            subject_id,
            version,
            attributes,
            issuer_address,
            issuance_time,
            cert_hash,
            is_revoked: false,
            revocation_reason: None,
        }
    }

    pub fn status(&self) -> CertificateStatus {
        if self.is_revoked {
            CertificateStatus::Revoked
        } else {
            CertificateStatus::Active
        }
    }
}

/// Validate a revocation reason against the length bounds.
pub fn validate_revocation_reason(reason: &str) -> bool {
    (MIN_REVOCATION_REASON_LEN..=MAX_REVOCATION_REASON_LEN).contains(&reason.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs() -> CertificateAttributes {
        CertificateAttributes {
            subject_name: "Ada Lovelace".to_string(),
            program: "Mathematics".to_string(),
            credential_value: CredentialValue::from_scaled(385),
            issuing_authority: "Analytical Engine Institute".to_string(),
        }
    }

    fn issuer() -> Address {
        Address::from_public_key_bytes(&[1u8; 32])
    }

    #[test]
    fn cert_hash_is_deterministic() {
        let t = Utc::now();
        let a = Certificate::new("S1", 1, attrs(), issuer(), t);
        let b = Certificate::new("S1", 1, attrs(), issuer(), t);
        assert_eq!(a.cert_hash, b.cert_hash);
    }

    #[test]
    fn cert_hash_differs_across_versions() {
        let t = Utc::now();
        let v1 = Certificate::new("S1", 1, attrs(), issuer(), t);
        let v2 = Certificate::new("S1", 2, attrs(), issuer(), t);
        assert_ne!(v1.cert_hash, v2.cert_hash);
    }

    #[test]
    fn status_transitions() {
        assert!(CertificateStatus::Active.can_transition_to(CertificateStatus::Revoked));
        assert!(CertificateStatus::Revoked.can_transition_to(CertificateStatus::Active));
        assert!(!CertificateStatus::Active.can_transition_to(CertificateStatus::Active));
        assert!(!CertificateStatus::Revoked.can_transition_to(CertificateStatus::Revoked));
    }

    #[test]
    fn revocation_reason_bounds() {
        assert!(!validate_revocation_reason(""));
        assert!(validate_revocation_reason("fraud"));
        assert!(validate_revocation_reason(&"x".repeat(500)));
        assert!(!validate_revocation_reason(&"x".repeat(501)));
    }
}
