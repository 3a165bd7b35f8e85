//! Ledger events: the authoritative record of every state change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, AuditAction, CertHash, Certificate, EventCursor, TxId};

/// Payload of a confirmed ledger event.
///
/// Account events update the account projection only; certificate events
/// additionally append audit log entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerAction {
    AccountRegistered {
        address: Address,
        display_name: String,
        email: String,
        is_admin: bool,
    },
    AccountAuthorizationSet {
        address: Address,
        authorized: bool,
    },
    CertificateIssued {
        certificate: Certificate,
    },
    CertificateRevoked {
        cert_hash: CertHash,
        reason: String,
    },
    CertificateReactivated {
        cert_hash: CertHash,
    },
}

/// A confirmed event as observed on the ledger event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub action: LedgerAction,

    /// Account that signed the originating transaction.
    pub actor_address: Address,

    /// Ledger confirmation time. Advisory for cross-entity ordering.
    pub timestamp: DateTime<Utc>,

    pub tx_id: TxId,

    /// Strictly increasing, ledger-assigned resumption cursor.
    pub cursor: EventCursor,
}

impl LedgerEvent {
    /// The audit action this event maps to, if it is certificate-scoped.
    pub fn audit_action(&self) -> Option<AuditAction> {
        match &self.action {
            LedgerAction::CertificateIssued { .. } => Some(AuditAction::Issued),
            LedgerAction::CertificateRevoked { .. } => Some(AuditAction::Revoked),
            LedgerAction::CertificateReactivated { .. } => Some(AuditAction::Reactivated),
            _ => None,
        }
    }

    /// The certificate hash this event concerns, if any.
    pub fn cert_hash(&self) -> Option<&CertHash> {
        match &self.action {
            LedgerAction::CertificateIssued { certificate } => Some(&certificate.cert_hash),
            LedgerAction::CertificateRevoked { cert_hash, .. } => Some(cert_hash),
            LedgerAction::CertificateReactivated { cert_hash } => Some(cert_hash),
            _ => None,
        }
    }

    /// Revocation reason carried by this event, if any.
    pub fn reason(&self) -> Option<&str> {
        match &self.action {
            LedgerAction::CertificateRevoked { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
