//! Request and response bodies for the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Account, Address, AuditAction, AuditLogEntry, CertHash, Certificate, CertificateStatus, TxId,
};
use crate::ledger::TxReceipt;

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub address: Address,
    /// Message the wallet must sign, verbatim.
    pub challenge: String,
    pub expires_in_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub address: String,
    /// Hex-encoded Ed25519 signature over the challenge message.
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub address: Address,
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct IssueCertificateRequest {
    pub subject_id: String,
    pub subject_name: String,
    pub program: String,
    /// Decimal credential value, e.g. "3.85".
    pub credential_value: String,
    pub issuing_authority: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterAccountRequest {
    pub address: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetAuthorizationRequest {
    pub authorized: bool,
}

/// Pagination query string: `?page=2&page_size=20`.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TxReceiptResponse {
    pub tx_id: TxId,
    pub cursor: u64,
    pub confirmed_at: DateTime<Utc>,
}

impl From<TxReceipt> for TxReceiptResponse {
    fn from(receipt: TxReceipt) -> Self {
        Self {
            tx_id: receipt.tx_id,
            cursor: receipt.cursor.0,
            confirmed_at: receipt.confirmed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CertificateResponse {
    pub cert_hash: CertHash,
    pub subject_id: String,
    pub version: u32,
    pub status: CertificateStatus,
    pub subject_name: String,
    pub program: String,
    pub credential_value: String,
    pub issuing_authority: String,
    pub issuer_address: Address,
    pub issuance_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
}

impl From<Certificate> for CertificateResponse {
    fn from(cert: Certificate) -> Self {
        Self {
            cert_hash: cert.cert_hash,
            subject_id: cert.subject_id,
            version: cert.version,
            status: if cert.is_revoked {
                CertificateStatus::Revoked
            } else {
                CertificateStatus::Active
            },
            subject_name: cert.attributes.subject_name,
            program: cert.attributes.program,
            credential_value: cert.attributes.credential_value.to_string(),
            issuing_authority: cert.attributes.issuing_authority,
            issuer_address: cert.issuer_address,
            issuance_time: cert.issuance_time,
            revocation_reason: cert.revocation_reason,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IssueCertificateResponse {
    pub certificate: CertificateResponse,
    pub receipt: TxReceiptResponse,
}

#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    pub cert_hash: CertHash,
    pub action: AuditAction,
    pub actor_address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub tx_id: TxId,
    pub sequence: u64,
}

impl From<AuditLogEntry> for AuditEntryResponse {
    fn from(entry: AuditLogEntry) -> Self {
        Self {
            cert_hash: entry.cert_hash,
            action: entry.action,
            actor_address: entry.actor_address,
            reason: entry.reason,
            timestamp: entry.timestamp,
            tx_id: entry.tx_id,
            sequence: entry.sequence.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub address: Address,
    pub display_name: String,
    pub email: String,
    pub is_admin: bool,
    pub is_authorized: bool,
    pub registered_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            address: account.address,
            display_name: account.display_name,
            email: account.email,
            is_admin: account.is_admin,
            is_authorized: account.is_authorized,
            registered_at: account.registered_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cursor: Option<u64>,
}
