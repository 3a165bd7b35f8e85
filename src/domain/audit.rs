//! Immutable audit trail entries derived from ledger events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, CertHash, EventCursor, TxId};

/// Certificate lifecycle actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Issued,
    Revoked,
    Reactivated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Issued => "ISSUED",
            AuditAction::Revoked => "REVOKED",
            AuditAction::Reactivated => "REACTIVATED",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "ISSUED" => Some(AuditAction::Issued),
            "REVOKED" => Some(AuditAction::Revoked),
            "REACTIVATED" => Some(AuditAction::Reactivated),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit log row.
///
/// `(tx_id, action, cert_hash)` is the natural dedup key: the same ledger
/// transaction must never produce two entries. Ordering for readers is
/// timestamp ascending with the ledger-assigned cursor as tiebreak, so a
/// timestamp tie still reads back in confirmation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub cert_hash: CertHash,
    pub action: AuditAction,
    pub actor_address: Address,

    /// Revocation reason, present for `REVOKED` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub timestamp: DateTime<Utc>,
    pub tx_id: TxId,

    /// Ledger-assigned sequence, advisory tiebreak for ordering.
    pub sequence: EventCursor,
}

impl AuditLogEntry {
    /// Natural dedup key for idempotent replay.
    pub fn dedup_key(&self) -> (TxId, AuditAction, &CertHash) {
        (self.tx_id, self.action, &self.cert_hash)
    }

    /// Stable ordering key: timestamp, then the ledger-assigned cursor.
    /// The random `tx_id` only breaks ties between distinct streams.
    pub fn ordering_key(&self) -> (DateTime<Utc>, EventCursor, TxId) {
        (self.timestamp, self.sequence, self.tx_id)
    }
}
