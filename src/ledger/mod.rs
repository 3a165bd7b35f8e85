//! The authoritative ledger boundary.
//!
//! The ledger is the source of truth for all certificate and account state.
//! This module defines the client contract ([`LedgerClient`]), the
//! pre-validation state machine that fronts it ([`machine::CertificateLedger`]),
//! and an in-process authoritative implementation ([`inmem::InMemoryLedger`]).

mod inmem;
mod machine;

pub use inmem::InMemoryLedger;
pub use machine::{CertificateLedger, MachineError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Address, CertHash, Certificate, EventCursor, LedgerEvent, TxId};

/// Errors at the ledger boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// The ledger's own validation rejected the submission. Pre-validated
    /// callers should treat this as a concurrent modification.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// Submission did not confirm within the deadline. Retryable.
    #[error("submission timed out")]
    Timeout,

    /// The ledger or its event stream is unreachable. Retryable.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// A state-changing call to submit to the ledger.
///
/// Certificates are fully formed (version assigned, hash computed) before
/// submission; the ledger re-checks and is the final arbiter.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitAction {
    RegisterAccount {
        address: Address,
        display_name: String,
        email: String,
        is_admin: bool,
    },
    SetAuthorization {
        address: Address,
        authorized: bool,
    },
    Issue {
        certificate: Certificate,
    },
    Revoke {
        cert_hash: CertHash,
        reason: String,
    },
    Reactivate {
        cert_hash: CertHash,
    },
}

/// Confirmation receipt for an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub tx_id: TxId,
    pub cursor: EventCursor,
    pub confirmed_at: DateTime<Utc>,
}

/// Opaque interface to the authoritative registry.
///
/// `submit` blocks until on-chain acceptance (or fails). `events_from` is
/// the resumption contract the indexer depends on: passing the last
/// previously returned cursor resumes exactly after it; `None` replays from
/// genesis. Events are returned in confirmation order.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn submit(
        &self,
        actor: &Address,
        action: SubmitAction,
    ) -> Result<TxReceipt, LedgerError>;

    async fn events_from(
        &self,
        cursor: Option<EventCursor>,
        limit: usize,
    ) -> Result<Vec<LedgerEvent>, LedgerError>;

    /// Cursor of the newest confirmed event, `None` for an empty stream.
    ///
    /// Consumers use this to tell an empty batch at the stream head from a
    /// resumption cursor the ledger has never issued: a durable cursor past
    /// the head means the stream and the projection have diverged.
    async fn head_cursor(&self) -> Result<Option<EventCursor>, LedgerError>;
}
