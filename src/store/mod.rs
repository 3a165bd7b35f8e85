//! Off-chain read model: the query-optimized projection of ledger state.
//!
//! The store is written exclusively by the [`crate::indexer::AuditIndexer`];
//! request handlers only ever read. `apply` is the single write entry point
//! and must be atomic: dedup check, projection update, audit append, and
//! cursor advance all land together or not at all.

mod memory;
mod postgres;

pub use memory::MemoryReadModel;
pub use postgres::PgReadModel;

use async_trait::async_trait;

use crate::domain::{
    Account, Address, AuditLogEntry, CertHash, Certificate, EventCursor, LedgerEvent,
};

/// Errors from the read model store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A dedup key matched an existing entry with a conflicting payload, or
    /// replay revealed a broken invariant (e.g. a version gap). Fatal for
    /// the entry: the indexer must halt rather than advance past it.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// Internal error.
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Outcome of applying one ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Event was new and has been projected.
    Applied,
    /// Event was already applied; replay was a no-op.
    Duplicate,
}

/// Filter for audit trail queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFilter {
    /// All entries (admin view).
    All,
    /// Entries for one certificate version.
    CertHash(CertHash),
    /// Entries where the given address was the actor.
    Actor(Address),
}

/// The read model projection, maintained by the indexer and served by the
/// query layer.
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Idempotently apply one confirmed ledger event.
    ///
    /// Atomic as a unit: on return, either the projection, the audit entry
    /// and the cursor have all been persisted, or none of them have.
    async fn apply(&self, event: &LedgerEvent) -> Result<ApplyOutcome, StoreError>;

    /// Last durably persisted cursor, if any. The indexer resumes after it.
    async fn last_cursor(&self) -> Result<Option<EventCursor>, StoreError>;

    async fn account(&self, address: &Address) -> Result<Option<Account>, StoreError>;

    async fn certificate(&self, cert_hash: &CertHash) -> Result<Option<Certificate>, StoreError>;

    /// Highest-version certificate for a subject.
    async fn current_certificate(&self, subject_id: &str)
        -> Result<Option<Certificate>, StoreError>;

    /// All versions for a subject, oldest first.
    async fn history(&self, subject_id: &str) -> Result<Vec<Certificate>, StoreError>;

    /// Audit entries matching `filter`, ordered by `(timestamp, tx_id)`
    /// ascending, plus the total matching count for pagination.
    async fn list_audit(
        &self,
        filter: &AuditFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<AuditLogEntry>, u64), StoreError>;
}
