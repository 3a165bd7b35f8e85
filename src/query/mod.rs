//! Read-side query service.
//!
//! Serves the projection maintained by the indexer. Results are eventually
//! consistent with the ledger; handlers never read the ledger directly.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{Address, AuditLogEntry, CertHash, Certificate};
use crate::store::{AuditFilter, ReadModelStore, StoreError};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Errors from the query layer.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validated pagination parameters. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    page_size: u64,
}

impl PageRequest {
    /// Clamps out-of-range input instead of erroring: page 0 becomes 1,
    /// page_size is forced into `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<u64>, page_size: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Pagination metadata attached to every paged response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageMeta {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_count: u64,
    pub has_more: bool,
}

impl PageMeta {
    fn new(request: PageRequest, total_count: u64) -> Self {
        let total_pages = total_count.div_ceil(request.page_size);
        Self {
            current_page: request.page,
            total_pages,
            total_count,
            has_more: request.page < total_pages,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// Read-only façade over the read model.
pub struct QueryService {
    store: Arc<dyn ReadModelStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn ReadModelStore>) -> Self {
        Self { store }
    }

    /// Audit trail page. Entries are ordered oldest first by
    /// `(timestamp, tx_id)` so replays paginate deterministically.
    pub async fn list_audit(
        &self,
        filter: &AuditFilter,
        request: PageRequest,
    ) -> Result<Page<AuditLogEntry>, QueryError> {
        let (data, total_count) = self
            .store
            .list_audit(filter, request.offset(), request.page_size())
            .await?;
        Ok(Page {
            data,
            meta: PageMeta::new(request, total_count),
        })
    }

    pub async fn certificate(&self, cert_hash: &CertHash) -> Result<Certificate, QueryError> {
        self.store
            .certificate(cert_hash)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("certificate {cert_hash}")))
    }

    /// The subject's highest-version certificate, whatever its status.
    pub async fn current_status(&self, subject_id: &str) -> Result<Certificate, QueryError> {
        self.store
            .current_certificate(subject_id)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("subject {subject_id}")))
    }

    /// Every version issued for the subject, oldest first. A subject with
    /// no certificates is a 404, not an empty list.
    pub async fn history(&self, subject_id: &str) -> Result<Vec<Certificate>, QueryError> {
        let history = self.store.history(subject_id).await?;
        if history.is_empty() {
            return Err(QueryError::NotFound(format!("subject {subject_id}")));
        }
        Ok(history)
    }

    pub async fn account_audit(
        &self,
        address: &Address,
        request: PageRequest,
    ) -> Result<Page<AuditLogEntry>, QueryError> {
        self.list_audit(&AuditFilter::Actor(address.clone()), request)
            .await
    }

    pub async fn certificate_audit(
        &self,
        cert_hash: &CertHash,
        request: PageRequest,
    ) -> Result<Page<AuditLogEntry>, QueryError> {
        self.list_audit(&AuditFilter::CertHash(cert_hash.clone()), request)
            .await
    }
}
