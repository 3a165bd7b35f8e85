//! In-memory read model for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::crypto::{canonical_json_hash, Hash256};
use crate::domain::{
    Account, Address, AuditLogEntry, CertHash, Certificate, EventCursor, LedgerAction,
    LedgerEvent, TxId,
};

use super::{ApplyOutcome, AuditFilter, ReadModelStore, StoreError};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Address, Account>,
    certificates: HashMap<CertHash, Certificate>,
    /// Per-subject version order: index i holds the hash of version i+1.
    by_subject: HashMap<String, Vec<CertHash>>,
    audit: Vec<AuditLogEntry>,
    /// tx_id -> fingerprint of the applied event, for idempotent replay.
    applied: HashMap<TxId, Hash256>,
    cursor: Option<EventCursor>,
}

/// Read model backed by in-process maps. All of `apply` runs under a single
/// write lock, which gives the atomic dedup-project-append-cursor unit for
/// free.
pub struct MemoryReadModel {
    inner: RwLock<Inner>,
}

impl MemoryReadModel {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryReadModel {
    fn default() -> Self {
        Self::new()
    }
}

fn event_fingerprint(event: &LedgerEvent) -> Result<Hash256, StoreError> {
    let value = serde_json::to_value(event)
        .map_err(|e| StoreError::Internal(format!("unserializable event: {e}")))?;
    Ok(canonical_json_hash(&value))
}

impl Inner {
    /// Validate the event against current state without mutating anything.
    fn check(&self, event: &LedgerEvent) -> Result<(), StoreError> {
        match &event.action {
            LedgerAction::AccountRegistered { address, .. } => {
                if self.accounts.contains_key(address) {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "duplicate registration for account {address}"
                    )));
                }
            }
            LedgerAction::AccountAuthorizationSet { address, .. } => {
                if !self.accounts.contains_key(address) {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "authorization change for unknown account {address}"
                    )));
                }
            }
            LedgerAction::CertificateIssued { certificate } => {
                if self.certificates.contains_key(&certificate.cert_hash) {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "duplicate certificate hash {}",
                        certificate.cert_hash
                    )));
                }
                let expected = self
                    .by_subject
                    .get(&certificate.subject_id)
                    .map(|v| v.len() as u32 + 1)
                    .unwrap_or(1);
                if certificate.version != expected {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "version gap for subject {}: expected v{}, got v{}",
                        certificate.subject_id, expected, certificate.version
                    )));
                }
            }
            LedgerAction::CertificateRevoked { cert_hash, .. } => {
                match self.certificates.get(cert_hash) {
                    None => {
                        return Err(StoreError::ConsistencyViolation(format!(
                            "revoke for unknown certificate {cert_hash}"
                        )))
                    }
                    Some(c) if c.is_revoked => {
                        return Err(StoreError::ConsistencyViolation(format!(
                            "revoke for already-revoked certificate {cert_hash}"
                        )))
                    }
                    Some(_) => {}
                }
            }
            LedgerAction::CertificateReactivated { cert_hash } => {
                match self.certificates.get(cert_hash) {
                    None => {
                        return Err(StoreError::ConsistencyViolation(format!(
                            "reactivate for unknown certificate {cert_hash}"
                        )))
                    }
                    Some(c) if !c.is_revoked => {
                        return Err(StoreError::ConsistencyViolation(format!(
                            "reactivate for active certificate {cert_hash}"
                        )))
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn project(&mut self, event: &LedgerEvent) {
        match &event.action {
            LedgerAction::AccountRegistered {
                address,
                display_name,
                email,
                is_admin,
            } => {
                self.accounts.insert(
                    address.clone(),
                    Account::new(
                        address.clone(),
                        display_name.clone(),
                        email.clone(),
                        *is_admin,
                        event.timestamp,
                    ),
                );
            }
            LedgerAction::AccountAuthorizationSet {
                address,
                authorized,
            } => {
                if let Some(account) = self.accounts.get_mut(address) {
                    account.is_authorized = *authorized;
                }
            }
            LedgerAction::CertificateIssued { certificate } => {
                self.by_subject
                    .entry(certificate.subject_id.clone())
                    .or_default()
                    .push(certificate.cert_hash.clone());
                self.certificates
                    .insert(certificate.cert_hash.clone(), certificate.clone());
            }
            LedgerAction::CertificateRevoked { cert_hash, reason } => {
                if let Some(cert) = self.certificates.get_mut(cert_hash) {
                    cert.is_revoked = true;
                    cert.revocation_reason = Some(reason.clone());
                }
            }
            LedgerAction::CertificateReactivated { cert_hash } => {
                if let Some(cert) = self.certificates.get_mut(cert_hash) {
                    cert.is_revoked = false;
                    cert.revocation_reason = None;
                }
            }
        }
    }
}

#[async_trait]
impl ReadModelStore for MemoryReadModel {
    async fn apply(&self, event: &LedgerEvent) -> Result<ApplyOutcome, StoreError> {
        let fingerprint = event_fingerprint(event)?;
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.applied.get(&event.tx_id) {
            if *existing == fingerprint {
                return Ok(ApplyOutcome::Duplicate);
            }
            return Err(StoreError::ConsistencyViolation(format!(
                "transaction {} replayed with conflicting payload",
                event.tx_id
            )));
        }

        inner.check(event)?;
        inner.project(event);

        if let Some(action) = event.audit_action() {
            // cert_hash is always present for audit-relevant actions
            if let Some(cert_hash) = event.cert_hash() {
                inner.audit.push(AuditLogEntry {
                    cert_hash: cert_hash.clone(),
                    action,
                    actor_address: event.actor_address.clone(),
                    reason: event.reason().map(str::to_string),
                    timestamp: event.timestamp,
                    tx_id: event.tx_id,
                    sequence: event.cursor,
                });
            }
        }

        inner.applied.insert(event.tx_id, fingerprint);
        inner.cursor = Some(match inner.cursor {
            Some(c) if c >= event.cursor => c,
            _ => event.cursor,
        });

        Ok(ApplyOutcome::Applied)
    }

    async fn last_cursor(&self) -> Result<Option<EventCursor>, StoreError> {
        Ok(self.inner.read().await.cursor)
    }

    async fn account(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.read().await.accounts.get(address).cloned())
    }

    async fn certificate(&self, cert_hash: &CertHash) -> Result<Option<Certificate>, StoreError> {
        Ok(self.inner.read().await.certificates.get(cert_hash).cloned())
    }

    async fn current_certificate(
        &self,
        subject_id: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_subject
            .get(subject_id)
            .and_then(|hashes| hashes.last())
            .and_then(|hash| inner.certificates.get(hash))
            .cloned())
    }

    async fn history(&self, subject_id: &str) -> Result<Vec<Certificate>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_subject
            .get(subject_id)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|hash| inner.certificates.get(hash))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_audit(
        &self,
        filter: &AuditFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<AuditLogEntry>, u64), StoreError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&AuditLogEntry> = inner
            .audit
            .iter()
            .filter(|entry| match filter {
                AuditFilter::All => true,
                AuditFilter::CertHash(hash) => &entry.cert_hash == hash,
                AuditFilter::Actor(address) => &entry.actor_address == address,
            })
            .collect();
        matching.sort_by_key(|entry| entry.ordering_key());

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}
