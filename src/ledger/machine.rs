//! Certificate lifecycle state machine.
//!
//! Fronts the ledger with local pre-validation: illegal transitions and
//! malformed input are rejected before any submission is attempted, because
//! on-chain submissions are slow and cost something. The ledger remains the
//! final arbiter; a rejection after successful pre-validation is surfaced
//! as [`MachineError::ConcurrentModification`] and is never retried
//! automatically, since retrying a stale version could double-issue.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::domain::{
    validate_revocation_reason, Account, Address, CertHash, Certificate, CertificateAttributes,
    CertificateStatus, MAX_REVOCATION_REASON_LEN,
};
use crate::store::{ReadModelStore, StoreError};

use super::{LedgerClient, LedgerError, SubmitAction, TxReceipt};

/// Errors from the certificate state machine.
#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    /// Malformed input, rejected before any ledger interaction.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller is not authorized (or not an admin) for this operation.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Referenced certificate or account does not exist in the read model.
    #[error("not found: {0}")]
    NotFound(String),

    /// The certificate is not in a state this transition is legal from.
    #[error("invalid transition: {0} is {1:?}")]
    InvalidTransition(CertHash, CertificateStatus),

    /// Local pre-validation passed but the ledger rejected the submission.
    /// The caller must refresh state before retrying.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Ledger timeout or unavailability. Retryable.
    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LedgerError> for MachineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::SubmissionRejected(reason) => Self::ConcurrentModification(reason),
            other => Self::Ledger(other),
        }
    }
}

/// Pre-validating façade over the ledger.
///
/// Reads current state from the (eventually consistent) read model, checks
/// business rules, then submits. Owns the decision of whether a transition
/// is legal before submission; the ledger owns final truth.
pub struct CertificateLedger {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn ReadModelStore>,
}

impl CertificateLedger {
    pub fn new(ledger: Arc<dyn LedgerClient>, store: Arc<dyn ReadModelStore>) -> Self {
        Self { ledger, store }
    }

    async fn require_account(&self, address: &Address) -> Result<Account, MachineError> {
        self.store
            .account(address)
            .await?
            .ok_or_else(|| MachineError::NotFound(format!("account {address}")))
    }

    async fn require_authorized(&self, address: &Address) -> Result<Account, MachineError> {
        let account = self.require_account(address).await?;
        if !account.is_authorized {
            return Err(MachineError::Authorization(format!(
                "account {address} is not authorized"
            )));
        }
        Ok(account)
    }

    async fn require_admin(&self, address: &Address) -> Result<Account, MachineError> {
        let account = self.require_account(address).await?;
        if !account.is_admin {
            return Err(MachineError::Authorization(format!(
                "account {address} is not an admin"
            )));
        }
        Ok(account)
    }

    /// Issue the next version of a certificate for `subject_id`.
    ///
    /// Assigns `current_max_version + 1`, computes the content hash, and
    /// submits. Returns the confirmed certificate.
    #[instrument(skip(self, attributes), fields(issuer = %issuer, subject_id = subject_id))]
    pub async fn issue(
        &self,
        issuer: &Address,
        subject_id: &str,
        attributes: CertificateAttributes,
    ) -> Result<(Certificate, TxReceipt), MachineError> {
        if subject_id.trim().is_empty() {
            return Err(MachineError::Validation("empty subject_id".to_string()));
        }
        if attributes.subject_name.trim().is_empty() {
            return Err(MachineError::Validation("empty subject_name".to_string()));
        }
        self.require_authorized(issuer).await?;

        let next_version = match self.store.current_certificate(subject_id).await? {
            Some(current) => current.version + 1,
            None => 1,
        };
        let certificate = Certificate::new(
            subject_id,
            next_version,
            attributes,
            issuer.clone(),
            Utc::now(),
        );

        let receipt = self
            .ledger
            .submit(
                issuer,
                SubmitAction::Issue {
                    certificate: certificate.clone(),
                },
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "issue submission failed");
                MachineError::from(e)
            })?;

        info!(
            cert_hash = %certificate.cert_hash,
            version = certificate.version,
            tx_id = %receipt.tx_id,
            "certificate issued"
        );
        Ok((certificate, receipt))
    }

    /// Revoke an active certificate version.
    #[instrument(skip(self), fields(actor = %actor, cert_hash = %cert_hash))]
    pub async fn revoke(
        &self,
        actor: &Address,
        cert_hash: &CertHash,
        reason: &str,
    ) -> Result<TxReceipt, MachineError> {
        if !validate_revocation_reason(reason) {
            return Err(MachineError::Validation(format!(
                "revocation reason must be 1..={} characters",
                MAX_REVOCATION_REASON_LEN
            )));
        }
        self.require_authorized(actor).await?;

        let certificate = self
            .store
            .certificate(cert_hash)
            .await?
            .ok_or_else(|| MachineError::NotFound(format!("certificate {cert_hash}")))?;
        if certificate.status() != CertificateStatus::Active {
            return Err(MachineError::InvalidTransition(
                cert_hash.clone(),
                certificate.status(),
            ));
        }

        let receipt = self
            .ledger
            .submit(
                actor,
                SubmitAction::Revoke {
                    cert_hash: cert_hash.clone(),
                    reason: reason.to_string(),
                },
            )
            .await?;

        info!(tx_id = %receipt.tx_id, "certificate revoked");
        Ok(receipt)
    }

    /// Reactivate a revoked certificate version.
    #[instrument(skip(self), fields(actor = %actor, cert_hash = %cert_hash))]
    pub async fn reactivate(
        &self,
        actor: &Address,
        cert_hash: &CertHash,
    ) -> Result<TxReceipt, MachineError> {
        self.require_authorized(actor).await?;

        let certificate = self
            .store
            .certificate(cert_hash)
            .await?
            .ok_or_else(|| MachineError::NotFound(format!("certificate {cert_hash}")))?;
        if certificate.status() != CertificateStatus::Revoked {
            return Err(MachineError::InvalidTransition(
                cert_hash.clone(),
                certificate.status(),
            ));
        }

        let receipt = self
            .ledger
            .submit(
                actor,
                SubmitAction::Reactivate {
                    cert_hash: cert_hash.clone(),
                },
            )
            .await?;

        info!(tx_id = %receipt.tx_id, "certificate reactivated");
        Ok(receipt)
    }

    /// Register a new account. Admin only.
    #[instrument(skip(self, display_name, email), fields(actor = %actor, address = %address))]
    pub async fn register_account(
        &self,
        actor: &Address,
        address: Address,
        display_name: String,
        email: String,
        is_admin: bool,
    ) -> Result<TxReceipt, MachineError> {
        self.require_admin(actor).await?;
        if self.store.account(&address).await?.is_some() {
            return Err(MachineError::Validation(format!(
                "account {address} already registered"
            )));
        }

        let receipt = self
            .ledger
            .submit(
                actor,
                SubmitAction::RegisterAccount {
                    address: address.clone(),
                    display_name,
                    email,
                    is_admin,
                },
            )
            .await?;

        info!(tx_id = %receipt.tx_id, "account registered");
        Ok(receipt)
    }

    /// Toggle an account's authorization. Admin only. The account row is
    /// kept forever; only the flag changes.
    #[instrument(skip(self), fields(actor = %actor, address = %address, authorized))]
    pub async fn set_authorization(
        &self,
        actor: &Address,
        address: &Address,
        authorized: bool,
    ) -> Result<TxReceipt, MachineError> {
        self.require_admin(actor).await?;
        self.require_account(address).await?;

        let receipt = self
            .ledger
            .submit(
                actor,
                SubmitAction::SetAuthorization {
                    address: address.clone(),
                    authorized,
                },
            )
            .await?;

        info!(tx_id = %receipt.tx_id, "account authorization updated");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CredentialValue;
    use crate::indexer::AuditIndexer;
    use crate::ledger::InMemoryLedger;
    use crate::store::MemoryReadModel;

    fn attrs() -> CertificateAttributes {
        CertificateAttributes {
            subject_name: "Ada".to_string(),
            program: "Math".to_string(),
            credential_value: CredentialValue::from_scaled(385),
            issuing_authority: "Institute".to_string(),
        }
    }

    struct Fixture {
        machine: CertificateLedger,
        indexer: AuditIndexer,
        admin: Address,
    }

    async fn fixture() -> Fixture {
        let admin = Address::from_public_key_bytes(&[1u8; 32]);
        let ledger = Arc::new(InMemoryLedger::new().with_genesis_admin(admin.clone()).await);
        let store = Arc::new(MemoryReadModel::new());
        let machine = CertificateLedger::new(ledger.clone(), store.clone());
        let indexer = AuditIndexer::new(Default::default(), ledger, store);
        indexer.run_until_idle().await.unwrap();
        Fixture {
            machine,
            indexer,
            admin,
        }
    }

    #[tokio::test]
    async fn issue_assigns_sequential_versions() {
        let fx = fixture().await;
        let (c1, _) = fx.machine.issue(&fx.admin, "S1", attrs()).await.unwrap();
        fx.indexer.run_until_idle().await.unwrap();
        let (c2, _) = fx.machine.issue(&fx.admin, "S1", attrs()).await.unwrap();
        assert_eq!(c1.version, 1);
        assert_eq!(c2.version, 2);
    }

    #[tokio::test]
    async fn stale_read_model_surfaces_concurrent_modification() {
        let fx = fixture().await;
        fx.machine.issue(&fx.admin, "S1", attrs()).await.unwrap();
        // Read model not refreshed: the second issue pre-validates to v1
        // again and the ledger rejects it.
        let err = fx.machine.issue(&fx.admin, "S1", attrs()).await.unwrap_err();
        assert!(matches!(err, MachineError::ConcurrentModification(_)));
    }

    #[tokio::test]
    async fn revoke_requires_bounded_reason() {
        let fx = fixture().await;
        let (cert, _) = fx.machine.issue(&fx.admin, "S1", attrs()).await.unwrap();
        fx.indexer.run_until_idle().await.unwrap();

        let err = fx
            .machine
            .revoke(&fx.admin, &cert.cert_hash, "")
            .await
            .unwrap_err();
        assert!(matches!(err, MachineError::Validation(_)));

        let long = "x".repeat(501);
        let err = fx
            .machine
            .revoke(&fx.admin, &cert.cert_hash, &long)
            .await
            .unwrap_err();
        assert!(matches!(err, MachineError::Validation(_)));

        fx.machine
            .revoke(&fx.admin, &cert.cert_hash, "fraud")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn revoke_only_from_active() {
        let fx = fixture().await;
        let (cert, _) = fx.machine.issue(&fx.admin, "S1", attrs()).await.unwrap();
        fx.indexer.run_until_idle().await.unwrap();
        fx.machine
            .revoke(&fx.admin, &cert.cert_hash, "fraud")
            .await
            .unwrap();
        fx.indexer.run_until_idle().await.unwrap();

        let err = fx
            .machine
            .revoke(&fx.admin, &cert.cert_hash, "again")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MachineError::InvalidTransition(_, CertificateStatus::Revoked)
        ));
    }

    #[tokio::test]
    async fn reactivate_only_from_revoked() {
        let fx = fixture().await;
        let (cert, _) = fx.machine.issue(&fx.admin, "S1", attrs()).await.unwrap();
        fx.indexer.run_until_idle().await.unwrap();

        let err = fx
            .machine
            .reactivate(&fx.admin, &cert.cert_hash)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MachineError::InvalidTransition(_, CertificateStatus::Active)
        ));
    }

    #[tokio::test]
    async fn deauthorized_account_cannot_issue() {
        let fx = fixture().await;
        let issuer_addr = Address::from_public_key_bytes(&[7u8; 32]);
        fx.machine
            .register_account(
                &fx.admin,
                issuer_addr.clone(),
                "Issuer".to_string(),
                "i@example.org".to_string(),
                false,
            )
            .await
            .unwrap();
        fx.indexer.run_until_idle().await.unwrap();

        fx.machine
            .set_authorization(&fx.admin, &issuer_addr, false)
            .await
            .unwrap();
        fx.indexer.run_until_idle().await.unwrap();

        let err = fx
            .machine
            .issue(&issuer_addr, "S1", attrs())
            .await
            .unwrap_err();
        assert!(matches!(err, MachineError::Authorization(_)));
    }

    #[tokio::test]
    async fn non_admin_cannot_register() {
        let fx = fixture().await;
        let issuer_addr = Address::from_public_key_bytes(&[7u8; 32]);
        fx.machine
            .register_account(
                &fx.admin,
                issuer_addr.clone(),
                "Issuer".to_string(),
                "i@example.org".to_string(),
                false,
            )
            .await
            .unwrap();
        fx.indexer.run_until_idle().await.unwrap();

        let other = Address::from_public_key_bytes(&[8u8; 32]);
        let err = fx
            .machine
            .register_account(
                &issuer_addr,
                other,
                "X".to_string(),
                "x@example.org".to_string(),
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MachineError::Authorization(_)));
    }
}
