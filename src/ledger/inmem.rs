//! In-process authoritative ledger.
//!
//! Plays the role of the external registry contract: an append-only event
//! log with its own final-arbiter validation. Two issuers may both pass
//! client-side pre-validation against a stale read model; the loser is
//! rejected here at confirmation time.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{Address, CertHash, EventCursor, LedgerAction, LedgerEvent, TxId};

use super::{LedgerClient, LedgerError, SubmitAction, TxReceipt};

struct AccountState {
    is_admin: bool,
    is_authorized: bool,
}

struct CertState {
    revoked: bool,
}

#[derive(Default)]
struct LedgerState {
    log: Vec<LedgerEvent>,
    accounts: HashMap<Address, AccountState>,
    certificates: HashMap<CertHash, CertState>,
    /// Highest issued version per subject.
    versions: HashMap<String, u32>,
}

/// Append-only in-memory ledger with authoritative validation.
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Seed a genesis admin account so the first registration has an
    /// authorized actor. Mirrors a contract deployer address.
    pub async fn with_genesis_admin(self, address: Address) -> Self {
        {
            let mut state = self.state.write().await;
            let event = LedgerEvent {
                action: LedgerAction::AccountRegistered {
                    address: address.clone(),
                    display_name: "genesis-admin".to_string(),
                    email: String::new(),
                    is_admin: true,
                },
                actor_address: address.clone(),
                timestamp: Utc::now(),
                tx_id: TxId::new(),
                cursor: EventCursor(1),
            };
            state.log.push(event);
            state.accounts.insert(
                address,
                AccountState {
                    is_admin: true,
                    is_authorized: true,
                },
            );
        }
        self
    }

    fn validate(
        state: &LedgerState,
        actor: &Address,
        action: &SubmitAction,
    ) -> Result<(), LedgerError> {
        let rejected = |msg: String| Err(LedgerError::SubmissionRejected(msg));

        let actor_state = state.accounts.get(actor);
        match action {
            SubmitAction::RegisterAccount { address, .. } => {
                match actor_state {
                    Some(a) if a.is_admin => {}
                    // Bootstrap: an empty ledger accepts its first
                    // registration from any actor.
                    _ if state.accounts.is_empty() => {}
                    _ => return rejected(format!("actor {actor} is not an admin")),
                }
                if state.accounts.contains_key(address) {
                    return rejected(format!("account {address} already registered"));
                }
            }
            SubmitAction::SetAuthorization { address, .. } => {
                match actor_state {
                    Some(a) if a.is_admin => {}
                    _ => return rejected(format!("actor {actor} is not an admin")),
                }
                if !state.accounts.contains_key(address) {
                    return rejected(format!("account {address} is not registered"));
                }
            }
            SubmitAction::Issue { certificate } => {
                match actor_state {
                    Some(a) if a.is_authorized => {}
                    _ => return rejected(format!("actor {actor} is not authorized")),
                }
                let next = state
                    .versions
                    .get(&certificate.subject_id)
                    .copied()
                    .unwrap_or(0)
                    + 1;
                if certificate.version != next {
                    return rejected(format!(
                        "version conflict for subject {}: next is v{}, got v{}",
                        certificate.subject_id, next, certificate.version
                    ));
                }
                if state.certificates.contains_key(&certificate.cert_hash) {
                    return rejected(format!(
                        "certificate hash {} already exists",
                        certificate.cert_hash
                    ));
                }
            }
            SubmitAction::Revoke { cert_hash, reason } => {
                match actor_state {
                    Some(a) if a.is_authorized => {}
                    _ => return rejected(format!("actor {actor} is not authorized")),
                }
                if reason.is_empty() {
                    return rejected("empty revocation reason".to_string());
                }
                match state.certificates.get(cert_hash) {
                    None => return rejected(format!("unknown certificate {cert_hash}")),
                    Some(c) if c.revoked => {
                        return rejected(format!("certificate {cert_hash} is already revoked"))
                    }
                    Some(_) => {}
                }
            }
            SubmitAction::Reactivate { cert_hash } => {
                match actor_state {
                    Some(a) if a.is_authorized => {}
                    _ => return rejected(format!("actor {actor} is not authorized")),
                }
                match state.certificates.get(cert_hash) {
                    None => return rejected(format!("unknown certificate {cert_hash}")),
                    Some(c) if !c.revoked => {
                        return rejected(format!("certificate {cert_hash} is not revoked"))
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn apply(state: &mut LedgerState, actor: &Address, action: SubmitAction) -> LedgerEvent {
        let ledger_action = match action {
            SubmitAction::RegisterAccount {
                address,
                display_name,
                email,
                is_admin,
            } => {
                state.accounts.insert(
                    address.clone(),
                    AccountState {
                        is_admin,
                        is_authorized: true,
                    },
                );
                LedgerAction::AccountRegistered {
                    address,
                    display_name,
                    email,
                    is_admin,
                }
            }
            SubmitAction::SetAuthorization {
                address,
                authorized,
            } => {
                if let Some(account) = state.accounts.get_mut(&address) {
                    account.is_authorized = authorized;
                }
                LedgerAction::AccountAuthorizationSet {
                    address,
                    authorized,
                }
            }
            SubmitAction::Issue { certificate } => {
                state
                    .versions
                    .insert(certificate.subject_id.clone(), certificate.version);
                state
                    .certificates
                    .insert(certificate.cert_hash.clone(), CertState { revoked: false });
                LedgerAction::CertificateIssued { certificate }
            }
            SubmitAction::Revoke { cert_hash, reason } => {
                if let Some(cert) = state.certificates.get_mut(&cert_hash) {
                    cert.revoked = true;
                }
                LedgerAction::CertificateRevoked { cert_hash, reason }
            }
            SubmitAction::Reactivate { cert_hash } => {
                if let Some(cert) = state.certificates.get_mut(&cert_hash) {
                    cert.revoked = false;
                }
                LedgerAction::CertificateReactivated { cert_hash }
            }
        };

        let event = LedgerEvent {
            action: ledger_action,
            actor_address: actor.clone(),
            timestamp: Utc::now(),
            tx_id: TxId::new(),
            cursor: EventCursor(state.log.len() as u64 + 1),
        };
        state.log.push(event.clone());
        event
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn submit(
        &self,
        actor: &Address,
        action: SubmitAction,
    ) -> Result<TxReceipt, LedgerError> {
        let mut state = self.state.write().await;
        Self::validate(&state, actor, &action)?;
        let event = Self::apply(&mut state, actor, action);
        debug!(
            tx_id = %event.tx_id,
            cursor = %event.cursor,
            actor = %actor,
            "ledger submission confirmed"
        );
        Ok(TxReceipt {
            tx_id: event.tx_id,
            cursor: event.cursor,
            confirmed_at: event.timestamp,
        })
    }

    async fn events_from(
        &self,
        cursor: Option<EventCursor>,
        limit: usize,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let state = self.state.read().await;
        let start = cursor.map(|c| c.0 as usize).unwrap_or(0);
        Ok(state.log.iter().skip(start).take(limit).cloned().collect())
    }

    async fn head_cursor(&self) -> Result<Option<EventCursor>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.log.last().map(|event| event.cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Certificate, CertificateAttributes, CredentialValue};

    fn attrs() -> CertificateAttributes {
        CertificateAttributes {
            subject_name: "S".to_string(),
            program: "P".to_string(),
            credential_value: CredentialValue::from_scaled(350),
            issuing_authority: "A".to_string(),
        }
    }

    fn cert(subject: &str, version: u32, issuer: &Address) -> Certificate {
        Certificate::new(subject, version, attrs(), issuer.clone(), Utc::now())
    }

    async fn ledger_with_admin() -> (InMemoryLedger, Address) {
        let admin = Address::from_public_key_bytes(&[1u8; 32]);
        let ledger = InMemoryLedger::new()
            .with_genesis_admin(admin.clone())
            .await;
        (ledger, admin)
    }

    #[tokio::test]
    async fn issue_assigns_monotonic_cursors() {
        let (ledger, admin) = ledger_with_admin().await;
        let r1 = ledger
            .submit(
                &admin,
                SubmitAction::Issue {
                    certificate: cert("S1", 1, &admin),
                },
            )
            .await
            .unwrap();
        let r2 = ledger
            .submit(
                &admin,
                SubmitAction::Issue {
                    certificate: cert("S2", 1, &admin),
                },
            )
            .await
            .unwrap();
        assert!(r2.cursor > r1.cursor);
    }

    #[tokio::test]
    async fn rejects_version_race() {
        let (ledger, admin) = ledger_with_admin().await;
        ledger
            .submit(
                &admin,
                SubmitAction::Issue {
                    certificate: cert("S1", 1, &admin),
                },
            )
            .await
            .unwrap();

        // A second v1, pre-validated against stale state, loses here.
        let err = ledger
            .submit(
                &admin,
                SubmitAction::Issue {
                    certificate: cert("S1", 1, &admin),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SubmissionRejected(_)));
    }

    #[tokio::test]
    async fn rejects_unauthorized_issuer() {
        let (ledger, admin) = ledger_with_admin().await;
        let stranger = Address::from_public_key_bytes(&[2u8; 32]);
        let err = ledger
            .submit(
                &stranger,
                SubmitAction::Issue {
                    certificate: cert("S1", 1, &admin),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SubmissionRejected(_)));
    }

    #[tokio::test]
    async fn rejects_double_revoke() {
        let (ledger, admin) = ledger_with_admin().await;
        let c = cert("S1", 1, &admin);
        let hash = c.cert_hash.clone();
        ledger
            .submit(&admin, SubmitAction::Issue { certificate: c })
            .await
            .unwrap();
        ledger
            .submit(
                &admin,
                SubmitAction::Revoke {
                    cert_hash: hash.clone(),
                    reason: "fraud".to_string(),
                },
            )
            .await
            .unwrap();
        let err = ledger
            .submit(
                &admin,
                SubmitAction::Revoke {
                    cert_hash: hash,
                    reason: "again".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SubmissionRejected(_)));
    }

    #[tokio::test]
    async fn events_resume_from_cursor() {
        let (ledger, admin) = ledger_with_admin().await;
        ledger
            .submit(
                &admin,
                SubmitAction::Issue {
                    certificate: cert("S1", 1, &admin),
                },
            )
            .await
            .unwrap();

        let all = ledger.events_from(None, 100).await.unwrap();
        assert_eq!(all.len(), 2); // genesis admin + issue

        let tail = ledger
            .events_from(Some(all[0].cursor), 100)
            .await
            .unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].cursor, all[1].cursor);
    }
}
