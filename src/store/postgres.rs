//! PostgreSQL read model implementation.
//!
//! `apply` runs dedup check, projection update, audit append, and cursor
//! advance inside one database transaction, so a crash between any two of
//! them cannot drop or duplicate an entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use crate::crypto::canonical_json_hash;
use crate::domain::{
    Account, Address, AuditAction, AuditLogEntry, CertHash, Certificate, CertificateAttributes,
    CredentialValue, EventCursor, LedgerAction, LedgerEvent, TxId,
};

use super::{ApplyOutcome, AuditFilter, ReadModelStore, StoreError};

/// PostgreSQL-backed read model.
pub struct PgReadModel {
    pool: PgPool,
}

impl PgReadModel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create from connection string.
    pub async fn from_url(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct AccountRow {
    address: String,
    display_name: String,
    email: String,
    is_admin: bool,
    is_authorized: bool,
    registered_at: DateTime<Utc>,
}

impl AccountRow {
    fn decode(self) -> Result<Account, StoreError> {
        Ok(Account {
            address: Address::parse(&self.address)
                .map_err(|e| StoreError::Internal(format!("bad stored address: {e}")))?,
            display_name: self.display_name,
            email: self.email,
            is_admin: self.is_admin,
            is_authorized: self.is_authorized,
            registered_at: self.registered_at,
        })
    }
}

#[derive(FromRow)]
struct CertificateRow {
    cert_hash: String,
    subject_id: String,
    version: i64,
    subject_name: String,
    program: String,
    credential_value: i64,
    issuing_authority: String,
    issuer_address: String,
    issuance_time: DateTime<Utc>,
    is_revoked: bool,
    revocation_reason: Option<String>,
}

impl CertificateRow {
    fn decode(self) -> Result<Certificate, StoreError> {
        Ok(Certificate {
            subject_id: self.subject_id,
            version: self.version as u32,
            attributes: CertificateAttributes {
                subject_name: self.subject_name,
                program: self.program,
                credential_value: CredentialValue::from_scaled(self.credential_value),
                issuing_authority: self.issuing_authority,
            },
            issuer_address: Address::parse(&self.issuer_address)
                .map_err(|e| StoreError::Internal(format!("bad stored address: {e}")))?,
            issuance_time: self.issuance_time,
            cert_hash: CertHash::parse(&self.cert_hash)
                .map_err(|e| StoreError::Internal(format!("bad stored cert hash: {e}")))?,
            is_revoked: self.is_revoked,
            revocation_reason: self.revocation_reason,
        })
    }
}

#[derive(FromRow)]
struct AuditRow {
    cert_hash: String,
    action: String,
    actor_address: String,
    reason: Option<String>,
    occurred_at: DateTime<Utc>,
    tx_id: Uuid,
    sequence: i64,
}

impl AuditRow {
    fn decode(self) -> Result<AuditLogEntry, StoreError> {
        Ok(AuditLogEntry {
            cert_hash: CertHash::parse(&self.cert_hash)
                .map_err(|e| StoreError::Internal(format!("bad stored cert hash: {e}")))?,
            action: AuditAction::from_str_opt(&self.action)
                .ok_or_else(|| StoreError::Internal(format!("bad stored action: {}", self.action)))?,
            actor_address: Address::parse(&self.actor_address)
                .map_err(|e| StoreError::Internal(format!("bad stored address: {e}")))?,
            reason: self.reason,
            timestamp: self.occurred_at,
            tx_id: TxId(self.tx_id),
            sequence: EventCursor(self.sequence as u64),
        })
    }
}

fn fingerprint_bytes(event: &LedgerEvent) -> Result<Vec<u8>, StoreError> {
    let value = serde_json::to_value(event)
        .map_err(|e| StoreError::Internal(format!("unserializable event: {e}")))?;
    Ok(canonical_json_hash(&value).to_vec())
}

#[async_trait]
impl ReadModelStore for PgReadModel {
    async fn apply(&self, event: &LedgerEvent) -> Result<ApplyOutcome, StoreError> {
        let fingerprint = fingerprint_bytes(event)?;
        let mut tx = self.pool.begin().await?;

        let existing: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT fingerprint FROM applied_tx WHERE tx_id = $1")
                .bind(event.tx_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(existing) = existing {
            if existing == fingerprint {
                return Ok(ApplyOutcome::Duplicate);
            }
            return Err(StoreError::ConsistencyViolation(format!(
                "transaction {} replayed with conflicting payload",
                event.tx_id
            )));
        }

        match &event.action {
            LedgerAction::AccountRegistered {
                address,
                display_name,
                email,
                is_admin,
            } => {
                let exists: Option<i32> =
                    sqlx::query_scalar("SELECT 1 FROM accounts WHERE address = $1")
                        .bind(address.as_str())
                        .fetch_optional(&mut *tx)
                        .await?;
                if exists.is_some() {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "duplicate registration for account {address}"
                    )));
                }
                sqlx::query(
                    r#"
                    INSERT INTO accounts
                        (address, display_name, email, is_admin, is_authorized, registered_at)
                    VALUES ($1, $2, $3, $4, TRUE, $5)
                    "#,
                )
                .bind(address.as_str())
                .bind(display_name)
                .bind(email)
                .bind(is_admin)
                .bind(event.timestamp)
                .execute(&mut *tx)
                .await?;
            }
            LedgerAction::AccountAuthorizationSet {
                address,
                authorized,
            } => {
                let updated =
                    sqlx::query("UPDATE accounts SET is_authorized = $2 WHERE address = $1")
                        .bind(address.as_str())
                        .bind(authorized)
                        .execute(&mut *tx)
                        .await?;
                if updated.rows_affected() == 0 {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "authorization change for unknown account {address}"
                    )));
                }
            }
            LedgerAction::CertificateIssued { certificate } => {
                let count: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM certificates WHERE subject_id = $1")
                        .bind(&certificate.subject_id)
                        .fetch_one(&mut *tx)
                        .await?;
                let expected = count as u32 + 1;
                if certificate.version != expected {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "version gap for subject {}: expected v{}, got v{}",
                        certificate.subject_id, expected, certificate.version
                    )));
                }
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO certificates (
                        cert_hash, subject_id, version,
                        subject_name, program, credential_value, issuing_authority,
                        issuer_address, issuance_time, is_revoked, revocation_reason
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, NULL)
                    ON CONFLICT (cert_hash) DO NOTHING
                    "#,
                )
                .bind(certificate.cert_hash.as_str())
                .bind(&certificate.subject_id)
                .bind(certificate.version as i64)
                .bind(&certificate.attributes.subject_name)
                .bind(&certificate.attributes.program)
                .bind(certificate.attributes.credential_value.scaled())
                .bind(&certificate.attributes.issuing_authority)
                .bind(certificate.issuer_address.as_str())
                .bind(certificate.issuance_time)
                .execute(&mut *tx)
                .await?;
                if inserted.rows_affected() == 0 {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "duplicate certificate hash {}",
                        certificate.cert_hash
                    )));
                }
            }
            LedgerAction::CertificateRevoked { cert_hash, reason } => {
                let updated = sqlx::query(
                    r#"
                    UPDATE certificates
                    SET is_revoked = TRUE, revocation_reason = $2
                    WHERE cert_hash = $1 AND is_revoked = FALSE
                    "#,
                )
                .bind(cert_hash.as_str())
                .bind(reason)
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "revoke for unknown or already-revoked certificate {cert_hash}"
                    )));
                }
            }
            LedgerAction::CertificateReactivated { cert_hash } => {
                let updated = sqlx::query(
                    r#"
                    UPDATE certificates
                    SET is_revoked = FALSE, revocation_reason = NULL
                    WHERE cert_hash = $1 AND is_revoked = TRUE
                    "#,
                )
                .bind(cert_hash.as_str())
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "reactivate for unknown or active certificate {cert_hash}"
                    )));
                }
            }
        }

        if let (Some(action), Some(cert_hash)) = (event.audit_action(), event.cert_hash()) {
            sqlx::query(
                r#"
                INSERT INTO audit_log
                    (cert_hash, action, actor_address, reason, occurred_at, tx_id, sequence)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(cert_hash.as_str())
            .bind(action.as_str())
            .bind(event.actor_address.as_str())
            .bind(event.reason())
            .bind(event.timestamp)
            .bind(event.tx_id.0)
            .bind(event.cursor.0 as i64)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("INSERT INTO applied_tx (tx_id, fingerprint) VALUES ($1, $2)")
            .bind(event.tx_id.0)
            .bind(&fingerprint)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO indexer_cursor (id, last_cursor) VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE
            SET last_cursor = GREATEST(indexer_cursor.last_cursor, EXCLUDED.last_cursor)
            "#,
        )
        .bind(event.cursor.0 as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ApplyOutcome::Applied)
    }

    async fn last_cursor(&self) -> Result<Option<EventCursor>, StoreError> {
        let cursor: Option<i64> =
            sqlx::query_scalar("SELECT last_cursor FROM indexer_cursor WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(cursor.map(|c| EventCursor(c as u64)))
    }

    async fn account(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT address, display_name, email, is_admin, is_authorized, registered_at
            FROM accounts WHERE address = $1
            "#,
        )
        .bind(address.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(AccountRow::decode).transpose()
    }

    async fn certificate(&self, cert_hash: &CertHash) -> Result<Option<Certificate>, StoreError> {
        let row: Option<CertificateRow> = sqlx::query_as(
            r#"
            SELECT cert_hash, subject_id, version, subject_name, program,
                   credential_value, issuing_authority, issuer_address,
                   issuance_time, is_revoked, revocation_reason
            FROM certificates WHERE cert_hash = $1
            "#,
        )
        .bind(cert_hash.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(CertificateRow::decode).transpose()
    }

    async fn current_certificate(
        &self,
        subject_id: &str,
    ) -> Result<Option<Certificate>, StoreError> {
        let row: Option<CertificateRow> = sqlx::query_as(
            r#"
            SELECT cert_hash, subject_id, version, subject_name, program,
                   credential_value, issuing_authority, issuer_address,
                   issuance_time, is_revoked, revocation_reason
            FROM certificates WHERE subject_id = $1
            ORDER BY version DESC LIMIT 1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CertificateRow::decode).transpose()
    }

    async fn history(&self, subject_id: &str) -> Result<Vec<Certificate>, StoreError> {
        let rows: Vec<CertificateRow> = sqlx::query_as(
            r#"
            SELECT cert_hash, subject_id, version, subject_name, program,
                   credential_value, issuing_authority, issuer_address,
                   issuance_time, is_revoked, revocation_reason
            FROM certificates WHERE subject_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CertificateRow::decode).collect()
    }

    async fn list_audit(
        &self,
        filter: &AuditFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<AuditLogEntry>, u64), StoreError> {
        let (where_clause, bind_value): (&str, Option<String>) = match filter {
            AuditFilter::All => ("", None),
            AuditFilter::CertHash(hash) => {
                ("WHERE cert_hash = $1", Some(hash.as_str().to_string()))
            }
            AuditFilter::Actor(address) => {
                ("WHERE actor_address = $1", Some(address.as_str().to_string()))
            }
        };

        let count_sql = format!("SELECT COUNT(*) FROM audit_log {where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(v) = &bind_value {
            count_query = count_query.bind(v.clone());
        }
        let total = count_query.fetch_one(&self.pool).await? as u64;

        // Placeholder numbering shifts by one when the filter binds a value.
        let limit_params = if bind_value.is_some() {
            "LIMIT $3 OFFSET $2"
        } else {
            "LIMIT $2 OFFSET $1"
        };
        let rows_sql = format!(
            r#"
            SELECT cert_hash, action, actor_address, reason, occurred_at, tx_id, sequence
            FROM audit_log {where_clause}
            ORDER BY occurred_at ASC, sequence ASC, tx_id ASC
            {limit_params}
            "#
        );
        let mut rows_query = sqlx::query_as::<_, AuditRow>(&rows_sql);
        if let Some(v) = &bind_value {
            rows_query = rows_query.bind(v.clone());
        }
        let rows = rows_query
            .bind(offset as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .into_iter()
            .map(AuditRow::decode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((entries, total))
    }
}
