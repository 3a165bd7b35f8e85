//! REST API endpoints.

use axum::extract::{Extension, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::auth::Authenticated;
use crate::domain::{Address, CertHash, CertificateAttributes, CredentialValue};
use crate::query::{Page, PageRequest};
use crate::server::AppState;
use crate::store::AuditFilter;

use super::error::{ApiError, ErrorCode};
use super::types::{
    AccountResponse, AuditEntryResponse, ChallengeRequest, ChallengeResponse, HealthResponse,
    IssueCertificateRequest, IssueCertificateResponse, LoginRequest, LoginResponse, PageQuery,
    RegisterAccountRequest, RevokeRequest, SetAuthorizationRequest, TxReceiptResponse,
};

/// Routes that require no session.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/challenge", post(create_challenge))
        .route("/auth/login", post(login))
        .route("/health", get(health))
        .route("/ready", get(ready))
}

/// Routes behind the session middleware.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/v1/certificates", post(issue_certificate))
        .route("/v1/certificates/:cert_hash", get(get_certificate))
        .route("/v1/certificates/:cert_hash/render", get(render_certificate))
        .route("/v1/certificates/:cert_hash/revoke", post(revoke_certificate))
        .route(
            "/v1/certificates/:cert_hash/reactivate",
            post(reactivate_certificate),
        )
        .route("/v1/subjects/:subject_id/status", get(subject_status))
        .route("/v1/subjects/:subject_id/history", get(subject_history))
        .route("/v1/audit", get(list_all_audit))
        .route("/v1/audit/certificate/:cert_hash", get(certificate_audit))
        .route("/v1/audit/user/:address", get(user_audit))
        .route("/v1/accounts", post(register_account))
        .route("/v1/accounts/:address", get(get_account))
        .route(
            "/v1/accounts/:address/authorization",
            post(set_authorization),
        )
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse::<Address>()
        .map_err(|e| ApiError::new(ErrorCode::InvalidAddress, e.to_string()))
}

fn parse_cert_hash(raw: &str) -> Result<CertHash, ApiError> {
    CertHash::parse(raw).map_err(|e| ApiError::new(ErrorCode::InvalidCertHash, e.to_string()))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

async fn create_challenge(
    State(state): State<AppState>,
    Json(body): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let address = parse_address(&body.address)?;
    let challenge = state.challenges.create_challenge(&address).await;
    Ok(Json(ChallengeResponse {
        address,
        challenge,
        expires_in_secs: state.challenge_ttl.as_secs(),
    }))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let address = parse_address(&body.address)?;
    state
        .challenges
        .verify_and_consume(&address, &body.signature)
        .await?;

    // Possession of the key is proven; the account must still exist.
    let account = state
        .store
        .account(&address)
        .await?
        .ok_or_else(|| ApiError::new(ErrorCode::AccountNotFound, "account not registered"))?;

    let token = state.tokens.issue(&account.address)?;
    Ok(Json(LoginResponse {
        token,
        address: account.address,
        is_admin: account.is_admin,
    }))
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

async fn issue_certificate(
    State(state): State<AppState>,
    Extension(Authenticated(auth)): Extension<Authenticated>,
    Json(body): Json<IssueCertificateRequest>,
) -> Result<(StatusCode, Json<IssueCertificateResponse>), ApiError> {
    let credential_value = body
        .credential_value
        .parse::<CredentialValue>()
        .map_err(|e| ApiError::new(ErrorCode::InvalidFieldValue, e.to_string()))?;
    let attributes = CertificateAttributes {
        subject_name: body.subject_name,
        program: body.program,
        credential_value,
        issuing_authority: body.issuing_authority,
    };

    let (certificate, receipt) = state
        .machine
        .issue(&auth.address, &body.subject_id, attributes)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(IssueCertificateResponse {
            certificate: certificate.into(),
            receipt: receipt.into(),
        }),
    ))
}

async fn get_certificate(
    State(state): State<AppState>,
    Path(cert_hash): Path<String>,
) -> Result<Response, ApiError> {
    let hash = parse_cert_hash(&cert_hash)?;
    let cert = state.query.certificate(&hash).await.map_err(|e| match e {
        crate::query::QueryError::NotFound(_) => {
            ApiError::new(ErrorCode::CertificateNotFound, "certificate not found")
                .with_resource_id(cert_hash.clone())
        }
        other => other.into(),
    })?;
    Ok(Json(super::types::CertificateResponse::from(cert)).into_response())
}

async fn render_certificate(
    State(state): State<AppState>,
    Path(cert_hash): Path<String>,
) -> Result<Response, ApiError> {
    let hash = parse_cert_hash(&cert_hash)?;
    let cert = state.query.certificate(&hash).await.map_err(|e| match e {
        crate::query::QueryError::NotFound(_) => {
            ApiError::new(ErrorCode::CertificateNotFound, "certificate not found")
                .with_resource_id(cert_hash.clone())
        }
        other => other.into(),
    })?;
    let rendered = state.renderer.render(&cert);
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        rendered,
    )
        .into_response())
}

async fn revoke_certificate(
    State(state): State<AppState>,
    Extension(Authenticated(auth)): Extension<Authenticated>,
    Path(cert_hash): Path<String>,
    Json(body): Json<RevokeRequest>,
) -> Result<Json<TxReceiptResponse>, ApiError> {
    let hash = parse_cert_hash(&cert_hash)?;
    let receipt = state.machine.revoke(&auth.address, &hash, &body.reason).await?;
    Ok(Json(receipt.into()))
}

async fn reactivate_certificate(
    State(state): State<AppState>,
    Extension(Authenticated(auth)): Extension<Authenticated>,
    Path(cert_hash): Path<String>,
) -> Result<Json<TxReceiptResponse>, ApiError> {
    let hash = parse_cert_hash(&cert_hash)?;
    let receipt = state.machine.reactivate(&auth.address, &hash).await?;
    Ok(Json(receipt.into()))
}

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

async fn subject_status(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<super::types::CertificateResponse>, ApiError> {
    let cert = state
        .query
        .current_status(&subject_id)
        .await
        .map_err(|e| match e {
            crate::query::QueryError::NotFound(_) => {
                ApiError::new(ErrorCode::SubjectNotFound, "no certificates for subject")
                    .with_resource_id(subject_id.clone())
            }
            other => other.into(),
        })?;
    Ok(Json(cert.into()))
}

async fn subject_history(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<Vec<super::types::CertificateResponse>>, ApiError> {
    let history = state.query.history(&subject_id).await.map_err(|e| match e {
        crate::query::QueryError::NotFound(_) => {
            ApiError::new(ErrorCode::SubjectNotFound, "no certificates for subject")
                .with_resource_id(subject_id.clone())
        }
        other => other.into(),
    })?;
    Ok(Json(history.into_iter().map(Into::into).collect()))
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

fn audit_page(page: Page<crate::domain::AuditLogEntry>) -> Json<serde_json::Value> {
    let data: Vec<AuditEntryResponse> = page.data.into_iter().map(Into::into).collect();
    Json(serde_json::json!({ "data": data, "meta": page.meta }))
}

async fn list_all_audit(
    State(state): State<AppState>,
    Extension(Authenticated(auth)): Extension<Authenticated>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth.require_admin()?;
    let page = state
        .query
        .list_audit(
            &AuditFilter::All,
            PageRequest::new(query.page, query.page_size),
        )
        .await?;
    Ok(audit_page(page))
}

async fn certificate_audit(
    State(state): State<AppState>,
    Path(cert_hash): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hash = parse_cert_hash(&cert_hash)?;
    let page = state
        .query
        .certificate_audit(&hash, PageRequest::new(query.page, query.page_size))
        .await?;
    Ok(audit_page(page))
}

async fn user_audit(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = parse_address(&address)?;
    let page = state
        .query
        .account_audit(&address, PageRequest::new(query.page, query.page_size))
        .await?;
    Ok(audit_page(page))
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

async fn register_account(
    State(state): State<AppState>,
    Extension(Authenticated(auth)): Extension<Authenticated>,
    Json(body): Json<RegisterAccountRequest>,
) -> Result<(StatusCode, Json<TxReceiptResponse>), ApiError> {
    auth.require_admin()?;
    let address = parse_address(&body.address)?;
    let receipt = state
        .machine
        .register_account(
            &auth.address,
            address,
            body.display_name,
            body.email,
            body.is_admin,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

async fn get_account(
    State(state): State<AppState>,
    Extension(Authenticated(auth)): Extension<Authenticated>,
    Path(address): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = parse_address(&address)?;
    // Accounts are visible to admins and to their owner.
    if !auth.is_admin && auth.address != address {
        return Err(ApiError::new(
            ErrorCode::InsufficientPermissions,
            "not allowed to view this account",
        ));
    }
    let account = state
        .store
        .account(&address)
        .await?
        .ok_or_else(|| {
            ApiError::new(ErrorCode::AccountNotFound, "account not found")
                .with_resource_id(address.to_string())
        })?;
    Ok(Json(account.into()))
}

async fn set_authorization(
    State(state): State<AppState>,
    Extension(Authenticated(auth)): Extension<Authenticated>,
    Path(address): Path<String>,
    Json(body): Json<SetAuthorizationRequest>,
) -> Result<Json<TxReceiptResponse>, ApiError> {
    auth.require_admin()?;
    let address = parse_address(&address)?;
    let receipt = state
        .machine
        .set_authorization(&auth.address, &address, body.authorized)
        .await?;
    Ok(Json(receipt.into()))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        last_cursor: None,
    })
}

/// Ready once the read model has applied at least one event.
async fn ready(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let cursor = state.store.last_cursor().await?;
    Ok(Json(HealthResponse {
        status: if cursor.is_some() { "ready" } else { "catching-up" },
        last_cursor: cursor.map(|c| c.0),
    }))
}
