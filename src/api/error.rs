//! Structured API error responses with error codes.
//!
//! Every endpoint returns the same error shape: a machine-readable code,
//! its numeric form, and a human-readable message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::ledger::{LedgerError, MachineError};
use crate::query::QueryError;
use crate::store::StoreError;

/// Stable error codes for programmatic client handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors (1xxx)
    /// No credentials provided
    AuthRequired,
    /// Invalid or malformed session token
    InvalidToken,
    /// Session token has expired
    TokenExpired,
    /// No outstanding login challenge for the address
    ChallengeNotFound,
    /// The login challenge TTL elapsed before it was used
    ExpiredChallenge,
    /// The login challenge was already used
    ChallengeConsumed,
    /// The signature does not verify against the wallet key
    SignatureMismatch,
    /// Authenticated account lacks the required privilege
    InsufficientPermissions,

    // Validation errors (2xxx)
    /// Request body is malformed
    InvalidRequestBody,
    /// Field value is invalid
    InvalidFieldValue,
    /// Wallet address failed to parse
    InvalidAddress,
    /// Certificate hash failed to parse
    InvalidCertHash,

    // Resource errors (3xxx)
    /// Requested resource not found
    ResourceNotFound,
    /// Certificate not found
    CertificateNotFound,
    /// Subject has no certificates
    SubjectNotFound,
    /// Account not found
    AccountNotFound,

    // Conflict errors (4xxx)
    /// Ledger rejected a pre-validated submission
    ConcurrentModification,
    /// Illegal lifecycle transition
    InvalidStateTransition,
    /// Resource already exists
    AlreadyExists,

    // Infrastructure errors (5xxx)
    /// Database operation failed
    DatabaseError,
    /// Ledger unreachable
    LedgerUnavailable,
    /// Ledger submission timed out
    LedgerTimeout,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::AuthRequired => 1001,
            ErrorCode::InvalidToken => 1002,
            ErrorCode::TokenExpired => 1003,
            ErrorCode::ChallengeNotFound => 1004,
            ErrorCode::ExpiredChallenge => 1005,
            ErrorCode::ChallengeConsumed => 1006,
            ErrorCode::SignatureMismatch => 1007,
            ErrorCode::InsufficientPermissions => 1008,

            ErrorCode::InvalidRequestBody => 2001,
            ErrorCode::InvalidFieldValue => 2002,
            ErrorCode::InvalidAddress => 2003,
            ErrorCode::InvalidCertHash => 2004,

            ErrorCode::ResourceNotFound => 3001,
            ErrorCode::CertificateNotFound => 3002,
            ErrorCode::SubjectNotFound => 3003,
            ErrorCode::AccountNotFound => 3004,

            ErrorCode::ConcurrentModification => 4001,
            ErrorCode::InvalidStateTransition => 4002,
            ErrorCode::AlreadyExists => 4003,

            ErrorCode::DatabaseError => 5001,
            ErrorCode::LedgerUnavailable => 5002,
            ErrorCode::LedgerTimeout => 5003,
            ErrorCode::InternalError => 5999,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorCode::TokenExpired => StatusCode::UNAUTHORIZED,
            ErrorCode::ChallengeNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ExpiredChallenge => StatusCode::GONE,
            ErrorCode::ChallengeConsumed => StatusCode::CONFLICT,
            ErrorCode::SignatureMismatch => StatusCode::UNAUTHORIZED,
            ErrorCode::InsufficientPermissions => StatusCode::FORBIDDEN,

            ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidAddress => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidCertHash => StatusCode::BAD_REQUEST,

            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::CertificateNotFound => StatusCode::NOT_FOUND,
            ErrorCode::SubjectNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AccountNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ConcurrentModification => StatusCode::CONFLICT,
            ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,

            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::LedgerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::LedgerTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code_str = match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::ChallengeNotFound => "CHALLENGE_NOT_FOUND",
            ErrorCode::ExpiredChallenge => "EXPIRED_CHALLENGE",
            ErrorCode::ChallengeConsumed => "CHALLENGE_CONSUMED",
            ErrorCode::SignatureMismatch => "SIGNATURE_MISMATCH",
            ErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::InvalidAddress => "INVALID_ADDRESS",
            ErrorCode::InvalidCertHash => "INVALID_CERT_HASH",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::CertificateNotFound => "CERTIFICATE_NOT_FOUND",
            ErrorCode::SubjectNotFound => "SUBJECT_NOT_FOUND",
            ErrorCode::AccountNotFound => "ACCOUNT_NOT_FOUND",
            ErrorCode::ConcurrentModification => "CONCURRENT_MODIFICATION",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            ErrorCode::LedgerTimeout => "LEDGER_TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", code_str)
    }
}

/// Structured error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                resource_id: None,
            },
        }
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.error.code.to_string();
        let mut response = (status, Json(self)).into_response();

        if let Ok(code_value) = axum::http::HeaderValue::from_str(&code_str) {
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-error-code"),
                code_value,
            );
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let code = match &err {
            AuthError::NoSuchChallenge => ErrorCode::ChallengeNotFound,
            AuthError::ExpiredChallenge => ErrorCode::ExpiredChallenge,
            AuthError::AlreadyConsumed => ErrorCode::ChallengeConsumed,
            AuthError::SignatureMismatch => ErrorCode::SignatureMismatch,
            AuthError::TokenExpired => ErrorCode::TokenExpired,
            AuthError::InvalidToken(_) => ErrorCode::InvalidToken,
            AuthError::MissingAuth => ErrorCode::AuthRequired,
            AuthError::UnknownAccount => ErrorCode::AccountNotFound,
            AuthError::NotAuthorized => ErrorCode::InsufficientPermissions,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<MachineError> for ApiError {
    fn from(err: MachineError) -> Self {
        match err {
            MachineError::Validation(msg) => ApiError::new(ErrorCode::InvalidFieldValue, msg),
            MachineError::Authorization(msg) => {
                ApiError::new(ErrorCode::InsufficientPermissions, msg)
            }
            MachineError::NotFound(what) => {
                ApiError::new(ErrorCode::ResourceNotFound, format!("not found: {what}"))
            }
            MachineError::InvalidTransition(hash, status) => ApiError::new(
                ErrorCode::InvalidStateTransition,
                format!("certificate {hash} is {status:?}"),
            )
            .with_resource_id(hash.to_string()),
            MachineError::ConcurrentModification(msg) => ApiError::new(
                ErrorCode::ConcurrentModification,
                format!("ledger rejected submission: {msg}"),
            ),
            MachineError::Ledger(LedgerError::Timeout) => {
                ApiError::new(ErrorCode::LedgerTimeout, "ledger submission timed out")
            }
            MachineError::Ledger(e) => ApiError::new(ErrorCode::LedgerUnavailable, e.to_string()),
            MachineError::Store(e) => ApiError::from(e),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound(what) => {
                ApiError::new(ErrorCode::ResourceNotFound, format!("not found: {what}"))
            }
            QueryError::Store(e) => ApiError::from(e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => {
                ApiError::new(ErrorCode::DatabaseError, format!("database error: {e}"))
            }
            other => ApiError::new(ErrorCode::InternalError, other.to_string()),
        }
    }
}
