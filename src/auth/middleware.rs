//! Session authentication middleware for axum.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::store::ReadModelStore;

use super::{AuthContext, AuthError, SessionTokenIssuer};

/// Authenticated request identity, available as a request extension on
/// every route behind [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct Authenticated(pub AuthContext);

/// State for the auth middleware.
#[derive(Clone)]
pub struct AuthLayerState {
    pub tokens: Arc<SessionTokenIssuer>,
    pub store: Arc<dyn ReadModelStore>,
}

/// Validates the bearer token and resolves the account behind it.
///
/// The account row is fetched fresh on every request so that a
/// deauthorized account is cut off as soon as the indexer has applied the
/// change, regardless of how long its token remains cryptographically
/// valid.
pub async fn auth_middleware(
    State(state): State<AuthLayerState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match bearer_token(&request) {
        Some(token) => token,
        None => return auth_error_response(AuthError::MissingAuth),
    };

    let address = match state.tokens.validate(token) {
        Ok(address) => address,
        Err(e) => return auth_error_response(e),
    };

    let account = match state.store.account(&address).await {
        Ok(Some(account)) => account,
        Ok(None) => return auth_error_response(AuthError::UnknownAccount),
        Err(e) => {
            tracing::error!(error = %e, "account lookup failed during auth");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response();
        }
    };

    request.extensions_mut().insert(Authenticated(AuthContext {
        address: account.address,
        is_admin: account.is_admin,
        is_authorized: account.is_authorized,
    }));
    next.run(request).await
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn auth_error_response(error: AuthError) -> Response {
    let status = match &error {
        AuthError::MissingAuth
        | AuthError::TokenExpired
        | AuthError::InvalidToken(_)
        | AuthError::SignatureMismatch
        | AuthError::UnknownAccount => StatusCode::UNAUTHORIZED,
        AuthError::NotAuthorized => StatusCode::FORBIDDEN,
        AuthError::NoSuchChallenge => StatusCode::NOT_FOUND,
        AuthError::ExpiredChallenge => StatusCode::GONE,
        AuthError::AlreadyConsumed => StatusCode::CONFLICT,
    };
    (
        status,
        axum::Json(serde_json::json!({ "error": error.to_string() })),
    )
        .into_response()
}
