//! REST API integration tests over the in-memory stack.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use certledger::auth::{
    auth_middleware, AuthLayerState, ChallengeConfig, ChallengeSessionManager, SessionTokenIssuer,
};
use certledger::crypto::WalletKey;
use certledger::indexer::{AuditIndexer, IndexerConfig};
use certledger::ledger::{CertificateLedger, InMemoryLedger};
use certledger::query::QueryService;
use certledger::render::TextRenderer;
use certledger::server::AppState;
use certledger::store::MemoryReadModel;

struct TestApp {
    app: Router,
    indexer: Arc<AuditIndexer>,
    admin_key: WalletKey,
}

async fn test_app(challenge_ttl: Duration) -> TestApp {
    let admin_key = WalletKey::generate();
    let ledger = Arc::new(
        InMemoryLedger::new()
            .with_genesis_admin(admin_key.address())
            .await,
    );
    let store = Arc::new(MemoryReadModel::new());
    let indexer = Arc::new(AuditIndexer::new(
        IndexerConfig::default(),
        ledger.clone(),
        store.clone(),
    ));
    indexer.run_until_idle().await.unwrap();

    let tokens = Arc::new(SessionTokenIssuer::new(
        b"test-session-secret",
        "certledger",
        "certledger-api",
        chrono::Duration::hours(1),
    ));
    let state = AppState {
        machine: Arc::new(CertificateLedger::new(ledger, store.clone())),
        query: Arc::new(QueryService::new(store.clone())),
        store: store.clone(),
        challenges: Arc::new(ChallengeSessionManager::new(ChallengeConfig {
            ttl: challenge_ttl,
        })),
        tokens: tokens.clone(),
        renderer: Arc::new(TextRenderer),
        challenge_ttl,
    };
    let auth_state = AuthLayerState {
        tokens,
        store: store.clone(),
    };

    let protected = certledger::api::rest::protected_router().layer(
        axum::middleware::from_fn_with_state(auth_state, auth_middleware),
    );
    let app = certledger::api::rest::public_router()
        .merge(protected)
        .with_state(state);

    TestApp {
        app,
        indexer,
        admin_key,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn login(app: &Router, key: &WalletKey) -> String {
    let address = key.address().to_string();
    let (status, body) = send(
        app,
        post_json("/auth/challenge", json!({ "address": address })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let challenge = body["challenge"].as_str().unwrap().to_string();

    let signature = key.sign_hex(challenge.as_bytes());
    let (status, body) = send(
        app,
        post_json(
            "/auth/login",
            json!({ "address": address, "signature": signature }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn login_and_issue_certificate() {
    let t = test_app(Duration::from_secs(300)).await;
    let token = login(&t.app, &t.admin_key).await;

    let (status, body) = send(
        &t.app,
        authed(
            Method::POST,
            "/v1/certificates",
            &token,
            Some(json!({
                "subject_id": "student-1",
                "subject_name": "Ada Lovelace",
                "program": "Mathematics",
                "credential_value": "3.85",
                "issuing_authority": "Analytical Engine Institute"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["certificate"]["version"], 1);
    assert_eq!(body["certificate"]["credential_value"], "3.85");
    let cert_hash = body["certificate"]["cert_hash"].as_str().unwrap().to_string();

    t.indexer.run_until_idle().await.unwrap();

    let (status, body) = send(
        &t.app,
        authed(
            Method::GET,
            &format!("/v1/certificates/{cert_hash}"),
            &token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ACTIVE");

    let (status, body) = send(
        &t.app,
        authed(
            Method::GET,
            &format!("/v1/audit/certificate/{cert_hash}"),
            &token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total_count"], 1);
    assert_eq!(body["data"][0]["action"], "ISSUED");
}

#[tokio::test]
async fn revoke_flow_over_http() {
    let t = test_app(Duration::from_secs(300)).await;
    let token = login(&t.app, &t.admin_key).await;

    let (_, body) = send(
        &t.app,
        authed(
            Method::POST,
            "/v1/certificates",
            &token,
            Some(json!({
                "subject_id": "student-1",
                "subject_name": "Ada",
                "program": "Math",
                "credential_value": "4",
                "issuing_authority": "Institute"
            })),
        ),
    )
    .await;
    let cert_hash = body["certificate"]["cert_hash"].as_str().unwrap().to_string();
    t.indexer.run_until_idle().await.unwrap();

    let (status, _) = send(
        &t.app,
        authed(
            Method::POST,
            &format!("/v1/certificates/{cert_hash}/revoke"),
            &token,
            Some(json!({ "reason": "issued in error" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    t.indexer.run_until_idle().await.unwrap();

    let (status, body) = send(
        &t.app,
        authed(Method::GET, "/v1/subjects/student-1/status", &token, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REVOKED");
    assert_eq!(body["revocation_reason"], "issued in error");

    // Empty reason is rejected up front
    let (status, body) = send(
        &t.app,
        authed(
            Method::POST,
            &format!("/v1/certificates/{cert_hash}/revoke"),
            &token,
            Some(json!({ "reason": "" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FIELD_VALUE");
}

#[tokio::test]
async fn consumed_challenge_cannot_be_replayed() {
    let t = test_app(Duration::from_secs(300)).await;
    let address = t.admin_key.address().to_string();

    let (_, body) = send(
        &t.app,
        post_json("/auth/challenge", json!({ "address": address })),
    )
    .await;
    let challenge = body["challenge"].as_str().unwrap();
    let signature = t.admin_key.sign_hex(challenge.as_bytes());

    let (status, _) = send(
        &t.app,
        post_json(
            "/auth/login",
            json!({ "address": address, "signature": signature }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &t.app,
        post_json(
            "/auth/login",
            json!({ "address": address, "signature": signature }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CHALLENGE_CONSUMED");
}

#[tokio::test]
async fn wrong_key_login_is_unauthorized() {
    let t = test_app(Duration::from_secs(300)).await;
    let address = t.admin_key.address().to_string();
    let stranger = WalletKey::generate();

    let (_, body) = send(
        &t.app,
        post_json("/auth/challenge", json!({ "address": address })),
    )
    .await;
    let challenge = body["challenge"].as_str().unwrap();
    let signature = stranger.sign_hex(challenge.as_bytes());

    let (status, body) = send(
        &t.app,
        post_json(
            "/auth/login",
            json!({ "address": address, "signature": signature }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "SIGNATURE_MISMATCH");
}

#[tokio::test]
async fn expired_challenge_is_gone() {
    let t = test_app(Duration::from_secs(0)).await;
    let address = t.admin_key.address().to_string();

    let (_, body) = send(
        &t.app,
        post_json("/auth/challenge", json!({ "address": address })),
    )
    .await;
    let challenge = body["challenge"].as_str().unwrap();
    let signature = t.admin_key.sign_hex(challenge.as_bytes());

    let (status, body) = send(
        &t.app,
        post_json(
            "/auth/login",
            json!({ "address": address, "signature": signature }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["code"], "EXPIRED_CHALLENGE");
}

#[tokio::test]
async fn admin_audit_is_admin_only() {
    let t = test_app(Duration::from_secs(300)).await;
    let admin_token = login(&t.app, &t.admin_key).await;

    // Register a plain issuer account and log in with it
    let issuer_key = WalletKey::generate();
    let (status, _) = send(
        &t.app,
        authed(
            Method::POST,
            "/v1/accounts",
            &admin_token,
            Some(json!({
                "address": issuer_key.address().to_string(),
                "display_name": "Issuer",
                "email": "issuer@example.org",
                "is_admin": false
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    t.indexer.run_until_idle().await.unwrap();

    let issuer_token = login(&t.app, &issuer_key).await;

    let (status, _) = send(
        &t.app,
        authed(Method::GET, "/v1/audit", &admin_token, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &t.app,
        authed(Method::GET, "/v1/audit", &issuer_token, None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let t = test_app(Duration::from_secs(300)).await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/subjects/student-1/status")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rendered_certificate_is_plain_text() {
    let t = test_app(Duration::from_secs(300)).await;
    let token = login(&t.app, &t.admin_key).await;

    let (_, body) = send(
        &t.app,
        authed(
            Method::POST,
            "/v1/certificates",
            &token,
            Some(json!({
                "subject_id": "student-1",
                "subject_name": "Ada Lovelace",
                "program": "Mathematics",
                "credential_value": "3.85",
                "issuing_authority": "Institute"
            })),
        ),
    )
    .await;
    let cert_hash = body["certificate"]["cert_hash"].as_str().unwrap().to_string();
    t.indexer.run_until_idle().await.unwrap();

    let response = t
        .app
        .clone()
        .oneshot(authed(
            Method::GET,
            &format!("/v1/certificates/{cert_hash}/render"),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("Ada Lovelace"));
    assert!(text.contains("ACTIVE"));
}

#[tokio::test]
async fn health_body_is_status_only() {
    let t = test_app(Duration::from_secs(300)).await;

    let (status, body) = send(
        &t.app,
        Request::builder()
            .method(Method::GET)
            .uri("/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, body) = send(
        &t.app,
        Request::builder()
            .method(Method::GET)
            .uri("/ready")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert!(body["last_cursor"].as_u64().is_some());
}
