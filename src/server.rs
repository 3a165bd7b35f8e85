//! HTTP server bootstrap.
//!
//! Wires together configuration, the read model store, the ledger client,
//! the background audit indexer, and the axum router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::auth::{
    auth_middleware, AuthLayerState, ChallengeConfig, ChallengeSessionManager, SessionTokenIssuer,
};
use crate::domain::Address;
use crate::indexer::{AuditIndexer, IndexerConfig};
use crate::ledger::{CertificateLedger, InMemoryLedger, LedgerClient};
use crate::query::QueryService;
use crate::render::{CertificateRenderer, TextRenderer};
use crate::store::{MemoryReadModel, PgReadModel, ReadModelStore};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL. Unset means the in-memory read model.
    pub database_url: Option<String>,
    pub listen_addr: SocketAddr,
    pub max_connections: u32,
    pub session_ttl: chrono::Duration,
    pub challenge_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))?;

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let session_ttl_secs: i64 = std::env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3600);
        let challenge_ttl_secs: u64 = std::env::var("CHALLENGE_TTL_SECS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(300);

        Ok(Self {
            database_url,
            listen_addr,
            max_connections,
            session_ttl: chrono::Duration::seconds(session_ttl_secs),
            challenge_ttl: Duration::from_secs(challenge_ttl_secs),
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub machine: Arc<CertificateLedger>,
    pub query: Arc<QueryService>,
    pub store: Arc<dyn ReadModelStore>,
    pub challenges: Arc<ChallengeSessionManager>,
    pub tokens: Arc<SessionTokenIssuer>,
    pub renderer: Arc<dyn CertificateRenderer>,
    pub challenge_ttl: Duration,
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting certledger v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("  Listen address: {}", config.listen_addr);

    let session_secret = std::env::var("SESSION_SECRET")
        .map_err(|_| anyhow::anyhow!("SESSION_SECRET must be set"))?;
    let issuer = std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "certledger".to_string());
    let audience =
        std::env::var("SESSION_AUDIENCE").unwrap_or_else(|_| "certledger-api".to_string());
    let tokens = Arc::new(SessionTokenIssuer::new(
        session_secret.as_bytes(),
        &issuer,
        &audience,
        config.session_ttl,
    ));

    let store: Arc<dyn ReadModelStore> = match &config.database_url {
        Some(url) => {
            info!("Connecting to PostgreSQL...");
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await?;
            info!("Running database migrations...");
            crate::migrations::run_postgres(&pool).await?;
            Arc::new(PgReadModel::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory read model");
            Arc::new(MemoryReadModel::new())
        }
    };

    let ledger: Arc<dyn LedgerClient> = match std::env::var("GENESIS_ADMIN_ADDRESS") {
        Ok(raw) => {
            let admin: Address = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid GENESIS_ADMIN_ADDRESS: {e}"))?;
            info!(address = %admin, "Seeding genesis admin");
            Arc::new(InMemoryLedger::new().with_genesis_admin(admin).await)
        }
        Err(_) => {
            warn!("GENESIS_ADMIN_ADDRESS not set, ledger starts empty");
            Arc::new(InMemoryLedger::new())
        }
    };

    let indexer = Arc::new(AuditIndexer::new(
        IndexerConfig::default(),
        ledger.clone(),
        store.clone(),
    ));
    // Catch up before accepting traffic so reads see existing state.
    indexer.run_until_idle().await?;

    let indexer_task = {
        let indexer = indexer.clone();
        tokio::spawn(async move {
            if let Err(e) = indexer.run().await {
                error!(error = %e, "audit indexer stopped");
            }
        })
    };

    let state = AppState {
        machine: Arc::new(CertificateLedger::new(ledger, store.clone())),
        query: Arc::new(QueryService::new(store.clone())),
        store: store.clone(),
        challenges: Arc::new(ChallengeSessionManager::new(ChallengeConfig {
            ttl: config.challenge_ttl,
        })),
        tokens: tokens.clone(),
        renderer: Arc::new(TextRenderer),
        challenge_ttl: config.challenge_ttl,
    };

    // Challenges are created by unauthenticated callers, so the map must
    // shrink without relying on a later login for the same address.
    let prune_task = {
        let challenges = state.challenges.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            loop {
                tick.tick().await;
                challenges.prune().await;
            }
        })
    };

    let auth_state = AuthLayerState { tokens, store };
    let app = build_router(auth_state)?.with_state(state);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("certledger is ready to accept connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    indexer.stop().await;
    indexer_task.abort();
    prune_task.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install shutdown handler");
    }
    info!("Shutdown signal received");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

fn build_router(auth_state: AuthLayerState) -> anyhow::Result<Router<AppState>> {
    let protected = crate::api::rest::protected_router().layer(
        axum::middleware::from_fn_with_state(auth_state, auth_middleware),
    );

    let mut router = crate::api::rest::public_router()
        .merge(protected)
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }
    Ok(router)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}
