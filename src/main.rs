mod audit;
mod authz;
mod cache;
mod config;
mod credentials;
mod db;
mod error;
mod extractors;
mod handlers;
mod ids;
mod middleware;
mod models;
mod openapi;
mod rebac;
mod repositories;
mod session;
mod startup;
mod sync;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use handlers::MetricsState;

use authz::AuthorizationService;
use cache::{KernelCache, RedisCache};
use rebac::RelationshipEngineClient;
use repositories::{AuditRepository, IdentityRepository, PolicyRepository};
use session::SessionService;
use sync::{IntentRepository, SyncController};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    pub metrics: Arc<MetricsState>,
    pub cache: Arc<dyn KernelCache>,
    pub identity: Arc<IdentityRepository>,
    pub policy: Arc<PolicyRepository>,
    pub audit_repo: Arc<AuditRepository>,
    pub audit: Arc<audit::AuditSink>,
    pub rebac: Arc<RelationshipEngineClient>,
    pub session: Arc<SessionService>,
    pub authz: Arc<AuthorizationService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let use_json = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()) == "json";

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,aaa_kernel=debug,tower_http=debug".into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("configuration error: {}", e);
        e
    })?;

    let db = db::create_pool(&config.database_url).await.map_err(|e| {
        tracing::error!("failed to create database pool: {}", e);
        e
    })?;
    tracing::info!("database pool created successfully");

    let metrics_state = Arc::new(handlers::setup_metrics_recorder());
    tracing::info!("metrics recorder initialized");

    let cache: Arc<dyn KernelCache> = Arc::new(
        RedisCache::connect(&config.redis_addr, config.redis_password.as_deref(), config.redis_db)
            .await
            .map_err(|e| {
                tracing::error!("failed to connect to redis: {}", e);
                e
            })?,
    );
    tracing::info!("connected to shared cache");

    let identity = Arc::new(IdentityRepository::new(db.clone()));
    let intents = Arc::new(IntentRepository::new(db.clone()));
    let policy = Arc::new(PolicyRepository::new(db.clone(), cache.clone(), intents.clone()));
    let audit_repo = Arc::new(AuditRepository::new(db.clone()));
    let audit_sink = Arc::new(audit::AuditSink::spawn(audit_repo.clone()));

    let rebac_client = Arc::new(
        RelationshipEngineClient::connect(&config.spicedb_endpoint, &config.spicedb_token)
            .await
            .map_err(|e| {
                tracing::error!("failed to connect to relationship engine: {}", e);
                e
            })?,
    );
    tracing::info!("connected to relationship engine");

    let session = Arc::new(SessionService::new(
        identity.clone(),
        policy.clone(),
        audit_repo.clone(),
        audit_sink.clone(),
        cache.clone(),
        config.jwt_secret.clone(),
        config.access_token_ttl,
        config.refresh_token_ttl,
    ));

    let authz_service = Arc::new(AuthorizationService::new(
        policy.clone(),
        rebac_client.clone(),
        cache.clone(),
        audit_repo.clone(),
        audit_sink.clone(),
        intents.clone(),
        config.authz_fail_closed,
    ));

    let state = Arc::new(AppState {
        db: db.clone(),
        config,
        metrics: metrics_state,
        cache,
        identity,
        policy,
        audit_repo: audit_repo.clone(),
        audit: audit_sink,
        rebac: rebac_client.clone(),
        session,
        authz: authz_service,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_controller = SyncController::new(intents, rebac_client, shutdown_rx);
    let sync_handle = tokio::spawn(sync_controller.run());

    let app = startup::build_router(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = sync_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
