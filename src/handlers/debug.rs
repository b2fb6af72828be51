use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;

use crate::AppState;

#[derive(Serialize)]
pub struct DebugInfo {
    pub version: String,
    pub git_sha: String,
    pub environment: String,
    pub uptime_seconds: u64,
    pub database_status: String,
    pub database_connections: u32,
    pub cache_status: String,
    pub relationship_engine_status: String,
    pub timestamp: u64,
}

static START_TIME: once_cell::sync::Lazy<SystemTime> = once_cell::sync::Lazy::new(SystemTime::now);

/// Handler for the /debug endpoint, gated by `require_debug_key`.
pub async fn debug_handler(State(state): State<Arc<AppState>>) -> Json<DebugInfo> {
    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => "connected".to_string(),
        Err(e) => format!("error: {e}"),
    };

    let cache_status = match state.cache.get("debug:ping").await {
        Ok(_) => "connected".to_string(),
        Err(e) => format!("error: {e}"),
    };

    let rebac_status = match state.rebac.read_schema().await {
        Ok(_) => "connected".to_string(),
        Err(e) => format!("error: {e}"),
    };

    let pool_size = state.db.size();
    let uptime = START_TIME.elapsed().unwrap_or_default().as_secs();

    Json(DebugInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: option_env!("GIT_SHA").unwrap_or("unknown").to_string(),
        environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        uptime_seconds: uptime,
        database_status: db_status,
        database_connections: pool_size,
        cache_status,
        relationship_engine_status: rebac_status,
        timestamp: SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs(),
    })
}
