use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_addr: String,
    pub redis_password: Option<String>,
    pub redis_db: i64,
    pub spicedb_endpoint: String,
    pub spicedb_token: String,
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub authz_fail_closed: bool,
    pub debug_key: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = required("DB_POSTGRES_URL")?;
        let redis_addr = required("REDIS_ADDR")?;
        let redis_password = env::var("REDIS_PASSWORD").ok();
        let redis_db = env::var("REDIS_DB")
            .ok()
            .map(|v| v.parse::<i64>())
            .transpose()
            .map_err(|_| AppError::Configuration("REDIS_DB must be an integer".to_string()))?
            .unwrap_or(0);
        let spicedb_endpoint = required("SPICEDB_ENDPOINT")?;
        let spicedb_token = required("SPICEDB_TOKEN")?;
        let jwt_secret = required("JWT_SECRET")?;

        let access_token_ttl = parse_seconds("ACCESS_TOKEN_TTL", 900)?;
        let refresh_token_ttl = parse_seconds("REFRESH_TOKEN_TTL", 30 * 24 * 3600)?;

        let authz_fail_closed = env::var("AUTHZ_FAIL_CLOSED")
            .ok()
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(true);

        let debug_key = env::var("DEBUG_KEY").unwrap_or_else(|_| "dev-only-debug-key".to_string());

        Ok(Self {
            database_url,
            redis_addr,
            redis_password,
            redis_db,
            spicedb_endpoint,
            spicedb_token,
            jwt_secret,
            access_token_ttl,
            refresh_token_ttl,
            authz_fail_closed,
            debug_key,
        })
    }
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::Configuration(format!("{key} must be set")))
}

fn parse_seconds(key: &str, default: u64) -> Result<Duration, AppError> {
    match env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| AppError::Configuration(format!("{key} must be an integer number of seconds"))),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}
