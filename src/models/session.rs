use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// §4.7 JWT claims carried on access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub username: Option<String>,
    pub status: String,
    pub is_validated: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// §4.7: opaque refresh tokens are random strings, fingerprinted in the
/// shared cache under `refresh:{user_id}` so rotation can invalidate the
/// previous one atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginInput {
    pub phone_number: String,
    #[serde(default = "super::principal::default_country_code")]
    pub country_code: String,
    pub password: String,
    pub mfa_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefreshInput {
    pub refresh_token: String,
    pub mpin: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LogoutInput {
    pub refresh_token: String,
}
