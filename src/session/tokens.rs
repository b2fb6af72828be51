//! Access/refresh token issuance and validation. Access tokens are signed
//! JWTs (HS256, the same `jsonwebtoken` crate the teacher uses for its Clerk
//! RS256 verification, just the symmetric side); refresh tokens are opaque
//! random strings fingerprinted in the cache rather than self-describing, so
//! a single rotation in the cache immediately invalidates the old one.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AccessClaims, Principal};

pub fn issue_access_token(
    principal: &Principal,
    roles: &[String],
    permissions: &[String],
    secret: &str,
    ttl_secs: i64,
) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = AccessClaims {
        sub: principal.id.clone(),
        username: principal.username.clone(),
        status: format!("{:?}", principal.status).to_lowercase(),
        is_validated: principal.is_validated,
        roles: roles.to_vec(),
        permissions: permissions.to_vec(),
        token_type: "access".to_string(),
        iat: now,
        exp: now + ttl_secs,
        jti: Uuid::new_v4().to_string(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("failed to sign access token: {e}")))
}

pub fn validate_access_token(token: &str, secret: &str) -> Result<AccessClaims, AppError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation).map_err(|e| {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken(e.to_string()),
        }
    })?;
    Ok(data.claims)
}

/// A refresh token is `{principal_id}.{random}`: the random half carries no
/// claims and is only meaningful alongside its cache fingerprint, but the
/// principal id prefix lets `/v2/auth/refresh` resolve which session to
/// rotate without first requiring a still-valid access token.
pub fn issue_refresh_token(principal_id: &str) -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{principal_id}.{}", hex::encode(bytes))
}

/// Extracts the principal id a presented refresh token claims to belong to.
/// This is *not* the trust boundary -- the caller still has to compare the
/// full token against the fingerprint cached under [`refresh_cache_key`].
pub fn refresh_token_subject(token: &str) -> Result<&str, AppError> {
    token
        .split_once('.')
        .map(|(subject, _)| subject)
        .filter(|subject| !subject.is_empty())
        .ok_or_else(|| AppError::InvalidToken("malformed refresh token".to_string()))
}

pub fn refresh_cache_key(principal_id: &str) -> String {
    format!("refresh:{principal_id}")
}
