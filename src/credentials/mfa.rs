//! §4.6 MFA: TOTP verification with an attempt counter backed by the shared
//! cache layer, so lockout applies across workers rather than per-process.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::cache::KernelCache;
use crate::error::AppError;

const MAX_ATTEMPTS: i64 = 5;
const LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);
const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    Sms,
    Email,
}

impl ChallengeKind {
    fn tag(self) -> &'static str {
        match self {
            ChallengeKind::Sms => "sms",
            ChallengeKind::Email => "email",
        }
    }
}

/// Generates a fresh base32-encoded TOTP secret for enrollment (20 bytes, the
/// RFC 4226 recommended HMAC-SHA1 key size).
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 20];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Secret::Raw(bytes.to_vec()).to_encoded().to_string()
}

pub fn new_totp(secret_base32: &str) -> Result<TOTP, AppError> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| AppError::Internal(format!("invalid totp secret: {e:?}")))?;
    TOTP::new(Algorithm::SHA1, 6, 1, 30, secret)
        .map_err(|e| AppError::Internal(format!("failed to construct totp: {e}")))
}

fn lockout_key(principal_id: &str) -> String {
    format!("mfa:attempts:{principal_id}")
}

pub async fn check_not_locked_out(cache: &Arc<dyn KernelCache>, principal_id: &str) -> Result<(), AppError> {
    let key = lockout_key(principal_id);
    let attempts = cache
        .get(&key)
        .await?
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    if attempts >= MAX_ATTEMPTS {
        return Err(AppError::RateLimit {
            retry_after_secs: LOCKOUT_WINDOW.as_secs(),
        });
    }
    Ok(())
}

pub async fn verify_code(
    cache: &Arc<dyn KernelCache>,
    principal_id: &str,
    secret_base32: &str,
    code: &str,
) -> Result<bool, AppError> {
    check_not_locked_out(cache, principal_id).await?;

    let totp = new_totp(secret_base32)?;
    let valid = totp
        .check_current(code)
        .map_err(|e| AppError::Internal(format!("totp check failed: {e}")))?;

    if valid {
        cache.delete(&lockout_key(principal_id)).await?;
    } else {
        cache
            .increment(&lockout_key(principal_id), 1, Some(LOCKOUT_WINDOW))
            .await?;
    }

    Ok(valid)
}

fn challenge_key(kind: ChallengeKind, principal_id: &str) -> String {
    format!("mfa:challenge:{}:{principal_id}", kind.tag())
}

fn challenge_lockout_key(kind: ChallengeKind, principal_id: &str) -> String {
    format!("mfa:attempts:{}:{principal_id}", kind.tag())
}

/// Generates a 6-digit numeric one-time code for an SMS/Email challenge.
/// Delivering it to the user over SMS/Email is out of scope here -- this
/// only mints the code and stores the side C4 can verify against.
pub fn generate_numeric_code() -> String {
    let mut bytes = [0u8; 4];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let value = u32::from_be_bytes(bytes) % 1_000_000;
    format!("{value:06}")
}

/// Stores a freshly generated challenge code, keyed by `(kind, principal_id)`,
/// with a 5 minute TTL (§4.6).
pub async fn issue_challenge(
    cache: &Arc<dyn KernelCache>,
    kind: ChallengeKind,
    principal_id: &str,
    code: &str,
) -> Result<(), AppError> {
    cache
        .set(&challenge_key(kind, principal_id), code, Some(CHALLENGE_TTL))
        .await
}

/// Single-use verification: the stored code is deleted on the first
/// successful match, so replaying it fails even within the TTL window.
async fn verify_challenge(
    cache: &Arc<dyn KernelCache>,
    kind: ChallengeKind,
    principal_id: &str,
    code: &str,
) -> Result<bool, AppError> {
    let attempts_key = challenge_lockout_key(kind, principal_id);
    let attempts = cache
        .get(&attempts_key)
        .await?
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    if attempts >= MAX_ATTEMPTS {
        return Err(AppError::RateLimit {
            retry_after_secs: LOCKOUT_WINDOW.as_secs(),
        });
    }

    let key = challenge_key(kind, principal_id);
    let stored = cache.get(&key).await?;
    let valid = stored.as_deref() == Some(code);

    if valid {
        cache.delete(&key).await?;
        cache.delete(&attempts_key).await?;
    } else {
        cache.increment(&attempts_key, 1, Some(LOCKOUT_WINDOW)).await?;
    }

    Ok(valid)
}

pub async fn verify_sms(cache: &Arc<dyn KernelCache>, principal_id: &str, code: &str) -> Result<bool, AppError> {
    verify_challenge(cache, ChallengeKind::Sms, principal_id, code).await
}

pub async fn verify_email(cache: &Arc<dyn KernelCache>, principal_id: &str, code: &str) -> Result<bool, AppError> {
    verify_challenge(cache, ChallengeKind::Email, principal_id, code).await
}
