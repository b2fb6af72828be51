//! Opaque, prefix-tagged ID generation for principals, roles, permissions, etc.
//!
//! §4.1: "IDs generated as PREFIX + monotonic suffix; generator must never repeat
//! within a process lifetime and must not collide across concurrent writers (use a
//! table-size-aware hashed suffix with collision retry, max 8 attempts -> Internal)."

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::error::AppError;

static PROCESS_COUNTER: AtomicU64 = AtomicU64::new(0);

const MAX_COLLISION_ATTEMPTS: u8 = 8;

/// Generates a new opaque ID for the given entity prefix (e.g. `"USR"`, `"ROLE"`).
///
/// The suffix mixes a monotonic per-process counter (guaranteeing no repeats within
/// this process) with random bits (reducing cross-writer collision odds) into a
/// base36 string, which keeps the whole ID within the 12-24 byte budget of §6.
pub fn generate(prefix: &str) -> String {
    let counter = PROCESS_COUNTER.fetch_add(1, Ordering::Relaxed);
    let random: u32 = rand::thread_rng().gen();
    let mixed = (counter << 32) ^ (random as u64);
    format!("{prefix}{}", to_base36(mixed))
}

/// Runs `generate` and checks the result against `exists`, retrying up to
/// [`MAX_COLLISION_ATTEMPTS`] times before surfacing `Internal`.
pub async fn generate_unique<F, Fut>(prefix: &str, exists: F) -> Result<String, AppError>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<bool, AppError>>,
{
    for _ in 0..MAX_COLLISION_ATTEMPTS {
        let candidate = generate(prefix);
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
    }
    Err(AppError::Internal(format!(
        "id generator exhausted {MAX_COLLISION_ATTEMPTS} attempts for prefix {prefix}"
    )))
}

fn to_base36(mut value: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 alphabet is ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_their_prefix() {
        let id = generate("USR");
        assert!(id.starts_with("USR"));
    }

    #[test]
    fn generated_ids_never_repeat_within_process() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate("ROLE")));
        }
    }

    #[tokio::test]
    async fn generate_unique_retries_on_collision_then_succeeds() {
        let calls = std::cell::Cell::new(0u8);
        let id = generate_unique("PERM", |_candidate| {
            calls.set(calls.get() + 1);
            let collide = calls.get() < 3;
            async move { Ok(collide) }
        })
        .await
        .unwrap();
        assert!(id.starts_with("PERM"));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn generate_unique_gives_up_after_max_attempts() {
        let result = generate_unique("RES", |_candidate| async move { Ok(true) }).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
