//! Password and M-PIN hashing. Argon2id is the kernel's KDF of choice: it is
//! the `argon2` crate's default algorithm variant and resists both GPU and
//! side-channel attacks better than bcrypt/scrypt for this workload.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

use crate::error::AppError;

pub fn hash(secret: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify(secret: &str, hashed: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hashed)
        .map_err(|e| AppError::Internal(format!("stored password hash is malformed: {e}")))?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hashed = hash("correct horse battery staple").unwrap();
        assert!(verify("correct horse battery staple", &hashed).unwrap());
        assert!(!verify("wrong password", &hashed).unwrap());
    }

    #[test]
    fn each_hash_uses_a_fresh_salt() {
        let a = hash("same-input").unwrap();
        let b = hash("same-input").unwrap();
        assert_ne!(a, b);
    }
}
