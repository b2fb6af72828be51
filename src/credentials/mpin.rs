//! M-PIN: a short numeric secondary credential, hashed with the same Argon2id
//! KDF as the primary password (§4.6). Format validation (digit count) is
//! kept separate from hashing so callers can reject malformed PINs before
//! paying for a hash.

use crate::error::AppError;

use super::password;

pub const PIN_LENGTH: usize = 6;

pub fn validate_format(pin: &str) -> Result<(), AppError> {
    if pin.len() != PIN_LENGTH || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::InvalidFormat(format!(
            "mpin must be exactly {PIN_LENGTH} digits"
        )));
    }
    Ok(())
}

pub fn hash(pin: &str) -> Result<String, AppError> {
    validate_format(pin)?;
    password::hash(pin)
}

pub fn verify(pin: &str, hashed: &str) -> Result<bool, AppError> {
    password::verify(pin, hashed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(validate_format("123").is_err());
    }

    #[test]
    fn rejects_non_digits() {
        assert!(validate_format("12a456").is_err());
    }

    #[test]
    fn hash_then_verify_round_trips() {
        let hashed = hash("482913").unwrap();
        assert!(verify("482913", &hashed).unwrap());
        assert!(!verify("000000", &hashed).unwrap());
    }
}
