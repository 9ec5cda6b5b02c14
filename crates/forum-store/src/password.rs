//! Argon2id password hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use secrecy::{ExposeSecret, SecretString};

use crate::error::StoreError;

/// Hash a password into a PHC string (`$argon2id$v=19$...`).
pub fn hash_password(password: &SecretString) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::PasswordHash(e.to_string()))
}

/// Check a password against a stored PHC string. A malformed stored hash
/// is reported as an error, a mismatch as `Ok(false)`.
pub fn verify_password(password: &SecretString, stored: &str) -> Result<bool, StoreError> {
    let parsed = PasswordHash::new(stored).map_err(|e| StoreError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed)
        .is_ok())
}
