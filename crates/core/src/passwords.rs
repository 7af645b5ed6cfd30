//! Password hashing and strength rules.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::error::{Result, RollcallError};

const MIN_PASSWORD_LEN: usize = 8;

/// Passwords rejected outright regardless of length.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890", "qwerty123",
    "qwertyuiop", "iloveyou", "11111111", "00000000", "abc12345", "football", "baseball",
    "welcome1", "sunshine", "princess", "letmein1", "trustno1", "superman", "1q2w3e4r",
    "1qaz2wsx", "zaq12wsx", "passw0rd", "p@ssw0rd", "admin123", "qwerty12", "monkey12",
    "dragon12", "master12", "starwars", "whatever", "computer", "internet", "michael1",
    "jennifer", "asdfghjk", "asdf1234", "zxcvbnm1", "secret12", "changeme",
];

/// Hash a password using argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = argon2::password_hash::SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RollcallError::Auth(format!("password hashing failed: {e}")))
}

/// Verify a password against a stored hash. A malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Check a new password against the strength rules, reporting every violation at once.
pub fn validate_password(password: &str, username: &str) -> Result<()> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LEN {
        problems.push(format!(
            "password must contain at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("password cannot be entirely numeric".to_string());
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        problems.push("password is too common".to_string());
    }
    if username.chars().count() >= 3
        && password.to_lowercase().contains(&username.to_lowercase())
    {
        problems.push("password is too similar to the username".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(RollcallError::Validation(problems.join("; ")))
    }
}
