//! Password hashing and verification.
//!
//! Passwords are Argon2id-hashed with a per-password random salt and stored
//! in PHC string format. Hashing is deliberately slow, so both operations run
//! on the blocking pool instead of stalling an async worker.

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::rngs::OsRng;

fn hash_blocking(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?
        .to_string();
    Ok(hash)
}

fn verify_blocking(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| anyhow::anyhow!("invalid stored password hash: {err}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hash a password with Argon2id and a fresh salt.
///
/// # Errors
///
/// Fails when the hasher rejects its input, which with default parameters
/// only happens on out-of-range lengths, or when the blocking task is
/// cancelled at shutdown.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_blocking(&password))
        .await
        .context("password hashing task aborted")?
}

/// Verify a password against a stored PHC hash. A mismatch is `Ok(false)`;
/// only an unparseable stored hash is an error.
///
/// # Errors
///
/// Fails when `stored_hash` is not a valid PHC string or the blocking task
/// is cancelled at shutdown.
pub async fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();
    tokio::task::spawn_blocking(move || verify_blocking(&password, &stored_hash))
        .await
        .context("password verification task aborted")?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{hash_password, verify_password};

    #[tokio::test]
    async fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").await.unwrap();
        assert!(
            verify_password("correct horse battery staple", &hash)
                .await
                .unwrap()
        );
        assert!(!verify_password("incorrect horse", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn hashes_use_distinct_salts() {
        let first = hash_password("same password").await.unwrap();
        let second = hash_password("same password").await.unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn unparseable_stored_hash_is_an_error() {
        assert!(
            verify_password("anything", "not-a-phc-string")
                .await
                .is_err()
        );
    }
}
