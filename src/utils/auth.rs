use sha2::{Digest, Sha256};
use tokio::time::{Duration, timeout};

use crate::errors::AppError;

/// Verify a password against a bcrypt hash in a blocking thread with a timeout.
/// Returns Ok(true) if password matches, Ok(false) if not, Err on internal errors/timeouts.
pub async fn verify_password_blocking(
    password: String,
    hashed: String,
    timeout_secs: Option<u64>,
) -> Result<bool, AppError> {
    let task = tokio::task::spawn_blocking(move || bcrypt::verify(&password, &hashed));
    let dur = Duration::from_secs(timeout_secs.unwrap_or(5));

    match timeout(dur, task).await {
        Ok(join_res) => match join_res? {
            Ok(valid) => Ok(valid),
            Err(e) => Err(AppError::internal(format!("password verification failed: {}", e))),
        },
        Err(_) => Err(AppError::internal("password verification timed out")),
    }
}

/// Hash a password in a blocking thread with a timeout and configurable cost.
pub async fn hash_password_blocking(
    password: String,
    cost: u32,
    timeout_secs: Option<u64>,
) -> Result<String, AppError> {
    let task = tokio::task::spawn_blocking(move || bcrypt::hash(&password, cost));
    let dur = Duration::from_secs(timeout_secs.unwrap_or(5));

    match timeout(dur, task).await {
        Ok(join_res) => match join_res? {
            Ok(hash) => Ok(hash),
            Err(e) => Err(AppError::internal(format!("password hashing failed: {}", e))),
        },
        Err(_) => Err(AppError::internal("password hashing timed out")),
    }
}

/// Creates a password reset token. Returns `(plain, sha256_hex)`: the plain
/// token is mailed to the user, only the digest is stored.
pub fn create_reset_token() -> (String, String) {
    let bytes: [u8; 32] = rand::random();
    let plain = hex::encode(bytes);
    let hashed = hash_reset_token(&plain);
    (plain, hashed)
}

pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
