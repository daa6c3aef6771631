use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::AppError;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Claims {
    pub sub: i64, // user id
    pub iat: i64,
    pub exp: i64,
}

//function to create a JWT token
pub fn create_jwt(user_id: i64, secret: &str, ttl: Duration) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let ttl_secs = i64::try_from(ttl.as_secs())
        .map_err(|_| AppError::internal("token lifetime does not fit in i64"))?;

    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now + ttl_secs,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
        .map_err(|e| AppError::internal(format!("failed to sign token: {}", e)))
}

//function to decode and validate a JWT token
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &validation)?;
    Ok(token_data.claims)
}
