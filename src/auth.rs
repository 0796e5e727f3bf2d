//! Password hashing and bearer-token handling.

use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tokio::task;

/// Claims carried by an issued token. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: &str, username: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding).context("Failed to sign token")
    }

    /// Verifies the signature and expiry. Any failure (malformed, forged,
    /// expired) comes back as an error; callers map it to 403.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .context("Token verification failed")?;
        Ok(data.claims)
    }
}

/// Hashes a password with a fresh random salt. Argon2 is CPU-heavy, so the
/// work runs on a blocking thread.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    task::spawn_blocking(move || hash_password_sync(&password))
        .await
        .context("Password hashing task panicked")?
}

pub fn hash_password_sync(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();

    task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;
        Ok::<bool, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await
    .context("Password verification task panicked")?
}

/// Extracts the username from a token's payload segment WITHOUT verifying
/// the signature. Only the offline mirror uses this, to key its local cache;
/// it must never stand in for [`TokenService::verify`] on the server side.
#[must_use]
pub fn decode_username_unverified(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value
        .get("username")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify_password() {
        let hash = hash_password("abcd1234").await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("abcd1234", &hash).await.unwrap());
        assert!(!verify_password("wrong999", &hash).await.unwrap());
    }

    #[test]
    fn test_token_roundtrip() {
        let service = TokenService::new("test-secret", 8);
        let token = service.issue("user-1", "alice").unwrap();

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.username, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_rejects_wrong_secret() {
        let issuer = TokenService::new("secret-a", 8);
        let verifier = TokenService::new("secret-b", 8);

        let token = issuer.issue("user-1", "alice").unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_token_rejects_expired() {
        // Negative TTL puts exp well past the default validation leeway.
        let service = TokenService::new("test-secret", -1);
        let token = service.issue("user-1", "alice").unwrap();
        assert!(service.verify(&token).is_err());
    }

    #[test]
    fn test_token_rejects_garbage() {
        let service = TokenService::new("test-secret", 8);
        assert!(service.verify("not-a-token").is_err());
        assert!(service.verify("a.b.c").is_err());
    }

    #[test]
    fn test_unverified_decode_reads_username() {
        let service = TokenService::new("test-secret", 8);
        let token = service.issue("user-1", "alice").unwrap();
        assert_eq!(decode_username_unverified(&token).as_deref(), Some("alice"));

        assert_eq!(decode_username_unverified("garbage"), None);
        assert_eq!(decode_username_unverified("a.!!!.c"), None);
    }
}
