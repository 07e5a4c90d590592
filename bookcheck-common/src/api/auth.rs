//! Credential primitives: password hashing and signed session tokens
//!
//! # Session tokens
//!
//! A token is `<payload>.<signature>` where
//! - `payload` is the canonical JSON of [`Claims`] (sorted keys, no
//!   whitespace), base64url-encoded without padding
//! - `signature` is HMAC-SHA256 of the canonical JSON keyed by the server
//!   secret, base64url-encoded without padding
//!
//! Verification checks the tag in constant time, then expiry. Nothing about
//! a session is kept server side.
//!
//! # Passwords
//!
//! Argon2id with a random per-password salt, stored as a PHC string.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::models::Identity;
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Why a token was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// No bearer token on the request
    Missing,
    /// Not two dot-separated parts, bad base64, or unparseable claims
    Malformed,
    /// Signature does not match the payload
    BadSignature,
    /// `exp` is in the past
    Expired,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "No token, authorization denied"),
            TokenError::Malformed | TokenError::BadSignature | TokenError::Expired => {
                write!(f, "Token is not valid")
            }
        }
    }
}

impl std::error::Error for TokenError {}

impl From<TokenError> for Error {
    fn from(err: TokenError) -> Self {
        Error::Unauthorized(err.to_string())
    }
}

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub username: String,
    /// Issued at, Unix seconds
    pub iat: i64,
    /// Expires at, Unix seconds
    pub exp: i64,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.sub,
            username: self.username.clone(),
        }
    }
}

/// Issues and verifies session tokens with one server secret
#[derive(Clone)]
pub struct TokenSigner {
    secret: String,
    ttl_secs: i64,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl TokenSigner {
    pub fn new(secret: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }

    /// Sign a token for `identity`, valid from `now` for the configured TTL
    pub fn issue(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: identity.id,
            username: identity.username.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl_secs,
        };
        let canonical = to_canonical_json(&serde_json::to_value(&claims)?);
        let payload = URL_SAFE_NO_PAD.encode(canonical.as_bytes());
        let signature = self
            .mac(&canonical)
            .map(|mac| URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
            .ok_or_else(|| Error::Internal("Token signing key rejected".to_string()))?;

        Ok(format!("{}.{}", payload, signature))
    }

    /// Check signature and expiry, returning the claims on success
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> std::result::Result<Claims, TokenError> {
        let (payload, signature) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;

        let canonical = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(TokenError::Malformed)?;

        let tag = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        self.mac(&canonical)
            .ok_or(TokenError::BadSignature)?
            .verify_slice(&tag)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims =
            serde_json::from_str(&canonical).map_err(|_| TokenError::Malformed)?;

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// HMAC keyed by the secret, fed with the canonical claims
    fn mac(&self, canonical: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(canonical.as_bytes());
        Some(mac)
    }
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
///
/// ```
/// use bookcheck_common::api::auth::to_canonical_json;
/// use serde_json::json;
///
/// let canonical = to_canonical_json(&json!({"z": 3, "a": 1}));
/// assert_eq!(canonical, r#"{"a":1,"z":3}"#);
/// ```
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        // serde_json's Display already escapes strings and formats scalars compactly
        other => other.to_string(),
    }
}

/// Hash a password with Argon2id and a fresh random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC hash
///
/// An unparseable stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}
