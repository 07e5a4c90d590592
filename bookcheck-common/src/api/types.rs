//! Response envelopes and request bodies shared by the HTTP layer
//!
//! Every response carries `success`. Successful responses flatten their
//! payload next to it; failures carry `message` and `errors`.

use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::models::PublicUser;

/// Successful response: `{"success": true, ...payload}`
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload,
        }
    }
}

/// Failure response: `{"success": false, "message": ..., "errors": [...]}`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors,
        }
    }
}

/// Payload of a plain acknowledgement such as a delete
#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub message: String,
}

/// POST /api/auth/register
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// POST /api/auth/login
///
/// The account may be named by `username`, `email` or `identifier`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub identifier: Option<String>,
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    /// First non-blank of `identifier`, `username`, `email`
    pub fn identifier(&self) -> Option<&str> {
        [&self.identifier, &self.username, &self.email]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// Session token plus the account it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct AuthPayload {
    pub message: String,
    pub token: String,
    pub user: PublicUser,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_flattens_payload() {
        let body = Envelope::ok(MessageBody {
            message: "Book deleted".into(),
        });
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, json!({"success": true, "message": "Book deleted"}));
    }

    #[test]
    fn test_error_envelope_shape() {
        let body = ErrorEnvelope::new(
            "Validation failed",
            vec![FieldError::new("password", "Password at least 6 chars")],
        );
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["message"], "Validation failed");
        assert_eq!(value["errors"][0]["field"], "password");
    }

    #[test]
    fn test_login_identifier_precedence() {
        let req: LoginRequest =
            serde_json::from_value(json!({"email": "a@b.io", "password": "x"})).unwrap();
        assert_eq!(req.identifier(), Some("a@b.io"));

        let req: LoginRequest = serde_json::from_value(
            json!({"username": "  ", "email": "a@b.io", "identifier": "alice", "password": "x"}),
        )
        .unwrap();
        assert_eq!(req.identifier(), Some("alice"));

        let req: LoginRequest = serde_json::from_value(json!({"password": "x"})).unwrap();
        assert_eq!(req.identifier(), None);
    }
}
