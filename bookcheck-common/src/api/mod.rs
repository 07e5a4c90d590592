//! Shared HTTP API functionality
//!
//! Framework-independent: credential primitives and the JSON shapes the
//! server speaks. The server wraps these with axum extractors.

pub mod auth;
pub mod types;

pub use auth::{hash_password, verify_password, Claims, TokenError, TokenSigner};
pub use types::{
    AuthPayload, Envelope, ErrorEnvelope, LoginRequest, MessageBody, RegisterRequest,
};
