//! Authorization gate and credential endpoints
//!
//! Protected handlers take a [`CurrentUser`] argument. Extraction reads the
//! `Authorization: Bearer <token>` header, verifies it, and rejects the
//! request with 401 before the body is looked at.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    Json,
};
use bookcheck_common::api::{AuthPayload, Envelope, LoginRequest, RegisterRequest};
use bookcheck_common::models::Identity;
use bookcheck_common::Error;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::services::Session;
use crate::AppState;

/// Identity of the authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match state.accounts.authenticate(header) {
            Ok(identity) => {
                parts.extensions.insert(identity.clone());
                Ok(CurrentUser(identity))
            }
            Err(e) => {
                debug!("Rejected {} {}: {:?}", parts.method, parts.uri.path(), e);
                Err(Error::from(e).into())
            }
        }
    }
}

fn auth_payload(message: &str, session: Session) -> Envelope<AuthPayload> {
    Envelope::ok(AuthPayload {
        message: message.to_string(),
        token: session.token,
        user: session.user,
    })
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<AuthPayload>>)> {
    let Json(req) = body?;
    let session = state.accounts.register(req).await?;

    Ok((StatusCode::CREATED, Json(auth_payload("User registered", session))))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<AuthPayload>>> {
    let Json(req) = body?;
    let session = state.accounts.login(req).await?;

    Ok(Json(auth_payload("Login successful", session)))
}
