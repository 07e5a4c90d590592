//! Registration, login and token authentication

use bookcheck_common::api::auth::{hash_password, verify_password, TokenError, TokenSigner};
use bookcheck_common::api::{LoginRequest, RegisterRequest};
use bookcheck_common::models::{Identity, PublicUser, User};
use bookcheck_common::{Error, FieldError, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{now, users};

pub const MIN_PASSWORD_LEN: usize = 6;

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: PublicUser,
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .map(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
            .unwrap_or(false)
}

/// Collect every problem with a registration request
fn validate_registration(username: &str, email: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if username.is_empty() {
        errors.push(FieldError::new("username", "Username is required"));
    }
    if !looks_like_email(email) {
        errors.push(FieldError::new("email", "Valid email required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new("password", "Password at least 6 chars"));
    }
    errors
}

/// Credential store over the users table and the token signer
#[derive(Debug, Clone)]
pub struct AccountService {
    db: SqlitePool,
    signer: TokenSigner,
}

impl AccountService {
    pub fn new(db: SqlitePool, signer: TokenSigner) -> Self {
        Self { db, signer }
    }

    fn issue(&self, user: &User) -> Result<Session> {
        let identity = Identity {
            id: user.id,
            username: user.username.clone(),
        };
        Ok(Session {
            token: self.signer.issue(&identity, now())?,
            user: PublicUser::from(user),
        })
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<Session> {
        let username = req.username.trim().to_string();
        let email = req.email.trim().to_lowercase();

        let errors = validate_registration(&username, &email, &req.password);
        if !errors.is_empty() {
            return Err(Error::Validation {
                message: "Validation failed".to_string(),
                errors,
            });
        }

        if users::username_or_email_taken(&self.db, &username, &email).await? {
            return Err(Error::Conflict("User already exists".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash: hash_password(&req.password)?,
            created_at: now(),
        };
        users::insert_user(&self.db, &user).await?;
        info!("Registered user {} ({})", user.username, user.id);

        self.issue(&user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<Session> {
        let Some(identifier) = req.identifier() else {
            return Err(Error::invalid_field("username", "Username or email required"));
        };
        if req.password.is_empty() {
            return Err(Error::invalid_field("password", "Password required"));
        }

        let user = users::find_by_login(&self.db, identifier)
            .await?
            .ok_or(Error::InvalidCredentials)?;
        if !verify_password(&req.password, &user.password_hash) {
            debug!("Password mismatch for {}", user.username);
            return Err(Error::InvalidCredentials);
        }

        self.issue(&user)
    }

    /// Resolve an `Authorization` header value to the caller's identity
    pub fn authenticate(&self, header: Option<&str>) -> std::result::Result<Identity, TokenError> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::Missing)?;

        self.signer.verify(token, now()).map(|claims| claims.identity())
    }
}
