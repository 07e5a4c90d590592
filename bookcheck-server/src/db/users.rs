//! User persistence

use bookcheck_common::models::User;
use bookcheck_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{decode_timestamp, encode_timestamp};

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| Error::Internal(format!("Bad user id: {}", e)))?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: decode_timestamp(&created_at)?,
    })
}

/// Insert a user
///
/// A uniqueness violation (username or email raced in after the caller's
/// existence check) is reported as a conflict.
pub async fn insert_user(pool: &SqlitePool, user: &User) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (id, username, email, password_hash, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(encode_timestamp(&user.created_at))
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(Error::Conflict("User already exists".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Find a user whose username or email equals `identifier`
pub async fn find_by_login(pool: &SqlitePool, identifier: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, username, email, password_hash, created_at
        FROM users
        WHERE username = ?1 OR email = ?2
        LIMIT 1
        "#,
    )
    .bind(identifier)
    .bind(identifier.to_lowercase())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// True if either the username or the email is already taken
pub async fn username_or_email_taken(pool: &SqlitePool, username: &str, email: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ? OR email = ?")
            .bind(username)
            .bind(email)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

/// Ids of users whose username starts with `prefix`, ignoring ASCII case
pub async fn ids_with_username_prefix(pool: &SqlitePool, prefix: &str) -> Result<Vec<Uuid>> {
    let rows = sqlx::query("SELECT id, username FROM users")
        .fetch_all(pool)
        .await?;

    let prefix = prefix.to_lowercase();
    let mut ids = Vec::new();
    for row in &rows {
        let username: String = row.try_get("username")?;
        if username.to_lowercase().starts_with(&prefix) {
            let id: String = row.try_get("id")?;
            ids.push(Uuid::parse_str(&id).map_err(|e| Error::Internal(e.to_string()))?);
        }
    }
    Ok(ids)
}
