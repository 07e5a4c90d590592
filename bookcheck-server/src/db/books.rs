//! Book persistence
//!
//! One row per book aggregate. `authors` and `reviews` are JSON arrays; a
//! save rewrites the whole row, so concurrent writers race and the last
//! write wins.

use bookcheck_common::models::{Book, Review};
use bookcheck_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{decode_timestamp, encode_timestamp};

const BOOK_COLUMNS: &str = "id, title, authors, genre, description, cover_ref, pdf_ref, \
                            owner_id, reviews, created_at, updated_at";

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| bookcheck_common::Error::Internal(format!("Bad id {:?}: {}", raw, e)))
}

fn book_from_row(row: &SqliteRow) -> Result<Book> {
    let id: String = row.try_get("id")?;
    let owner_id: String = row.try_get("owner_id")?;
    let authors: String = row.try_get("authors")?;
    let reviews: String = row.try_get("reviews")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Book {
        id: parse_uuid(&id)?,
        title: row.try_get("title")?,
        authors: serde_json::from_str(&authors)?,
        genre: row.try_get("genre")?,
        description: row.try_get("description")?,
        cover_ref: row.try_get("cover_ref")?,
        pdf_ref: row.try_get("pdf_ref")?,
        owner_id: parse_uuid(&owner_id)?,
        reviews: serde_json::from_str::<Vec<Review>>(&reviews)?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
    })
}

/// Insert a new book row
pub async fn insert_book(pool: &SqlitePool, book: &Book) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO books (
            id, title, authors, genre, description, cover_ref, pdf_ref,
            owner_id, reviews, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(book.id.to_string())
    .bind(&book.title)
    .bind(serde_json::to_string(&book.authors)?)
    .bind(&book.genre)
    .bind(&book.description)
    .bind(&book.cover_ref)
    .bind(&book.pdf_ref)
    .bind(book.owner_id.to_string())
    .bind(serde_json::to_string(&book.reviews)?)
    .bind(encode_timestamp(&book.created_at))
    .bind(encode_timestamp(&book.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Rewrite every mutable column of an existing book
///
/// `owner_id` and `created_at` are never rewritten. Returns false if the
/// row no longer exists.
pub async fn save_book(pool: &SqlitePool, book: &Book) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE books SET
            title = ?,
            authors = ?,
            genre = ?,
            description = ?,
            cover_ref = ?,
            pdf_ref = ?,
            reviews = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&book.title)
    .bind(serde_json::to_string(&book.authors)?)
    .bind(&book.genre)
    .bind(&book.description)
    .bind(&book.cover_ref)
    .bind(&book.pdf_ref)
    .bind(serde_json::to_string(&book.reviews)?)
    .bind(encode_timestamp(&book.updated_at))
    .bind(book.id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load one book by id
pub async fn load_book(pool: &SqlitePool, id: Uuid) -> Result<Option<Book>> {
    let row = sqlx::query(&format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(book_from_row).transpose()
}

/// Load every book, newest first
pub async fn load_all_books(pool: &SqlitePool) -> Result<Vec<Book>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM books ORDER BY created_at DESC, rowid DESC",
        BOOK_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(book_from_row).collect()
}

/// Load books owned by any of `owner_ids`, newest first
pub async fn load_books_by_owners(pool: &SqlitePool, owner_ids: &[Uuid]) -> Result<Vec<Book>> {
    let mut books = Vec::new();
    for owner in owner_ids {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM books WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC",
            BOOK_COLUMNS
        ))
        .bind(owner.to_string())
        .fetch_all(pool)
        .await?;

        for row in &rows {
            books.push(book_from_row(row)?);
        }
    }
    Ok(books)
}

/// Load books whose owner has no matching user row
pub async fn load_orphaned_books(pool: &SqlitePool) -> Result<Vec<Book>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM books WHERE owner_id NOT IN (SELECT id FROM users) \
         ORDER BY created_at DESC, rowid DESC",
        BOOK_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(book_from_row).collect()
}

/// Delete a book row (and with it every embedded review)
///
/// Returns false if no such row existed.
pub async fn delete_book(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
