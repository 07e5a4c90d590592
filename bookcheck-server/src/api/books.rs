//! Book endpoints
//!
//! Reads are public. Create, update and delete require a [`CurrentUser`];
//! update and delete are further restricted to the book's owner.

use axum::{
    async_trait,
    body::Body,
    extract::{multipart::MultipartRejection, FromRequestParts, Multipart, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use bookcheck_common::api::{Envelope, MessageBody};
use bookcheck_common::models::{Book, BookFilter, BookPatch, NewBook, Review};
use bookcheck_common::uuid_utils::parse_record_id;
use bookcheck_common::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::convert::Infallible;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::storage::{absolute_url, is_remote, AssetKind, UploadedFile};
use crate::AppState;

/// Scheme and authority that stored asset references are resolved against
#[derive(Debug, Clone)]
pub struct BaseUrl(pub String);

#[async_trait]
impl FromRequestParts<AppState> for BaseUrl {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(base) = &state.config.public_base_url {
            return Ok(BaseUrl(base.clone()));
        }

        let header_str = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let proto = header_str("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
        let host = header_str("host")
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| state.config.bind_addr());

        Ok(BaseUrl(format!("{}://{}", proto, host)))
    }
}

/// Book as returned to clients: absolute asset URLs plus the derived rating
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub genre: Option<String>,
    pub description: String,
    pub cover_url: Option<String>,
    pub pdf_url: Option<String>,
    pub owner: Uuid,
    pub reviews: Vec<Review>,
    pub avg_rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookView {
    pub fn new(book: Book, base: &BaseUrl) -> Self {
        Self {
            avg_rating: book.avg_rating(),
            cover_url: absolute_url(book.cover_ref.as_deref(), &base.0),
            pdf_url: absolute_url(book.pdf_ref.as_deref(), &base.0),
            id: book.id,
            title: book.title,
            authors: book.authors,
            genre: book.genre,
            description: book.description,
            owner: book.owner_id,
            reviews: book.reviews,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BooksBody {
    pub books: Vec<BookView>,
}

#[derive(Debug, Serialize)]
pub struct BookBody {
    pub book: BookView,
}

/// Text fields and files from a multipart book form
#[derive(Debug, Default)]
struct BookForm {
    title: Option<String>,
    authors: Option<Vec<String>>,
    genre: Option<String>,
    description: Option<String>,
    uploads: Vec<UploadedFile>,
}

impl BookForm {
    async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = BookForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "cover" | "pdf" => {
                    let kind = if name == "cover" { AssetKind::Cover } else { AssetKind::Pdf };
                    let original_name = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await?;
                    // Browsers send an empty part when no file was picked
                    if original_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.uploads.retain(|u| u.kind != kind);
                    form.uploads.push(UploadedFile {
                        kind,
                        original_name,
                        bytes: bytes.to_vec(),
                    });
                }
                "title" => form.title = Some(field.text().await?),
                "author" | "authors" | "authors[]" => {
                    let value = field.text().await?;
                    form.authors.get_or_insert_with(Vec::new).push(value);
                }
                "genre" => form.genre = Some(field.text().await?),
                "description" => form.description = Some(field.text().await?),
                _ => {}
            }
        }

        Ok(form)
    }

    fn into_new_book(self) -> (NewBook, Vec<UploadedFile>) {
        let book = NewBook {
            title: self.title,
            authors: self.authors.unwrap_or_default(),
            genre: self.genre,
            description: self.description,
        };
        (book, self.uploads)
    }

    fn into_patch(self) -> (BookPatch, Vec<UploadedFile>) {
        let patch = BookPatch {
            title: self.title,
            authors: self.authors,
            genre: self.genre,
            description: self.description,
        };
        (patch, self.uploads)
    }
}

/// GET /api/books?search=&genre=
pub async fn list_books(
    State(state): State<AppState>,
    base: BaseUrl,
    Query(filter): Query<BookFilter>,
) -> ApiResult<Json<Envelope<BooksBody>>> {
    let books = state.books.list(&filter).await?;
    let books = books.into_iter().map(|b| BookView::new(b, &base)).collect();

    Ok(Json(Envelope::ok(BooksBody { books })))
}

/// GET /api/books/:id
pub async fn get_book(
    State(state): State<AppState>,
    base: BaseUrl,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<BookBody>>> {
    let id = parse_record_id(&id, "Book")?;
    let book = state.books.get(id).await?;

    Ok(Json(Envelope::ok(BookBody {
        book: BookView::new(book, &base),
    })))
}

/// GET /api/books/:id/download
///
/// Remote PDFs are redirected to; local ones are streamed as an attachment.
pub async fn download_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let pdf_missing = || ApiError::from(Error::NotFound("PDF not found".to_string()));

    let id = parse_record_id(&id, "Book")?;
    let book = state.books.get(id).await?;
    let reference = book
        .pdf_ref
        .filter(|r| !r.is_empty())
        .ok_or_else(pdf_missing)?;

    if is_remote(&reference) {
        return Ok(Redirect::temporary(&reference).into_response());
    }

    let path = state
        .books
        .assets()
        .local_path(&reference)
        .ok_or_else(pdf_missing)?;
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(pdf_missing()),
        Err(e) => return Err(e.into()),
    };

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("book.pdf")
        .to_string();
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

/// POST /api/books (multipart)
pub async fn create_book(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    base: BaseUrl,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<BookBody>>)> {
    let (input, uploads) = BookForm::read(multipart?).await?.into_new_book();
    let book = state.books.create(input, uploads, &caller).await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(BookBody {
            book: BookView::new(book, &base),
        })),
    ))
}

/// PUT /api/books/:id (multipart, partial)
pub async fn update_book(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    base: BaseUrl,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Envelope<BookBody>>> {
    let id = parse_record_id(&id, "Book")?;
    let (patch, uploads) = BookForm::read(multipart?).await?.into_patch();
    let book = state.books.update(id, &caller, patch, uploads).await?;

    Ok(Json(Envelope::ok(BookBody {
        book: BookView::new(book, &base),
    })))
}

/// DELETE /api/books/:id
pub async fn delete_book(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<MessageBody>>> {
    let id = parse_record_id(&id, "Book")?;
    state.books.delete(id, &caller).await?;

    Ok(Json(Envelope::ok(MessageBody {
        message: "Book deleted".to_string(),
    })))
}
