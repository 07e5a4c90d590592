//! bookcheck-server library: book catalogue and review HTTP service

use axum::extract::DefaultBodyLimit;
use axum::Router;
use bookcheck_common::api::auth::TokenSigner;
use bookcheck_common::Config;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod api;
pub mod db;
pub mod error;
pub mod services;
pub mod storage;

use services::{AccountService, BookRepository};
use storage::{AssetStore, UPLOADS_PREFIX};

/// Largest accepted request body (multipart uploads included)
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub books: BookRepository,
    pub accounts: AccountService,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        let assets = AssetStore::new(config.uploads_dir.clone());
        let signer = TokenSigner::new(&config.token_secret, config.token_ttl_secs);
        Self {
            books: BookRepository::new(db.clone(), assets),
            accounts: AccountService::new(db, signer),
            config: Arc::new(config),
        }
    }
}

/// Build application router
///
/// Reads, health and auth endpoints are public. Handlers that change data
/// take a `CurrentUser` and answer 401 without a valid bearer token.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let uploads = ServeDir::new(&state.config.uploads_dir);

    let books = Router::new()
        .route("/api/books", get(api::list_books).post(api::create_book))
        .route(
            "/api/books/:id",
            get(api::get_book).put(api::update_book).delete(api::delete_book),
        )
        .route("/api/books/:id/download", get(api::download_pdf))
        .route("/api/books/:id/reviews", post(api::post_review));

    let auth = Router::new()
        .route("/api/auth/register", post(api::register))
        .route("/api/auth/login", post(api::login));

    Router::new()
        .merge(books)
        .merge(auth)
        .merge(api::health_routes())
        .route("/api/buildinfo", get(api::get_build_info))
        .nest_service(UPLOADS_PREFIX, uploads)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
