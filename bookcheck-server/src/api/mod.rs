//! HTTP API handlers

pub mod auth;
pub mod books;
pub mod buildinfo;
pub mod health;
pub mod reviews;

pub use auth::{login, register, CurrentUser};
pub use books::{create_book, delete_book, download_pdf, get_book, list_books, update_book, BookView};
pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use reviews::post_review;
