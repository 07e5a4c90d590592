//! Domain services sitting between the HTTP handlers and the database

pub mod accounts;
pub mod books;

pub use accounts::{AccountService, Session};
pub use books::{BookRepository, ReviewOutcome};
