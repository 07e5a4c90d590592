//! Domain model: books with embedded reviews, and users

pub mod book;
pub mod user;

pub use book::{
    average_rating, normalize_authors, Book, BookFilter, BookPatch, NewBook, Rating, Review,
    DEFAULT_DESCRIPTION,
};
pub use user::{Identity, PublicUser, User};
