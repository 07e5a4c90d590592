//! # BookCheck Common Library
//!
//! Shared code for the BookCheck server and admin tooling:
//! - Domain model (books, embedded reviews, users) and the rating aggregate
//! - Error taxonomy
//! - Configuration loading
//! - Credential primitives and API envelope types

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod uuid_utils;

pub use config::Config;
pub use error::{Error, FieldError, Result};
