//! Book aggregate and its embedded reviews
//!
//! A book owns its review list outright: reviews are loaded, mutated and
//! written back together with the book. The average rating is always
//! derived from the current list and never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::Identity;
use crate::{Error, Result};

/// Description given to books created without one
pub const DEFAULT_DESCRIPTION: &str = "No description provided.";

/// A reader's rating of a book, always within 1..=5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn value(self) -> u8 {
        self.0
    }

    /// Coerce a JSON value into a rating
    ///
    /// Accepts whole numbers given as JSON numbers or numeric strings
    /// ("4", " 5 ", "4.0"). Rejects null, booleans, fractional numbers,
    /// NaN-like strings and anything outside 1..=5.
    pub fn from_json(value: &Value) -> Result<Self> {
        let whole = |f: f64| (f.is_finite() && f.fract() == 0.0).then_some(f as i64);
        let n = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole))
            }
            _ => None,
        };

        n.ok_or_else(rating_error).and_then(Rating::try_from)
    }
}

fn rating_error() -> Error {
    Error::invalid_field("rating", "Rating must be between 1 and 5")
}

impl TryFrom<i64> for Rating {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(rating_error())
        }
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> i64 {
        rating.0 as i64
    }
}

/// One reader's review, embedded in a [`Book`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub user_id: Uuid,
    /// Username at the time the review was first submitted
    pub username: String,
    pub rating: Rating,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Average of all ratings rounded to one decimal place, 0 when there are none
pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    (sum as f64 * 10.0 / reviews.len() as f64).round() / 10.0
}

/// Split author inputs on commas, trim, and drop empty entries
///
/// Accepts either a single comma-separated string or a list of strings
/// (each of which may itself contain commas).
pub fn normalize_authors<I, S>(inputs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    inputs
        .into_iter()
        .flat_map(|s| {
            s.as_ref()
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Fields for a new book, as received from the caller
#[derive(Debug, Clone, Default)]
pub struct NewBook {
    pub title: Option<String>,
    /// Raw author inputs, normalised by [`normalize_authors`]
    pub authors: Vec<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
}

/// Partial update: `None` (or a blank string) leaves the field unchanged
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub genre: Option<String>,
    pub description: Option<String>,
}

/// Book record as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub genre: Option<String>,
    pub description: String,
    /// Local path (`/uploads/...`) or absolute URL of the cover image
    pub cover_ref: Option<String>,
    /// Local path (`/uploads/...`) or absolute URL of the PDF
    pub pdf_ref: Option<String>,
    pub owner_id: Uuid,
    pub reviews: Vec<Review>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Validate caller input and build a fresh book owned by `owner_id`
    pub fn create(input: NewBook, owner_id: Uuid, now: DateTime<Utc>) -> Result<Self> {
        let title = non_blank(input.title);
        let authors = normalize_authors(&input.authors);

        let mut errors = Vec::new();
        if title.is_none() {
            errors.push(crate::FieldError::new("title", "Title is required"));
        }
        if authors.is_empty() {
            errors.push(crate::FieldError::new("authors", "At least one author is required"));
        }
        let title = match title {
            Some(title) if errors.is_empty() => title,
            _ => {
                return Err(Error::Validation {
                    message: "Title and author are required".to_string(),
                    errors,
                })
            }
        };

        Ok(Self {
            id: Uuid::new_v4(),
            title,
            authors,
            genre: non_blank(input.genre),
            description: non_blank(input.description)
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            cover_ref: None,
            pdf_ref: None,
            owner_id,
            reviews: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Derived average rating; see [`average_rating`]
    pub fn avg_rating(&self) -> f64 {
        average_rating(&self.reviews)
    }

    pub fn is_owned_by(&self, caller: Uuid) -> bool {
        self.owner_id == caller
    }

    /// Ownership gate shared by every owner-only mutation
    pub fn ensure_owner(&self, caller: Uuid) -> Result<()> {
        if self.is_owned_by(caller) {
            Ok(())
        } else {
            Err(Error::Forbidden("Not authorized".to_string()))
        }
    }

    /// Apply the supplied fields of `patch`
    ///
    /// Validation happens before any field is touched, so a rejected patch
    /// leaves the book unchanged.
    pub fn apply_patch(&mut self, patch: BookPatch, now: DateTime<Utc>) -> Result<()> {
        let title = non_blank(patch.title);
        let authors = match patch.authors {
            Some(raw) if raw.iter().any(|a| !a.trim().is_empty()) => {
                let authors = normalize_authors(&raw);
                if authors.is_empty() {
                    return Err(Error::invalid_field(
                        "authors",
                        "At least one author is required",
                    ));
                }
                Some(authors)
            }
            _ => None,
        };

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(authors) = authors {
            self.authors = authors;
        }
        if let Some(genre) = non_blank(patch.genre) {
            self.genre = Some(genre);
        }
        if let Some(description) = non_blank(patch.description) {
            self.description = description;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Insert or overwrite the caller's review, returning its index
    ///
    /// At most one review exists per user. A repeat submission keeps the
    /// original position, username and creation time and replaces rating,
    /// comment and update time.
    pub fn upsert_review(
        &mut self,
        reviewer: &Identity,
        rating: Rating,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> usize {
        let comment = comment.unwrap_or_default();
        self.updated_at = now;

        if let Some(idx) = self.reviews.iter().position(|r| r.user_id == reviewer.id) {
            let review = &mut self.reviews[idx];
            review.rating = rating;
            review.comment = comment;
            review.updated_at = now;
            return idx;
        }

        self.reviews.push(Review {
            user_id: reviewer.id,
            username: reviewer.username.clone(),
            rating,
            comment,
            created_at: now,
            updated_at: now,
        });
        self.reviews.len() - 1
    }
}

/// List filter: free-text search over title and authors, exact genre
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookFilter {
    pub search: Option<String>,
    pub genre: Option<String>,
}

impl BookFilter {
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(genre) = self.genre.as_deref().filter(|g| !g.is_empty()) {
            if book.genre.as_deref() != Some(genre) {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                book.title.to_lowercase().contains(&needle)
                    || book
                        .authors
                        .iter()
                        .any(|a| a.to_lowercase().contains(&needle))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn identity(name: &str) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: name.to_string(),
        }
    }

    fn dune(owner: Uuid) -> Book {
        Book::create(
            NewBook {
                title: Some("Dune".into()),
                authors: vec!["F. Herbert".into()],
                ..Default::default()
            },
            owner,
            Utc::now(),
        )
        .unwrap()
    }

    fn rating(n: i64) -> Rating {
        Rating::try_from(n).unwrap()
    }

    #[test]
    fn test_average_of_empty_list_is_zero() {
        assert_eq!(average_rating(&[]), 0.0);
    }

    #[test]
    fn test_average_rounds_to_one_decimal() {
        let mut book = dune(Uuid::new_v4());
        let now = Utc::now();
        for n in [5, 4, 4] {
            book.upsert_review(&identity("r"), rating(n), None, now);
        }
        // 13 / 3 = 4.333..
        assert_eq!(book.avg_rating(), 4.3);

        book.upsert_review(&identity("r"), rating(5), None, now);
        // 18 / 4 = 4.5
        assert_eq!(book.avg_rating(), 4.5);
    }

    #[test]
    fn test_review_scenario_from_rating_walkthrough() {
        let owner = identity("a");
        let b = identity("b");
        let c = identity("c");
        let mut book = dune(owner.id);
        assert_eq!(book.avg_rating(), 0.0);

        let t0 = Utc::now();
        book.upsert_review(&b, rating(4), None, t0);
        assert_eq!(book.avg_rating(), 4.0);

        let t1 = t0 + Duration::seconds(5);
        let idx = book.upsert_review(&b, rating(2), Some("meh".into()), t1);
        assert_eq!(idx, 0);
        assert_eq!(book.reviews.len(), 1);
        assert_eq!(book.avg_rating(), 2.0);

        book.upsert_review(&c, rating(5), None, t1);
        assert_eq!(book.avg_rating(), 3.5);
    }

    #[test]
    fn test_repeat_review_keeps_position_and_created_at() {
        let mut book = dune(Uuid::new_v4());
        let first = identity("first");
        let second = identity("second");
        let t0 = Utc::now();

        book.upsert_review(&first, rating(3), Some("ok".into()), t0);
        book.upsert_review(&second, rating(4), None, t0);

        let t1 = t0 + Duration::minutes(1);
        let idx = book.upsert_review(&first, rating(1), Some("worse on reread".into()), t1);

        assert_eq!(idx, 0);
        assert_eq!(book.reviews.len(), 2);
        let review = &book.reviews[0];
        assert_eq!(review.user_id, first.id);
        assert_eq!(review.rating, rating(1));
        assert_eq!(review.comment, "worse on reread");
        assert_eq!(review.created_at, t0);
        assert_eq!(review.updated_at, t1);
        assert_eq!(
            book.reviews.iter().filter(|r| r.user_id == first.id).count(),
            1
        );
    }

    #[test]
    fn test_rating_coercion() {
        assert_eq!(Rating::from_json(&json!(4)).unwrap().value(), 4);
        assert_eq!(Rating::from_json(&json!("5")).unwrap().value(), 5);
        assert_eq!(Rating::from_json(&json!(3.0)).unwrap().value(), 3);
        assert_eq!(Rating::from_json(&json!("4.0")).unwrap().value(), 4);
        assert_eq!(Rating::from_json(&json!(" 2.00 ")).unwrap().value(), 2);

        for bad in [
            json!(0),
            json!(6),
            json!("abc"),
            json!(null),
            json!(2.5),
            json!("2.5"),
            json!("6.0"),
            json!(true),
            json!("NaN"),
            json!("inf"),
        ] {
            assert!(
                matches!(Rating::from_json(&bad), Err(Error::Validation { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_rating_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_value::<Rating>(json!(7)).is_err());
        assert_eq!(serde_json::from_value::<Rating>(json!(1)).unwrap().value(), 1);
    }

    #[test]
    fn test_normalize_authors() {
        assert_eq!(
            normalize_authors(["Neil Gaiman, Terry Pratchett"]),
            vec!["Neil Gaiman", "Terry Pratchett"]
        );
        assert_eq!(
            normalize_authors(vec![" A ".to_string(), "".to_string(), "B,,C".to_string()]),
            vec!["A", "B", "C"]
        );
        assert!(normalize_authors([" , "]).is_empty());
    }

    #[test]
    fn test_create_requires_title_and_authors() {
        let owner = Uuid::new_v4();
        let missing_title = Book::create(
            NewBook {
                title: Some("  ".into()),
                authors: vec!["X".into()],
                ..Default::default()
            },
            owner,
            Utc::now(),
        );
        assert!(matches!(missing_title, Err(Error::Validation { .. })));

        let missing_authors = Book::create(
            NewBook {
                title: Some("Dune".into()),
                authors: vec![", ,".into()],
                ..Default::default()
            },
            owner,
            Utc::now(),
        );
        match missing_authors {
            Err(Error::Validation { errors, .. }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "authors");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_create_defaults() {
        let owner = Uuid::new_v4();
        let book = dune(owner);
        assert_eq!(book.description, DEFAULT_DESCRIPTION);
        assert_eq!(book.genre, None);
        assert!(book.reviews.is_empty());
        assert!(book.is_owned_by(owner));
    }

    #[test]
    fn test_ensure_owner() {
        let owner = Uuid::new_v4();
        let book = dune(owner);
        assert!(book.ensure_owner(owner).is_ok());
        assert!(matches!(
            book.ensure_owner(Uuid::new_v4()),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_patch_only_touches_supplied_fields() {
        let mut book = dune(Uuid::new_v4());
        let before = book.clone();

        book.apply_patch(
            BookPatch {
                title: Some("".into()),
                genre: Some("Sci-Fi".into()),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(book.title, before.title);
        assert_eq!(book.authors, before.authors);
        assert_eq!(book.genre.as_deref(), Some("Sci-Fi"));
        assert_eq!(book.description, before.description);
    }

    #[test]
    fn test_patch_rejects_empty_normalised_authors_without_mutating() {
        let mut book = dune(Uuid::new_v4());
        let before = book.clone();
        let result = book.apply_patch(
            BookPatch {
                title: Some("Dune Messiah".into()),
                authors: Some(vec![", ,".into()]),
                ..Default::default()
            },
            Utc::now(),
        );
        assert!(matches!(result, Err(Error::Validation { .. })));
        assert_eq!(book, before);
    }

    #[test]
    fn test_filter_matches_title_author_and_genre() {
        let mut book = dune(Uuid::new_v4());
        book.genre = Some("Sci-Fi".into());

        let by_title = BookFilter {
            search: Some("dUn".into()),
            genre: None,
        };
        let by_author = BookFilter {
            search: Some("herbert".into()),
            genre: None,
        };
        let wrong_genre = BookFilter {
            search: None,
            genre: Some("sci-fi".into()),
        };
        let right_genre = BookFilter {
            search: Some("".into()),
            genre: Some("Sci-Fi".into()),
        };

        assert!(by_title.matches(&book));
        assert!(by_author.matches(&book));
        assert!(!wrong_genre.matches(&book));
        assert!(right_genre.matches(&book));
        assert!(BookFilter::default().matches(&book));
    }

    #[test]
    fn test_review_serializes_camel_case() {
        let mut book = dune(Uuid::new_v4());
        book.upsert_review(&identity("b"), rating(4), None, Utc::now());
        let value = serde_json::to_value(&book.reviews[0]).unwrap();
        assert_eq!(value["rating"], 4);
        assert_eq!(value["comment"], "");
        assert!(value["userId"].is_string());
        assert!(value["createdAt"].is_string());
    }
}
