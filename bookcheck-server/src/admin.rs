//! Maintenance operations behind the `bookcheck-admin` binary
//!
//! These work straight on the database with no caller identity, so there are
//! no ownership checks. Every operation honours `dry_run` by computing its
//! result without writing anything.

use bookcheck_common::models::{Book, Review, DEFAULT_DESCRIPTION};
use bookcheck_common::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::{books as store, now, users};
use crate::services::BookRepository;

/// Username prefix marking throwaway accounts
pub const TEST_USERNAME_PREFIX: &str = "test";

const TEST_COMMENT_MARKERS: &[&str] = &["test", "good book", "great book"];
const LIST_DESCRIPTION_CHARS: usize = 200;

/// True for an empty description or a "no description" placeholder
pub fn is_placeholder_description(description: &str) -> bool {
    let text = description.trim().trim_end_matches('.').trim_end().to_lowercase();
    text.is_empty()
        || text == "no description"
        || text == DEFAULT_DESCRIPTION.trim_end_matches('.').to_lowercase()
}

/// Generated description for a book that has none
pub fn generated_description(book: &Book) -> String {
    let genre = book
        .genre
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .unwrap_or("book");
    format!(
        "Discover \"{}\" by {}. A compelling {} that readers will enjoy.",
        book.title,
        book.authors.join(", "),
        genre
    )
}

/// Reviews left by test accounts or carrying stock test comments
pub fn is_test_review(review: &Review) -> bool {
    if review
        .username
        .to_lowercase()
        .starts_with(TEST_USERNAME_PREFIX)
    {
        return true;
    }
    let comment = review.comment.to_lowercase();
    TEST_COMMENT_MARKERS.iter().any(|m| comment.contains(m))
}

/// One line per book for `list`: `id | title | owner | description`
pub fn summary_line(book: &Book) -> String {
    let collapsed = book.description.split_whitespace().collect::<Vec<_>>().join(" ");
    let description: String = collapsed.chars().take(LIST_DESCRIPTION_CHARS).collect();
    format!("{} | {} | {} | {}", book.id, book.title, book.owner_id, description)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub books_scanned: usize,
    pub reviews_removed: usize,
    pub books_touched: usize,
    pub books_deleted: usize,
}

/// Maintenance tasks over one database
pub struct Maintenance {
    db: SqlitePool,
    books: BookRepository,
    dry_run: bool,
}

impl Maintenance {
    pub fn new(db: SqlitePool, books: BookRepository, dry_run: bool) -> Self {
        Self { db, books, dry_run }
    }

    pub async fn list(&self) -> Result<Vec<Book>> {
        store::load_all_books(&self.db).await
    }

    /// Replace placeholder descriptions; returns the books that were (or would be) changed
    pub async fn fill_descriptions(&self) -> Result<Vec<Book>> {
        let mut changed = Vec::new();

        for mut book in store::load_all_books(&self.db).await? {
            if !is_placeholder_description(&book.description) {
                continue;
            }
            book.description = generated_description(&book);
            book.updated_at = now();
            if !self.dry_run {
                store::save_book(&self.db, &book).await?;
            }
            changed.push(book);
        }

        info!("Filled {} descriptions (dry run: {})", changed.len(), self.dry_run);
        Ok(changed)
    }

    /// Strip test reviews, and with `delete_books` also remove books owned by test accounts
    pub async fn purge_test_data(&self, delete_books: bool) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();

        for mut book in store::load_all_books(&self.db).await? {
            report.books_scanned += 1;
            let before = book.reviews.len();
            book.reviews.retain(|r| !is_test_review(r));
            let removed = before - book.reviews.len();
            if removed == 0 {
                continue;
            }

            report.reviews_removed += removed;
            report.books_touched += 1;
            if !self.dry_run {
                book.updated_at = now();
                store::save_book(&self.db, &book).await?;
            }
        }

        if delete_books {
            let owners = users::ids_with_username_prefix(&self.db, TEST_USERNAME_PREFIX).await?;
            for book in store::load_books_by_owners(&self.db, &owners).await? {
                if self.dry_run || self.books.purge(&book).await? {
                    report.books_deleted += 1;
                }
            }
        }

        info!("Purge finished: {:?} (dry run: {})", report, self.dry_run);
        Ok(report)
    }

    /// Delete books whose owner has no user record; returns them
    pub async fn delete_orphans(&self) -> Result<Vec<Book>> {
        let orphans = store::load_orphaned_books(&self.db).await?;
        let mut deleted = Vec::new();

        for book in orphans {
            if self.dry_run || self.books.purge(&book).await? {
                deleted.push(book);
            }
        }

        info!("Deleted {} orphaned books (dry run: {})", deleted.len(), self.dry_run);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::storage::AssetStore;
    use bookcheck_common::models::{NewBook, Rating, User};
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn review(username: &str, comment: &str) -> Review {
        let at = Utc::now();
        Review {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            rating: Rating::try_from(Rating::MAX).unwrap(),
            comment: comment.to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    fn book(title: &str, genre: Option<&str>, description: Option<&str>, owner: Uuid) -> Book {
        Book::create(
            NewBook {
                title: Some(title.to_string()),
                authors: vec!["Ann Leckie".to_string()],
                genre: genre.map(str::to_string),
                description: description.map(str::to_string),
            },
            owner,
            now(),
        )
        .unwrap()
    }

    async fn user(pool: &SqlitePool, username: &str) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "x".to_string(),
            created_at: now(),
        };
        users::insert_user(pool, &user).await.unwrap();
        user.id
    }

    async fn maintenance(dry_run: bool) -> (Maintenance, SqlitePool, TempDir) {
        let dir = TempDir::new().unwrap();
        let pool = init_memory_pool().await.unwrap();
        let repo = BookRepository::new(pool.clone(), AssetStore::new(dir.path()));
        (Maintenance::new(pool.clone(), repo, dry_run), pool, dir)
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder_description(""));
        assert!(is_placeholder_description("   "));
        assert!(is_placeholder_description("No description provided."));
        assert!(is_placeholder_description("no description..."));
        assert!(is_placeholder_description("NO DESCRIPTION"));
        assert!(!is_placeholder_description("A quiet novel."));
    }

    #[test]
    fn test_generated_description() {
        let owner = Uuid::new_v4();
        let with_genre = book("Ancillary Justice", Some("Sci-Fi"), None, owner);
        assert_eq!(
            generated_description(&with_genre),
            "Discover \"Ancillary Justice\" by Ann Leckie. A compelling Sci-Fi that readers will enjoy."
        );

        let without = book("Provenance", None, None, owner);
        assert!(generated_description(&without).contains("A compelling book that"));
    }

    #[test]
    fn test_test_review_markers() {
        assert!(is_test_review(&review("TestUser", "fine")));
        assert!(is_test_review(&review("carol", "Great Book!")));
        assert!(is_test_review(&review("carol", "just a test")));
        assert!(!is_test_review(&review("carol", "Loved the ending")));
    }

    #[test]
    fn test_summary_line_truncates() {
        let mut b = book("Long", None, Some("word\n\n  word"), Uuid::new_v4());
        assert!(summary_line(&b).ends_with("| word word"));

        b.description = "x".repeat(500);
        let line = summary_line(&b);
        assert!(line.ends_with(&"x".repeat(200)));
        assert!(!line.ends_with(&"x".repeat(201)));
    }

    #[tokio::test]
    async fn test_fill_descriptions_respects_dry_run() {
        let (dry, pool, _dir) = maintenance(true).await;
        let owner = user(&pool, "alice").await;
        let blank = book("Blank", None, None, owner);
        let kept = book("Kept", None, Some("Already described"), owner);
        store::insert_book(&pool, &blank).await.unwrap();
        store::insert_book(&pool, &kept).await.unwrap();

        let changed = dry.fill_descriptions().await.unwrap();
        assert_eq!(changed.len(), 1);
        let stored = store::load_book(&pool, blank.id).await.unwrap().unwrap();
        assert_eq!(stored.description, DEFAULT_DESCRIPTION);

        let wet = Maintenance::new(pool.clone(), dry.books.clone(), false);
        wet.fill_descriptions().await.unwrap();
        let stored = store::load_book(&pool, blank.id).await.unwrap().unwrap();
        assert!(stored.description.starts_with("Discover \"Blank\""));
        let untouched = store::load_book(&pool, kept.id).await.unwrap().unwrap();
        assert_eq!(untouched.description, "Already described");
    }

    #[tokio::test]
    async fn test_purge_test_data() {
        let (m, pool, _dir) = maintenance(false).await;
        let alice = user(&pool, "alice").await;
        let tester = user(&pool, "tester1").await;

        let mut reviewed = book("Reviewed", None, None, alice);
        reviewed.reviews = vec![review("bob", "Loved it"), review("test_bot", "ok"), review("carol", "good book")];
        store::insert_book(&pool, &reviewed).await.unwrap();
        let junk = book("Junk", None, None, tester);
        store::insert_book(&pool, &junk).await.unwrap();

        let report = m.purge_test_data(true).await.unwrap();
        assert_eq!(
            report,
            PurgeReport {
                books_scanned: 2,
                reviews_removed: 2,
                books_touched: 1,
                books_deleted: 1,
            }
        );

        let stored = store::load_book(&pool, reviewed.id).await.unwrap().unwrap();
        assert_eq!(stored.reviews.len(), 1);
        assert_eq!(stored.reviews[0].username, "bob");
        assert!(store::load_book(&pool, junk.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_orphans() {
        let (m, pool, _dir) = maintenance(false).await;
        let alice = user(&pool, "alice").await;
        let owned = book("Owned", None, None, alice);
        let orphan = book("Orphan", None, None, Uuid::new_v4());
        store::insert_book(&pool, &owned).await.unwrap();
        store::insert_book(&pool, &orphan).await.unwrap();

        let deleted = m.delete_orphans().await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, orphan.id);
        assert!(store::load_book(&pool, owned.id).await.unwrap().is_some());
        assert!(store::load_book(&pool, orphan.id).await.unwrap().is_none());
    }
}
