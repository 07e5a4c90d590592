//! Book repository: CRUD, ownership enforcement and review aggregation
//!
//! Every operation loads the full book, mutates it in memory and writes the
//! whole record back. Input and ownership checks run before anything is
//! written; asset cleanup after a successful write is best-effort.

use bookcheck_common::models::{Book, BookFilter, BookPatch, Identity, NewBook, Rating, Review};
use bookcheck_common::uuid_utils::parse_record_id;
use bookcheck_common::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{books as store, now};
use crate::storage::{AssetKind, AssetStore, UploadedFile};

/// Result of a review submission
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    /// The review that was inserted or overwritten
    pub review: Review,
    pub reviews: Vec<Review>,
    pub avg_rating: f64,
}

fn book_not_found() -> Error {
    Error::NotFound("Book not found".to_string())
}

/// Book repository over the database pool and the uploads directory
#[derive(Debug, Clone)]
pub struct BookRepository {
    db: SqlitePool,
    assets: AssetStore,
}

impl BookRepository {
    pub fn new(db: SqlitePool, assets: AssetStore) -> Self {
        Self { db, assets }
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    /// All books matching `filter`, newest first
    pub async fn list(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        let books = store::load_all_books(&self.db).await?;
        Ok(books.into_iter().filter(|b| filter.matches(b)).collect())
    }

    pub async fn get(&self, id: Uuid) -> Result<Book> {
        store::load_book(&self.db, id)
            .await?
            .ok_or_else(book_not_found)
    }

    /// Create a book owned by `owner`, storing any uploaded assets first
    pub async fn create(
        &self,
        input: NewBook,
        uploads: Vec<UploadedFile>,
        owner: &Identity,
    ) -> Result<Book> {
        let mut book = Book::create(input, owner.id, now())?;
        for file in &uploads {
            AssetStore::check_extension(file)?;
        }

        for file in &uploads {
            let reference = self.assets.store(file).await?;
            match file.kind {
                AssetKind::Cover => book.cover_ref = Some(reference),
                AssetKind::Pdf => book.pdf_ref = Some(reference),
            }
        }

        store::insert_book(&self.db, &book).await?;
        info!("Book {} ({}) created by {}", book.id, book.title, owner.username);

        Ok(book)
    }

    /// Owner-only partial update
    ///
    /// A replaced cover or PDF has its previous file removed once the new
    /// record is saved; failure to remove it is only logged.
    pub async fn update(
        &self,
        id: Uuid,
        caller: &Identity,
        patch: BookPatch,
        uploads: Vec<UploadedFile>,
    ) -> Result<Book> {
        let mut book = self.get(id).await?;
        book.ensure_owner(caller.id)?;
        for file in &uploads {
            AssetStore::check_extension(file)?;
        }
        book.apply_patch(patch, now())?;

        let mut superseded = Vec::new();
        let mut written = Vec::new();
        for file in &uploads {
            let reference = self.assets.store(file).await?;
            written.push(reference.clone());
            let slot = match file.kind {
                AssetKind::Cover => &mut book.cover_ref,
                AssetKind::Pdf => &mut book.pdf_ref,
            };
            if let Some(old) = slot.replace(reference) {
                superseded.push(old);
            }
        }

        if !store::save_book(&self.db, &book).await? {
            // Deleted underneath us
            for reference in &written {
                self.assets.remove(reference).await;
            }
            return Err(book_not_found());
        }

        for reference in &superseded {
            self.assets.remove(reference).await;
        }

        Ok(book)
    }

    /// Owner-only delete; the book's reviews go with it
    ///
    /// Asset files are removed first, best-effort, and never block the
    /// record deletion.
    pub async fn delete(&self, id: Uuid, caller: &Identity) -> Result<Book> {
        let book = self.get(id).await?;
        book.ensure_owner(caller.id)?;

        self.remove_assets(&book).await;

        if !store::delete_book(&self.db, book.id).await? {
            return Err(book_not_found());
        }
        info!("Deleting book: {}", book.title);

        Ok(book)
    }

    /// Insert or overwrite the caller's review and report the new aggregate
    ///
    /// `book_id` is the raw record id. The rating is checked first, then the
    /// caller, then the book, so a bad rating is reported even for an id
    /// that does not resolve.
    pub async fn upsert_review(
        &self,
        book_id: &str,
        caller: Option<&Identity>,
        rating: &Value,
        comment: Option<String>,
    ) -> Result<ReviewOutcome> {
        let rating = Rating::from_json(rating)?;
        let caller =
            caller.ok_or_else(|| Error::Unauthorized("Unauthorized: login required".to_string()))?;

        let mut book = self.get(parse_record_id(book_id, "Book")?).await?;
        let idx = book.upsert_review(caller, rating, comment, now());

        if !store::save_book(&self.db, &book).await? {
            return Err(book_not_found());
        }

        Ok(ReviewOutcome {
            review: book.reviews[idx].clone(),
            avg_rating: book.avg_rating(),
            reviews: book.reviews,
        })
    }

    /// Best-effort removal of a book's cover and PDF files
    pub async fn remove_assets(&self, book: &Book) {
        for reference in [&book.cover_ref, &book.pdf_ref].into_iter().flatten() {
            self.assets.remove(reference).await;
        }
    }

    /// Delete a book record without an ownership check (maintenance use)
    pub async fn purge(&self, book: &Book) -> Result<bool> {
        self.remove_assets(book).await;
        let deleted = store::delete_book(&self.db, book.id).await?;
        if deleted {
            info!("Purged book {} ({})", book.id, book.title);
        } else {
            warn!("Book {} vanished before purge", book.id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        repo: BookRepository,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let pool = init_memory_pool().await.unwrap();
        Fixture {
            repo: BookRepository::new(pool, AssetStore::new(dir.path())),
            _dir: dir,
        }
    }

    fn user(name: &str) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: name.to_string(),
        }
    }

    fn dune() -> NewBook {
        NewBook {
            title: Some("Dune".into()),
            authors: vec!["F. Herbert".into()],
            ..Default::default()
        }
    }

    fn file(kind: AssetKind, name: &str) -> UploadedFile {
        UploadedFile {
            kind,
            original_name: name.into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_rating_walkthrough() {
        let f = fixture().await;
        let (a, b, c) = (user("a"), user("b"), user("c"));

        let book = f.repo.create(dune(), vec![], &a).await.unwrap();
        assert_eq!(f.repo.get(book.id).await.unwrap().avg_rating(), 0.0);

        let out = f.repo.upsert_review(&book.id.to_string(), Some(&b), &json!(4), None).await.unwrap();
        assert_eq!(out.avg_rating, 4.0);

        let out = f
            .repo
            .upsert_review(&book.id.to_string(), Some(&b), &json!(2), Some("meh".into()))
            .await
            .unwrap();
        assert_eq!(out.reviews.len(), 1);
        assert_eq!(out.review.comment, "meh");
        assert_eq!(out.avg_rating, 2.0);

        let out = f.repo.upsert_review(&book.id.to_string(), Some(&c), &json!(5), None).await.unwrap();
        assert_eq!(out.avg_rating, 3.5);
        assert_eq!(f.repo.get(book.id).await.unwrap().avg_rating(), 3.5);
    }

    #[tokio::test]
    async fn test_invalid_rating_does_not_mutate() {
        let f = fixture().await;
        let owner = user("a");
        let book = f.repo.create(dune(), vec![], &owner).await.unwrap();

        for bad in [json!(0), json!(6), json!("abc"), json!(null)] {
            let err = f
                .repo
                .upsert_review(&book.id.to_string(), Some(&owner), &bad, None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
        }
        assert!(f.repo.get(book.id).await.unwrap().reviews.is_empty());
    }

    #[tokio::test]
    async fn test_review_requires_identity_and_book() {
        let f = fixture().await;
        let owner = user("a");
        let book = f.repo.create(dune(), vec![], &owner).await.unwrap();

        let err = f.repo.upsert_review(&book.id.to_string(), None, &json!(3), None).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let err = f
            .repo
            .upsert_review(&Uuid::new_v4().to_string(), Some(&owner), &json!(3), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = f
            .repo
            .upsert_review("not-a-uuid", Some(&owner), &json!(3), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_review_rating_checked_before_book_lookup() {
        let f = fixture().await;
        let owner = user("a");

        for id in ["not-a-uuid".to_string(), Uuid::new_v4().to_string()] {
            let err = f
                .repo
                .upsert_review(&id, Some(&owner), &json!(9), None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation { .. }), "{id}: {err:?}");
        }
    }

    #[tokio::test]
    async fn test_only_owner_mutates() {
        let f = fixture().await;
        let (a, b) = (user("a"), user("b"));
        let book = f.repo.create(dune(), vec![], &a).await.unwrap();

        let patch = BookPatch {
            title: Some("Stolen".into()),
            ..Default::default()
        };
        let err = f.repo.update(book.id, &b, patch, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let err = f.repo.delete(book.id, &b).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(f.repo.get(book.id).await.unwrap().title, "Dune");

        f.repo.delete(book.id, &a).await.unwrap();
        assert!(matches!(f.repo.get(book.id).await, Err(Error::NotFound(_))));
        assert!(f.repo.list(&BookFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_book_is_not_found() {
        let f = fixture().await;
        let a = user("a");
        let missing = Uuid::new_v4();
        assert!(matches!(
            f.repo.update(missing, &a, BookPatch::default(), vec![]).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(f.repo.delete(missing, &a).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_replacing_cover_removes_old_file() {
        let f = fixture().await;
        let a = user("a");
        let book = f
            .repo
            .create(dune(), vec![file(AssetKind::Cover, "one.png")], &a)
            .await
            .unwrap();
        let old = book.cover_ref.clone().unwrap();
        let old_path = f.repo.assets().local_path(&old).unwrap();
        assert!(old_path.exists());

        let updated = f
            .repo
            .update(book.id, &a, BookPatch::default(), vec![file(AssetKind::Cover, "two.jpg")])
            .await
            .unwrap();
        let new = updated.cover_ref.unwrap();
        assert_ne!(new, old);
        assert!(!old_path.exists());
        assert!(f.repo.assets().local_path(&new).unwrap().exists());
    }

    #[tokio::test]
    async fn test_update_survives_missing_old_file() {
        let f = fixture().await;
        let a = user("a");
        let book = f
            .repo
            .create(dune(), vec![file(AssetKind::Pdf, "a.pdf")], &a)
            .await
            .unwrap();
        let old_path = f.repo.assets().local_path(book.pdf_ref.as_deref().unwrap()).unwrap();
        std::fs::remove_file(&old_path).unwrap();

        let updated = f
            .repo
            .update(book.id, &a, BookPatch::default(), vec![file(AssetKind::Pdf, "b.pdf")])
            .await
            .unwrap();
        assert_ne!(updated.pdf_ref, book.pdf_ref);
    }

    #[tokio::test]
    async fn test_delete_with_one_asset_already_missing() {
        let f = fixture().await;
        let a = user("a");
        let book = f
            .repo
            .create(
                dune(),
                vec![file(AssetKind::Cover, "c.png"), file(AssetKind::Pdf, "b.pdf")],
                &a,
            )
            .await
            .unwrap();
        let cover = f.repo.assets().local_path(book.cover_ref.as_deref().unwrap()).unwrap();
        let pdf = f.repo.assets().local_path(book.pdf_ref.as_deref().unwrap()).unwrap();
        std::fs::remove_file(&cover).unwrap();

        f.repo.delete(book.id, &a).await.unwrap();
        assert!(!pdf.exists());
        assert!(matches!(f.repo.get(book.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bad_upload_rejected_before_write() {
        let f = fixture().await;
        let a = user("a");
        let err = f
            .repo
            .create(dune(), vec![file(AssetKind::Cover, "evil.exe")], &a)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(f.repo.list(&BookFilter::default()).await.unwrap().is_empty());
        assert_eq!(std::fs::read_dir(f.repo.assets().root()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let f = fixture().await;
        let a = user("a");
        f.repo.create(dune(), vec![], &a).await.unwrap();
        f.repo
            .create(
                NewBook {
                    title: Some("Good Omens".into()),
                    authors: vec!["Neil Gaiman, Terry Pratchett".into()],
                    genre: Some("Fantasy".into()),
                    ..Default::default()
                },
                vec![],
                &a,
            )
            .await
            .unwrap();

        let all = f.repo.list(&BookFilter::default()).await.unwrap();
        assert_eq!(all[0].title, "Good Omens");
        assert_eq!(all.len(), 2);

        let pratchett = BookFilter {
            search: Some("PRATCH".into()),
            genre: None,
        };
        assert_eq!(f.repo.list(&pratchett).await.unwrap().len(), 1);

        let fantasy = BookFilter {
            search: None,
            genre: Some("Fantasy".into()),
        };
        let found = f.repo.list(&fantasy).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].authors, vec!["Neil Gaiman", "Terry Pratchett"]);
    }
}
