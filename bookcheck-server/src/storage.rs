//! Uploaded asset storage (cover images and PDFs)
//!
//! Files live flat in the uploads directory and are referenced from book
//! records as `/uploads/<name>`. A reference may also be an absolute
//! `http(s)` URL pointing elsewhere; those are never touched locally.

use bookcheck_common::{Error, Result};
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Public URL prefix under which the uploads directory is served
pub const UPLOADS_PREFIX: &str = "/uploads";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// Which upload slot a file is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Cover,
    Pdf,
}

impl AssetKind {
    /// Multipart field name, also used as the stored filename prefix
    pub fn field_name(self) -> &'static str {
        match self {
            AssetKind::Cover => "cover",
            AssetKind::Pdf => "pdf",
        }
    }

    fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            AssetKind::Cover => IMAGE_EXTENSIONS,
            AssetKind::Pdf => PDF_EXTENSIONS,
        }
    }
}

/// A file received in a request, not yet written anywhere
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub kind: AssetKind,
    pub original_name: String,
    pub bytes: Vec<u8>,
}

/// Handle on the uploads directory
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Validate the extension of an upload without writing it
    pub fn check_extension(file: &UploadedFile) -> Result<String> {
        let ext = Path::new(&file.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) && !PDF_EXTENSIONS.contains(&ext.as_str()) {
            return Err(Error::invalid_field(
                file.kind.field_name(),
                "Only PDF or image files allowed",
            ));
        }
        if !file.kind.allowed_extensions().contains(&ext.as_str()) {
            let message = match file.kind {
                AssetKind::Cover => "Cover must be a JPG or PNG image",
                AssetKind::Pdf => "PDF upload must be a .pdf file",
            };
            return Err(Error::invalid_field(file.kind.field_name(), message));
        }
        Ok(ext)
    }

    /// Write an upload under a collision-resistant name and return its reference
    pub async fn store(&self, file: &UploadedFile) -> Result<String> {
        let ext = Self::check_extension(file)?;
        let name = format!(
            "{}-{}-{}.{}",
            file.kind.field_name(),
            chrono::Utc::now().timestamp_millis(),
            rand::thread_rng().gen_range(0..1_000_000_000u32),
            ext
        );

        tokio::fs::write(self.root.join(&name), &file.bytes).await?;
        debug!("Stored {} upload as {}", file.kind.field_name(), name);

        Ok(format!("{}/{}", UPLOADS_PREFIX, name))
    }

    /// Local file path for a reference, or `None` for remote or foreign references
    pub fn local_path(&self, reference: &str) -> Option<PathBuf> {
        if is_remote(reference) {
            return None;
        }
        let name = reference
            .strip_prefix(UPLOADS_PREFIX)
            .unwrap_or(reference)
            .trim_start_matches('/');

        // Flat directory: anything with a separator or parent hop is not ours
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return None;
        }
        Some(self.root.join(name))
    }

    /// Delete the file behind a reference, never failing
    ///
    /// Remote references and already-missing files are skipped; any other
    /// failure is logged and swallowed.
    pub async fn remove(&self, reference: &str) {
        let Some(path) = self.local_path(reference) else {
            debug!("Skipping removal of non-local asset {}", reference);
            return;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed asset {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Asset {} already gone", path.display())
            }
            Err(e) => warn!("Failed to remove asset {}: {}", path.display(), e),
        }
    }
}

/// True for references that point at another host
pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http")
}

/// Absolute URL for a stored reference
///
/// Empty references yield `None`; remote references pass through unchanged.
pub fn absolute_url(reference: Option<&str>, base_url: &str) -> Option<String> {
    let reference = reference.filter(|r| !r.is_empty())?;
    if is_remote(reference) {
        return Some(reference.to_string());
    }
    Some(format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        reference.trim_start_matches('/')
    ))
}
