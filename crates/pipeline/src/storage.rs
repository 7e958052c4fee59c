//! On-disk layout of draft images.
//!
//! ```text
//! <root>/drafts/<item_id>/Draft-<shortId>-<NN>.<ext>   canonical images
//! <staging>/<uuid>.upload                              bytes awaiting a lock
//! ```
//!
//! Public URLs mirror the canonical layout under a configurable prefix.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

/// Subdirectory of the upload root holding per-item directories.
pub const DRAFTS_DIR: &str = "drafts";

/// Extension given to staged uploads.
const STAGED_EXTENSION: &str = "upload";

/// An upload written to the staging area, not yet bound to a draft.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    /// Name the client sent; only its extension is kept.
    pub original_filename: String,
    pub size: u64,
}

/// Filesystem operations for draft images.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    root: PathBuf,
    staging_dir: PathBuf,
    public_prefix: String,
}

impl ImageStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        public_prefix: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            staging_dir: staging_dir.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Write uploaded bytes to a fresh staging file.
    pub async fn stage(&self, original_filename: &str, bytes: &[u8]) -> io::Result<StagedFile> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let path = self
            .staging_dir
            .join(format!("{}.{STAGED_EXTENSION}", Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await?;
        Ok(StagedFile {
            path,
            original_filename: original_filename.to_string(),
            size: bytes.len() as u64,
        })
    }

    /// Delete a staged file. Missing files are ignored.
    pub async fn discard(&self, staged: &StagedFile) {
        match tokio::fs::remove_file(&staged.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %staged.path.display(),
                error = %e,
                "Failed to discard staged upload",
            ),
        }
    }

    pub fn item_dir(&self, item_id: &str) -> PathBuf {
        self.root.join(DRAFTS_DIR).join(item_id)
    }

    pub fn image_path(&self, item_id: &str, filename: &str) -> PathBuf {
        self.item_dir(item_id).join(filename)
    }

    /// Public locator of a canonical image.
    pub fn public_url(&self, item_id: &str, filename: &str) -> String {
        format!("{}/{DRAFTS_DIR}/{item_id}/{filename}", self.public_prefix)
    }

    pub async fn ensure_item_dir(&self, item_id: &str) -> io::Result<PathBuf> {
        let dir = self.item_dir(item_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Move a staged file to `dest`.
    ///
    /// Falls back to copy and delete when a rename is not possible, e.g.
    /// when staging and upload root live on different filesystems.
    pub async fn move_into_place(&self, staged: &StagedFile, dest: &Path) -> io::Result<()> {
        match tokio::fs::rename(&staged.path, dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "Rename failed, copying staged upload");
                tokio::fs::copy(&staged.path, dest).await?;
                tokio::fs::remove_file(&staged.path).await?;
                Ok(())
            }
        }
    }

    /// Delete a canonical image. Returns `false` if it did not exist.
    pub async fn remove_image(&self, item_id: &str, filename: &str) -> io::Result<bool> {
        remove_if_exists(&self.image_path(item_id, filename)).await
    }

    /// Remove the item directory if it is empty.
    pub async fn prune_item_dir(&self, item_id: &str) -> io::Result<bool> {
        match tokio::fs::remove_dir(self.item_dir(item_id)).await {
            Ok(()) => Ok(true),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove the item directory and everything in it.
    pub async fn remove_item_dir(&self, item_id: &str) -> io::Result<bool> {
        match tokio::fs::remove_dir_all(self.item_dir(item_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Names of the regular files in the item directory, sorted.
    pub async fn list_item_files(&self, item_id: &str) -> io::Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.item_dir(item_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete staged uploads last modified more than `older_than` ago.
    ///
    /// These are left behind by requests that died between staging and
    /// moving. Returns the number of files removed.
    pub async fn sweep_staging(&self, older_than: Duration) -> io::Result<u64> {
        let mut entries = match tokio::fs::read_dir(&self.staging_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut removed = 0u64;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STAGED_EXTENSION) {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= older_than && remove_if_exists(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
