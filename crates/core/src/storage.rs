//! Raw-bytes storage sink contract and the local-disk implementation.
//!
//! The orchestrator only ever calls [`StorageSink::save`]; object-storage
//! back-ends plug in behind the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Category for media supplied by the caller.
pub const CATEGORY_INPUTS: &str = "inputs";

/// Category for media produced by a provider.
pub const CATEGORY_OUTPUTS: &str = "outputs";

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Options for a single [`StorageSink::save`] call.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub category: String,
    /// File extension without the leading dot.
    pub extension: String,
    pub base_name: String,
    /// Return the existing locator instead of rewriting the object.
    pub skip_if_exists: bool,
}

impl SaveOptions {
    pub fn new(
        category: impl Into<String>,
        base_name: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            extension: extension.into(),
            base_name: base_name.into(),
            skip_if_exists: false,
        }
    }

    pub fn skip_if_exists(mut self) -> Self {
        self.skip_if_exists = true;
        self
    }

    fn file_name(&self) -> String {
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() {
            self.base_name.clone()
        } else {
            format!("{}.{ext}", self.base_name)
        }
    }
}

/// Errors from a storage sink.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid storage name: {0}")]
    InvalidName(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persists raw bytes and returns an opaque locator.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn save(&self, bytes: &[u8], options: &SaveOptions) -> Result<String, StorageError>;
}

// ---------------------------------------------------------------------------
// Local disk
// ---------------------------------------------------------------------------

/// Writes objects to `{root}/{category}/{base_name}.{ext}`.
///
/// Locators are the storage-relative path, prefixed with `public_prefix`
/// when one is configured (e.g. a CDN or static-file URL).
pub struct LocalDiskStorage {
    root: PathBuf,
    public_prefix: String,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locator(&self, category: &str, file_name: &str) -> String {
        if self.public_prefix.is_empty() {
            format!("{category}/{file_name}")
        } else {
            format!("{}/{category}/{file_name}", self.public_prefix)
        }
    }
}

/// A path segment must be non-empty and free of separators and `..`.
fn validate_segment(segment: &str) -> Result<(), StorageError> {
    if segment.is_empty()
        || segment == "."
        || segment.contains("..")
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(StorageError::InvalidName(segment.to_string()));
    }
    Ok(())
}

#[async_trait]
impl StorageSink for LocalDiskStorage {
    async fn save(&self, bytes: &[u8], options: &SaveOptions) -> Result<String, StorageError> {
        validate_segment(&options.category)?;
        let file_name = options.file_name();
        validate_segment(&file_name)?;

        let dir = self.root.join(&options.category);
        let path = dir.join(&file_name);
        let locator = self.locator(&options.category, &file_name);

        if options.skip_if_exists && tokio::fs::try_exists(&path).await? {
            tracing::debug!(locator = %locator, "Object already stored, skipping write");
            return Ok(locator);
        }

        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(locator = %locator, size = bytes.len(), "Stored object");

        Ok(locator)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
