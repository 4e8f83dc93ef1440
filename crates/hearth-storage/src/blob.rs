//! Content-addressable blob storage
//!
//! Blobs are stored under `{root}/{yyyy}/{mm}/{digest}.{ext}`. A path that
//! already exists is treated as the same content and never rewritten, so
//! storing identical bytes twice in one month costs a single file.

use hearth_core::{BlobPath, Clock, ContentHasher, CoreError, SystemClock, mime};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::models::{BlobStats, StoredBlob};
use crate::{Result, StorageError};

/// Default upper bound for a single blob (50 MiB)
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 50 * 1024 * 1024;

/// Default JPEG quality used when re-encoding images
pub const DEFAULT_IMAGE_QUALITY: u8 = 80;

const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".tmp";

/// Temp files younger than this may still belong to a running `store`
pub const TEMP_FILE_GRACE: Duration = Duration::from_secs(10 * 60);
const IMAGE_EXTENSION: &str = "jpg";

/// Construction-time parameters of a [`BlobStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobStoreOptions {
    /// Largest accepted payload, in bytes (inclusive)
    pub max_blob_size: u64,
    /// JPEG quality for [`BlobStore::store_image`], 1..=100
    pub image_quality: u8,
    /// Digest length in hex characters
    pub digest_len: usize,
    /// Compare bytes before treating an existing path as a duplicate
    pub verify_on_dedup: bool,
}

impl Default for BlobStoreOptions {
    fn default() -> Self {
        Self {
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
            image_quality: DEFAULT_IMAGE_QUALITY,
            digest_len: hearth_core::DEFAULT_DIGEST_HEX_LEN,
            verify_on_dedup: false,
        }
    }
}

impl BlobStoreOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_blob_size == 0 {
            return Err(CoreError::InvalidConfig("max_blob_size must be positive".into()).into());
        }
        if !(1..=100).contains(&self.image_quality) {
            return Err(CoreError::InvalidConfig(format!(
                "image_quality must be between 1 and 100, got {}",
                self.image_quality
            ))
            .into());
        }
        ContentHasher::new(self.digest_len)?;
        Ok(())
    }
}

/// Blob store for photos, receipts and other attachments
#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    hasher: ContentHasher,
    options: BlobStoreOptions,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("root", &self.root)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BlobStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        Self::with_options(root, BlobStoreOptions::default())
    }

    pub fn with_options(root: PathBuf, options: BlobStoreOptions) -> Result<Self> {
        options.validate()?;
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            hasher: ContentHasher::new(options.digest_len)?,
            options,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source used to pick the month shard
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &BlobStoreOptions {
        &self.options
    }

    /// Store content and return where it lives.
    ///
    /// The extension comes from `filename` when it has one, otherwise from
    /// `mime_type`.
    pub async fn store(
        &self,
        content: &[u8],
        mime_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<StoredBlob> {
        self.check_size(content.len())?;
        let extension = mime::resolve_extension(filename, mime_type);
        self.write_blob(content, &extension).await
    }

    /// Re-encode `image` as JPEG and store the result.
    ///
    /// The stored extension is always `jpg`; `filename` is only recorded in logs.
    pub async fn store_image(
        &self,
        image: &DynamicImage,
        filename: Option<&str>,
    ) -> Result<StoredBlob> {
        let encoded = encode_jpeg(image, self.options.image_quality)?;
        tracing::debug!(
            filename = filename.unwrap_or("<unnamed>"),
            width = image.width(),
            height = image.height(),
            encoded_bytes = encoded.len(),
            "Re-encoded image"
        );
        self.check_size(encoded.len())?;
        self.write_blob(&encoded, IMAGE_EXTENSION).await
    }

    /// Retrieve content by relative path
    pub async fn retrieve(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.locate(path)?;
        fs::read(&full).await.map_err(|e| not_found_or(e, path))
    }

    /// Retrieve and decode an image
    pub async fn retrieve_image(&self, path: &str) -> Result<DynamicImage> {
        let bytes = self.retrieve(path).await?;
        image::load_from_memory(&bytes).map_err(|e| StorageError::DecodingFailed(e.to_string()))
    }

    /// Remove a blob. Empty month directories are left in place.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let full = self.locate(path)?;
        fs::remove_file(&full)
            .await
            .map_err(|e| not_found_or(e, path))?;
        tracing::debug!(path, "Deleted blob");
        Ok(())
    }

    /// Check if blob exists
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.locate(path)?;
        Ok(fs::try_exists(&full).await?)
    }

    /// Size of a stored blob without reading it
    pub async fn size(&self, path: &str) -> Result<u64> {
        let full = self.locate(path)?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|e| not_found_or(e, path))?;
        Ok(metadata.len())
    }

    /// Sum of all stored blob sizes. Walks the whole tree.
    pub async fn total_bytes_used(&self) -> Result<u64> {
        Ok(self.stats().await?.total_bytes)
    }

    /// Number of stored blobs. Walks the whole tree.
    pub async fn count_stored_files(&self) -> Result<u64> {
        Ok(self.stats().await?.file_count)
    }

    /// File count and byte total from a single walk
    pub async fn stats(&self) -> Result<BlobStats> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan(&root))
            .await
            .map_err(|e| StorageError::Other(e.into()))?
    }

    /// Remove temp files left behind by interrupted writes.
    ///
    /// Files younger than [`TEMP_FILE_GRACE`] are kept, so this is safe to run
    /// alongside `store`.
    pub async fn cleanup_temp_files(&self) -> Result<usize> {
        self.cleanup_temp_files_older_than(TEMP_FILE_GRACE).await
    }

    /// Remove temp files whose last modification is at least `min_age` ago
    pub async fn cleanup_temp_files_older_than(&self, min_age: Duration) -> Result<usize> {
        let root = self.root.clone();
        let cleaned = tokio::task::spawn_blocking(move || -> Result<usize> {
            let now = SystemTime::now();
            let mut cleaned = 0;
            for entry in walkdir::WalkDir::new(&root).min_depth(1) {
                let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
                if !entry.file_type().is_file() || !is_temp_file(entry.path()) {
                    continue;
                }
                let modified = entry
                    .metadata()
                    .map_err(|e| StorageError::Io(e.into()))?
                    .modified()?;
                // A clock step backwards makes the file look new; keep it
                let age = now.duration_since(modified).unwrap_or_default();
                if age < min_age {
                    tracing::debug!(path = %entry.path().display(), "Keeping recent temp file");
                    continue;
                }
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => cleaned += 1,
                    // The writer renamed or removed it first
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(cleaned)
        })
        .await
        .map_err(|e| StorageError::Other(e.into()))??;

        if cleaned > 0 {
            tracing::info!(cleaned, "Removed leftover blob temp files");
        }
        Ok(cleaned)
    }

    fn check_size(&self, len: usize) -> Result<()> {
        let actual = len as u64;
        if actual > self.options.max_blob_size {
            return Err(StorageError::PayloadTooLarge {
                actual,
                limit: self.options.max_blob_size,
            });
        }
        Ok(())
    }

    async fn write_blob(&self, content: &[u8], extension: &str) -> Result<StoredBlob> {
        let digest = self.hasher.digest(content);
        let path = BlobPath::for_digest(&digest, extension, self.clock.now());
        let full = path.resolve(&self.root);

        match fs::metadata(&full).await {
            Ok(existing) => {
                if self.options.verify_on_dedup && fs::read(&full).await? != content {
                    tracing::warn!(path = %path, "Digest collision detected");
                    return Err(StorageError::DigestCollision {
                        path: path.to_string(),
                    });
                }
                tracing::debug!(path = %path, "Deduplicated blob");
                return Ok(StoredBlob {
                    path,
                    digest,
                    byte_size: existing.len(),
                    was_deduplicated: true,
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Concurrent writers of the same content each get their own temp file
        let temp_path = full.with_file_name(format!(
            "{}{}.{}.{}{}",
            TEMP_PREFIX,
            digest,
            extension,
            uuid::Uuid::new_v4().simple(),
            TEMP_SUFFIX
        ));
        if let Err(e) = write_then_rename(&temp_path, &full, content).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!(path = %path, bytes = content.len(), "Stored blob");
        Ok(StoredBlob {
            path,
            digest,
            byte_size: content.len() as u64,
            was_deduplicated: false,
        })
    }

    fn locate(&self, raw: &str) -> Result<PathBuf> {
        let path = BlobPath::parse(raw).map_err(|_| StorageError::InvalidPath(raw.to_string()))?;
        Ok(path.resolve(&self.root))
    }
}

async fn write_then_rename(temp_path: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp_path, path).await
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = image.to_rgb8();
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode_image(&rgb)
        .map_err(|e| StorageError::EncodingFailed(e.to_string()))?;
    Ok(encoded)
}

fn scan(root: &Path) -> Result<BlobStats> {
    let mut stats = BlobStats::default();
    if !root.exists() {
        return Ok(stats);
    }
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
        if !entry.file_type().is_file() || is_temp_file(entry.path()) {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| StorageError::Io(e.into()))?;
        stats.file_count += 1;
        stats.total_bytes += metadata.len();
    }
    Ok(stats)
}

/// Temp files are hidden (`.{digest}.{ext}.{uuid}.tmp`); blob names never
/// start with a dot, whatever their extension.
fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX))
}

fn not_found_or(err: std::io::Error, path: &str) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io(err)
    }
}
