//! Blob path scheme
//!
//! Blobs are sharded by calendar month of storage:
//! `{yyyy}/{mm}/{digest}.{extension}`. Backup and export tooling reads this
//! layout directly, so the format must stay stable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::{CoreError, Result};

/// Relative location of a blob under the store root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobPath(String);

impl BlobPath {
    /// Path for `digest` with `extension`, stored at instant `at`
    pub fn for_digest(digest: &str, extension: &str, at: OffsetDateTime) -> Self {
        let month: u8 = at.month().into();
        Self(format!(
            "{:04}/{:02}/{}.{}",
            at.year(),
            month,
            digest,
            extension
        ))
    }

    /// Parse a caller-supplied relative path, rejecting anything that could
    /// escape the store root.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && !raw.contains('\\')
            && raw
                .split('/')
                .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        if !valid {
            return Err(CoreError::InvalidBlobPath(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location under `root`
    pub fn resolve(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |p, seg| p.join(seg))
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BlobPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
