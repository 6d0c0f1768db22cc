use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::mirror::MirrorError;

/// A video written into the videos directory by one upload.
#[derive(Debug, Clone)]
pub struct StoredVideo {
    /// Sanitized name on disk, possibly carrying a uniqueness suffix
    pub stored_filename: String,
    /// Name declared by the client. Only ever shown, never used to build paths.
    pub original_filename: String,
    pub size_bytes: u64,
    /// Always a direct child of the videos directory
    pub storage_path: PathBuf,
    pub uploaded_at: DateTime<Utc>,
}

/// Result of one best-effort mirror attempt. Reported once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOutcome {
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl MirrorOutcome {
    #[must_use]
    pub fn pushed() -> Self {
        Self {
            succeeded: true,
            error_detail: None,
        }
    }

    #[must_use]
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// Version control operations the mirror needs. The production implementation
/// shells out to `git`, tests substitute a recording fake.
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn pull_rebase(&self, remote: &str, branch: &str) -> Result<(), MirrorError>;

    async fn add(&self, path: &Path) -> Result<(), MirrorError>;

    async fn commit(&self, message: &str) -> Result<(), MirrorError>;

    async fn push(&self, remote: &str, branch: &str) -> Result<(), MirrorError>;
}
