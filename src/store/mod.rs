//! Filesystem access for source images and cached thumbnails
//!
//! The cache engine only needs to stat files, create directories, and
//! restamp modification times; the thumbnail bytes themselves are written
//! by the image service.

pub mod local;
pub mod mock;

pub use local::LocalFileStore;
pub use mock::MockFileStore;

use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size_bytes: u64,
    pub modified_at: SystemTime,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// `Ok(None)` when nothing exists at `path`.
    async fn stat(&self, path: &Path) -> Result<Option<FileStat>>;
    async fn exists(&self, path: &Path) -> Result<bool>;
    async fn mkdir_all(&self, path: &Path) -> Result<()>;
    /// Set the modification time of an existing file.
    async fn touch(&self, path: &Path, modified_at: SystemTime) -> Result<()>;
}
