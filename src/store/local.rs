use super::{FileStat, FileStore};
use crate::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn stat(&self, path: &Path) -> Result<Option<FileStat>> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(FileStat {
                size_bytes: meta.len(),
                modified_at: meta.modified()?,
            })),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                Ok(None)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn mkdir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| Error::cache_write(path, "create directory", e))
    }

    async fn touch(&self, path: &Path, modified_at: SystemTime) -> Result<()> {
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            std::fs::File::options()
                .write(true)
                .open(&target)
                .and_then(|file| file.set_modified(modified_at))
                .map_err(|e| Error::cache_write(&target, "set modification time", e))
        })
        .await
        .map_err(|e| Error::Invariant(format!("Touch task join error: {}", e)))?
    }
}
