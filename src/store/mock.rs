use super::{FileStat, FileStore};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// In-memory file store. Clones share state, so a test can keep a probe.
#[derive(Clone, Default)]
pub struct MockFileStore {
    files: Arc<Mutex<HashMap<PathBuf, FileStat>>>,
    dirs: Arc<Mutex<HashSet<PathBuf>>>,
    stat_count: Arc<Mutex<usize>>,
    fail_mkdir: Arc<Mutex<bool>>,
}

impl MockFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, size_bytes: u64, modified_at: SystemTime) -> Self {
        self.put_file(path, size_bytes, modified_at);
        self
    }

    pub fn with_mkdir_failure(self, should_fail: bool) -> Self {
        *self.fail_mkdir.lock().unwrap() = should_fail;
        self
    }

    pub fn put_file(&self, path: impl Into<PathBuf>, size_bytes: u64, modified_at: SystemTime) {
        self.files.lock().unwrap().insert(
            path.into(),
            FileStat {
                size_bytes,
                modified_at,
            },
        );
    }

    pub fn get_stat_count(&self) -> usize {
        *self.stat_count.lock().unwrap()
    }

    pub fn get_dirs(&self) -> HashSet<PathBuf> {
        self.dirs.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileStore for MockFileStore {
    async fn stat(&self, path: &Path) -> Result<Option<FileStat>> {
        *self.stat_count.lock().unwrap() += 1;
        Ok(self.files.lock().unwrap().get(path).copied())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path) || self.dirs.lock().unwrap().contains(path))
    }

    async fn mkdir_all(&self, path: &Path) -> Result<()> {
        if *self.fail_mkdir.lock().unwrap() {
            return Err(Error::cache_write(
                path,
                "create directory",
                std::io::Error::other("Mock failure"),
            ));
        }

        let mut dirs = self.dirs.lock().unwrap();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    async fn touch(&self, path: &Path, modified_at: SystemTime) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        match files.get_mut(path) {
            Some(stat) => {
                stat.modified_at = modified_at;
                Ok(())
            }
            None => Err(Error::cache_write(
                path,
                "set modification time",
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )),
        }
    }
}
