use super::ImageService;
use crate::store::MockFileStore;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// A recorded `write_scaled` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaledWrite {
    pub source: PathBuf,
    pub target: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone)]
pub struct MockImageProcessor {
    dimensions: Arc<Mutex<HashMap<PathBuf, (u32, u32)>>>,
    default_dimensions: (u32, u32),
    writes: Arc<Mutex<Vec<ScaledWrite>>>,
    should_fail: Arc<Mutex<bool>>,
    store: Option<MockFileStore>,
}

impl MockImageProcessor {
    pub fn new() -> Self {
        Self {
            dimensions: Arc::new(Mutex::new(HashMap::new())),
            default_dimensions: (800, 600),
            writes: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
            store: None,
        }
    }

    pub fn with_default_dimensions(mut self, width: u32, height: u32) -> Self {
        self.default_dimensions = (width, height);
        self
    }

    pub fn with_dimensions(self, path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        self.dimensions
            .lock()
            .unwrap()
            .insert(path.into(), (width, height));
        self
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    /// Publish written thumbnails into `store`, stamped with the current time.
    pub fn with_store(mut self, store: MockFileStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn get_write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn get_writes(&self) -> Vec<ScaledWrite> {
        self.writes.lock().unwrap().clone()
    }
}

impl Default for MockImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for MockImageProcessor {
    async fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        if *self.should_fail.lock().unwrap() {
            return Err(crate::Error::DecodeFailed {
                path: path.to_path_buf(),
                source: image::ImageError::IoError(std::io::Error::other("Mock failure")),
            });
        }

        Ok(self
            .dimensions
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(self.default_dimensions))
    }

    async fn write_scaled(
        &self,
        source: &Path,
        target: &Path,
        width: u32,
        height: u32,
    ) -> Result<()> {
        if *self.should_fail.lock().unwrap() {
            return Err(crate::Error::cache_write(
                target,
                "write thumbnail",
                std::io::Error::other("Mock failure"),
            ));
        }

        self.writes.lock().unwrap().push(ScaledWrite {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            width,
            height,
        });
        if let Some(store) = &self.store {
            let size = u64::from(width) * u64::from(height);
            store.put_file(target, size, SystemTime::now());
        }
        Ok(())
    }
}
