//! Thumbnail cache decisions
//!
//! Decides whether a popup is served from a scaled copy under the cache
//! directory, regenerates that copy when it is missing or older than its
//! source, and computes the preview geometry for the renderer.

use crate::image::ImageService;
use crate::models::{
    CacheDecision, Config, ImageMetadata, ImageRef, PopupRequest, PopupVars, ResizePolicy,
    ScalePercent,
};
use crate::sequence::IdSequence;
use crate::store::FileStore;
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

pub struct ThumbnailCache {
    source_root: PathBuf,
    cache_dir: String,
    policy: ResizePolicy,
    images: Box<dyn ImageService>,
    files: Box<dyn FileStore>,
    write_locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl ThumbnailCache {
    pub fn new(config: &Config, images: Box<dyn ImageService>, files: Box<dyn FileStore>) -> Self {
        Self {
            source_root: config.source_root.clone(),
            cache_dir: config.cache_dir.clone(),
            policy: config.policy,
            images,
            files,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &ResizePolicy {
        &self.policy
    }

    /// Cache paths with an evaluation currently holding or waiting on a write lock.
    pub fn active_writes(&self) -> usize {
        self.write_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn source_path(&self, image: &ImageRef) -> PathBuf {
        image.resolve(&self.source_root)
    }

    /// Filesystem location of the scaled copy: the source path reparented
    /// under the cache directory.
    pub fn cache_path(&self, image: &ImageRef) -> PathBuf {
        self.source_root
            .join(&self.cache_dir)
            .join(image.relative())
    }

    /// Site path the renderer links to when the scaled copy is served.
    pub fn cache_site_path(&self, image: &ImageRef) -> String {
        format!("/{}/{}", self.cache_dir, image.relative())
    }

    pub async fn read_metadata(&self, image: &ImageRef) -> Result<ImageMetadata> {
        let source = self.source_path(image);
        let stat = self
            .files
            .stat(&source)
            .await?
            .ok_or_else(|| Error::SourceNotFound(source.clone()))?;
        let (width_px, height_px) = self.images.dimensions(&source).await?;

        Ok(ImageMetadata {
            width_px,
            height_px,
            size_bytes: stat.size_bytes,
            modified_at: stat.modified_at,
        })
    }

    pub async fn evaluate(
        &self,
        image: &ImageRef,
        percent: ScalePercent,
        meta: &ImageMetadata,
        ids: &IdSequence,
    ) -> Result<CacheDecision> {
        let source = self.source_path(image);
        if !self.files.exists(&source).await? {
            return Err(Error::SourceNotFound(source));
        }

        let id = ids.next_id();
        let scaled_width_px = percent.apply(meta.width_px);
        let scaled_height_px = percent.apply(meta.height_px);
        let cache_path = self.cache_path(image);
        let should_resize = self.policy.should_resize(percent, meta.size_bytes);

        let mut decision = CacheDecision {
            id,
            should_resize,
            should_regenerate: false,
            cache_path,
            full_width_px: meta.width_px,
            full_height_px: meta.height_px,
            scaled_width_px,
            scaled_height_px,
            served_path: image.path().to_string(),
        };

        if !should_resize {
            debug!(
                "[{}] Serving original {} at {} ({} bytes)",
                id, image, percent, meta.size_bytes
            );
            return Ok(decision);
        }

        decision.should_regenerate = self
            .refresh(&source, &decision.cache_path, meta, scaled_width_px, scaled_height_px)
            .await?;
        decision.served_path = self.cache_site_path(image);
        Ok(decision)
    }

    /// Parse a popup request, read its metadata, and evaluate it.
    pub async fn process(&self, request: &PopupRequest, ids: &IdSequence) -> Result<PopupVars> {
        let percent = request.scale()?;
        let image = request.image_ref();
        let meta = self.read_metadata(&image).await?;
        let decision = self.evaluate(&image, percent, &meta, ids).await?;
        Ok(decision.popup_vars(&image, request.title.clone()))
    }

    /// Regenerate the cached copy if it is absent or older than the source.
    /// Returns whether a write happened.
    async fn refresh(
        &self,
        source: &Path,
        cache_path: &Path,
        meta: &ImageMetadata,
        width: u32,
        height: u32,
    ) -> Result<bool> {
        let lock = self.write_lock(cache_path);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(source, cache_path, meta, width, height)
                .await
        };
        self.release_lock(cache_path, lock);
        result
    }

    async fn refresh_locked(
        &self,
        source: &Path,
        cache_path: &Path,
        meta: &ImageMetadata,
        width: u32,
        height: u32,
    ) -> Result<bool> {
        let stale = match self.files.stat(cache_path).await? {
            None => true,
            Some(cached) => cached.modified_at < meta.modified_at,
        };
        if !stale {
            debug!("Thumbnail is fresh: {}", cache_path.display());
            return Ok(false);
        }

        let parent = cache_path.parent().ok_or_else(|| {
            Error::Invariant(format!(
                "Thumbnail path has no parent: {}",
                cache_path.display()
            ))
        })?;
        self.files.mkdir_all(parent).await?;
        self.images
            .write_scaled(source, cache_path, width, height)
            .await?;

        // A source stamped ahead of the clock would leave the new copy stale.
        let written = self.files.stat(cache_path).await?;
        if written.is_none_or(|cached| cached.modified_at < meta.modified_at) {
            debug!(
                "Restamping {} to its source modification time",
                cache_path.display()
            );
            self.files.touch(cache_path, meta.modified_at).await?;
        }

        info!(
            "Regenerated {}x{} thumbnail {}",
            width,
            height,
            cache_path.display()
        );
        Ok(true)
    }

    fn write_lock(&self, cache_path: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(cache_path.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Forget the lock for `cache_path` once no other evaluation holds it.
    fn release_lock(&self, cache_path: &Path, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the registry, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(cache_path);
        }
    }
}
