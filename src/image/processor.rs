use super::ImageService;
use crate::{Error, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ImageProcessor {
    filter: FilterType,
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    fn decode_error(path: &Path, source: ImageError) -> Error {
        Error::DecodeFailed {
            path: path.to_path_buf(),
            source,
        }
    }

    fn dimensions_sync(path: PathBuf) -> Result<(u32, u32)> {
        let reader = ImageReader::open(&path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| Self::decode_error(&path, ImageError::IoError(e)))?;
        reader
            .into_dimensions()
            .map_err(|e| Self::decode_error(&path, e))
    }

    /// Encode into a temporary file beside `target`, then rename it into
    /// place so a partially written thumbnail is never visible.
    fn write_scaled_sync(
        source: PathBuf,
        target: PathBuf,
        width: u32,
        height: u32,
        filter: FilterType,
    ) -> Result<()> {
        let image = image::open(&source).map_err(|e| Self::decode_error(&source, e))?;

        let format = ImageFormat::from_path(&target)
            .map_err(|e| Error::cache_write(&target, "choose output format", std::io::Error::other(e)))?;
        let parent = target.parent().ok_or_else(|| {
            Error::Invariant(format!("Thumbnail path has no parent: {}", target.display()))
        })?;

        let resized = image.resize_exact(width.max(1), height.max(1), filter);
        let resized = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
            _ => resized,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".imgpopup-")
            .tempfile_in(parent)
            .map_err(|e| Error::cache_write(&target, "create temporary file", e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            resized.write_to(&mut writer, format).map_err(|e| match e {
                ImageError::IoError(io) => Error::cache_write(&target, "write thumbnail", io),
                other => Error::cache_write(&target, "encode thumbnail", std::io::Error::other(other)),
            })?;
            writer
                .flush()
                .map_err(|e| Error::cache_write(&target, "write thumbnail", e))?;
        }

        tmp.persist(&target)
            .map_err(|e| Error::cache_write(&target, "publish thumbnail", e.error))?;
        debug!(
            "Wrote {}x{} thumbnail to {}",
            width,
            height,
            target.display()
        );
        Ok(())
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for ImageProcessor {
    async fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::dimensions_sync(path))
            .await
            .map_err(|e| Error::Invariant(format!("Image decode task join error: {}", e)))?
    }

    async fn write_scaled(
        &self,
        source: &Path,
        target: &Path,
        width: u32,
        height: u32,
    ) -> Result<()> {
        tokio::task::spawn_blocking({
            let source = source.to_path_buf();
            let target = target.to_path_buf();
            let filter = self.filter;
            move || Self::write_scaled_sync(source, target, width, height, filter)
        })
        .await
        .map_err(|e| Error::Invariant(format!("Image resize task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
        img.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = create_test_image(dir.path(), "wide.png", 80, 60);

        let dims = ImageProcessor::new().dimensions(&path).await.unwrap();
        assert_eq!(dims, (80, 60));
    }

    #[tokio::test]
    async fn test_dimensions_of_corrupt_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let err = ImageProcessor::new().dimensions(&path).await.unwrap_err();
        match err {
            Error::DecodeFailed { path: failed, .. } => assert_eq!(failed, path),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_write_scaled_png() {
        let dir = TempDir::new().unwrap();
        let source = create_test_image(dir.path(), "source.png", 80, 60);
        let out_dir = dir.path().join("thumb");
        std::fs::create_dir_all(&out_dir).unwrap();
        let target = out_dir.join("source.png");

        ImageProcessor::new()
            .write_scaled(&source, &target, 40, 30)
            .await
            .unwrap();

        let written = image::open(&target).unwrap();
        assert_eq!(written.width(), 40);
        assert_eq!(written.height(), 30);

        let leftovers: Vec<_> = std::fs::read_dir(&out_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "temporary file left behind: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_write_scaled_jpeg_from_rgba_source() {
        let dir = TempDir::new().unwrap();
        let source = create_test_image(dir.path(), "source.png", 20, 10);
        let target = dir.path().join("scaled.jpg");

        ImageProcessor::new()
            .write_scaled(&source, &target, 10, 5)
            .await
            .unwrap();

        let written = image::open(&target).unwrap();
        assert_eq!((written.width(), written.height()), (10, 5));
    }

    #[tokio::test]
    async fn test_write_scaled_with_nearest_filter() {
        let dir = TempDir::new().unwrap();
        let source = create_test_image(dir.path(), "source.png", 64, 32);
        let target = dir.path().join("nearest.png");

        ImageProcessor::new()
            .with_filter(FilterType::Nearest)
            .write_scaled(&source, &target, 16, 8)
            .await
            .unwrap();

        let written = image::open(&target).unwrap().to_rgba8();
        assert_eq!(written.dimensions(), (16, 8));
        assert_eq!(written.get_pixel(0, 0), &image::Rgba([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_write_scaled_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let source = create_test_image(dir.path(), "source.png", 20, 20);
        let target = dir.path().join("scaled.png");
        std::fs::write(&target, b"stale").unwrap();

        ImageProcessor::new()
            .write_scaled(&source, &target, 5, 5)
            .await
            .unwrap();

        assert_eq!(image::open(&target).unwrap().width(), 5);
    }

    #[tokio::test]
    async fn test_write_scaled_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let source = create_test_image(dir.path(), "source.png", 20, 20);
        let target = dir.path().join("scaled.unknownext");

        let err = ImageProcessor::new()
            .write_scaled(&source, &target, 10, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheWriteFailed { .. }));
        assert!(!target.exists());
    }
}
