//! Image decoding and thumbnail writing
//!
//! Reads source dimensions and writes scaled copies. Resampling itself is
//! left to the `image` crate.

pub mod mock;
pub mod processor;

pub use mock::MockImageProcessor;
pub use processor::ImageProcessor;

use crate::Result;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Full-size `(width, height)` of the image at `path`.
    async fn dimensions(&self, path: &Path) -> Result<(u32, u32)>;

    /// Write `source` scaled to `width`x`height` at `target`. The parent
    /// directory must already exist.
    async fn write_scaled(&self, source: &Path, target: &Path, width: u32, height: u32)
        -> Result<()>;
}
