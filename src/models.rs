//! Data models and structures
//!
//! Defines image references, scale percentages, the resize policy, and the
//! decision and renderer records produced for each popup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

/// A source image as referenced by the author, relative to the site root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef {
    path: String,
}

impl ImageRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// The path exactly as written, e.g. `/images/big.png`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path with its leading separators removed, so it always joins
    /// beneath the source root.
    pub fn relative(&self) -> &str {
        self.path.trim_start_matches('/')
    }

    pub fn resolve(&self, source_root: &Path) -> PathBuf {
        source_root.join(self.relative())
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// A positive scale percentage. Values above 100 scale up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ScalePercent(u32);

impl ScalePercent {
    pub fn new(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(Error::InvalidScale(format!("{}%", value)));
        }
        u32::try_from(value)
            .map(Self)
            .map_err(|_| Error::InvalidScale(format!("{}%", value)))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Scale a pixel length, rounding half up.
    pub fn apply(self, px: u32) -> u32 {
        let scaled = (u64::from(px) * u64::from(self.0) + 50) / 100;
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }
}

impl FromStr for ScalePercent {
    type Err = Error;

    /// Parse the `nn%` form.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_suffix('%')
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| Error::InvalidScale(s.to_string()))?;
        let value: u32 = digits
            .parse()
            .map_err(|_| Error::InvalidScale(s.to_string()))?;
        if value == 0 {
            return Err(Error::InvalidScale(s.to_string()));
        }
        Ok(Self(value))
    }
}

impl fmt::Display for ScalePercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

pub const DEFAULT_PERCENT_LIMIT: u32 = 101;

/// When a popup gets a scaled copy on disk instead of the original bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePolicy {
    /// `None` disables resizing; `Some(0)` makes every file eligible.
    pub min_size_kb: Option<u64>,
    pub percent_limit: u32,
}

impl ResizePolicy {
    pub fn disabled() -> Self {
        Self {
            min_size_kb: None,
            percent_limit: DEFAULT_PERCENT_LIMIT,
        }
    }

    pub fn new(min_size_kb: Option<u64>, percent_limit: Option<u32>) -> Self {
        Self {
            min_size_kb,
            percent_limit: percent_limit.unwrap_or(DEFAULT_PERCENT_LIMIT),
        }
    }

    pub fn should_resize(&self, percent: ScalePercent, size_bytes: u64) -> bool {
        match self.min_size_kb {
            Some(kb) => {
                percent.get() < self.percent_limit
                    && (kb == 0 || size_bytes > kb.saturating_mul(1024))
            }
            None => false,
        }
    }
}

impl Default for ResizePolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Attributes of a source image, read fresh for every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    pub width_px: u32,
    pub height_px: u32,
    pub size_bytes: u64,
    pub modified_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheDecision {
    pub id: u64,
    pub should_resize: bool,
    pub should_regenerate: bool,
    pub cache_path: PathBuf,
    pub full_width_px: u32,
    pub full_height_px: u32,
    pub scaled_width_px: u32,
    pub scaled_height_px: u32,
    pub served_path: String,
}

impl CacheDecision {
    pub fn popup_vars(&self, image: &ImageRef, title: Option<String>) -> PopupVars {
        PopupVars {
            id: self.id.to_string(),
            image: image.path().to_string(),
            title,
            full_width: self.full_width_px,
            full_height: self.full_height_px,
            scaled_width: self.scaled_width_px,
            scaled_height: self.scaled_height_px,
            scaled_image: self.served_path.clone(),
        }
    }
}

/// Named values handed to the popup renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupVars {
    pub id: String,
    pub image: String,
    pub title: Option<String>,
    pub full_width: u32,
    pub full_height: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub scaled_image: String,
}

/// One popup reference: `path nn% [title]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupRequest {
    pub path: String,
    pub percent: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl PopupRequest {
    pub fn new(path: impl Into<String>, percent: impl Into<String>, title: Option<String>) -> Self {
        Self {
            path: path.into(),
            percent: percent.into(),
            title,
        }
    }

    pub fn image_ref(&self) -> ImageRef {
        ImageRef::new(self.path.clone())
    }

    pub fn scale(&self) -> Result<ScalePercent> {
        self.percent.parse()
    }
}

// Configuration
pub const DEFAULT_SOURCE_ROOT: &str = "source";
pub const DEFAULT_CACHE_DIR: &str = "thumb";
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source_root: PathBuf,
    pub cache_dir: String,
    pub policy: ResizePolicy,
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from(DEFAULT_SOURCE_ROOT),
            cache_dir: DEFAULT_CACHE_DIR.to_string(),
            policy: ResizePolicy::disabled(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let source_root = get("IMGPOPUP_SOURCE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_ROOT));
        let cache_dir = get("IMGPOPUP_CACHE_DIR")
            .map(|dir| dir.trim_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string());
        if cache_dir.is_empty() {
            return Err(Error::Config(
                "IMGPOPUP_CACHE_DIR must name a subdirectory".to_string(),
            ));
        }

        let min_size_kb = get("IMAGE_RESIZE_SIZE")
            .map(|v| parse_var::<u64>("IMAGE_RESIZE_SIZE", &v))
            .transpose()?;
        let percent_limit = get("IMAGE_RESIZE_PERCENT_LIMIT")
            .map(|v| parse_var::<u32>("IMAGE_RESIZE_PERCENT_LIMIT", &v))
            .transpose()?;
        let concurrency = get("IMGPOPUP_CONCURRENCY")
            .map(|v| parse_var::<usize>("IMGPOPUP_CONCURRENCY", &v))
            .transpose()?
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(Error::Config(
                "IMGPOPUP_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            source_root,
            cache_dir,
            policy: ResizePolicy::new(min_size_kb, percent_limit),
            concurrency,
        })
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, value)))
}
