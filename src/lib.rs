//! Thumbnail cache engine for image popups
//!
//! Decides, for each image an author embeds as a popup, whether a scaled
//! copy must be (re)generated under the site's thumbnail directory, and
//! computes the preview geometry and paths a renderer needs.

pub mod app;
pub mod cache;
pub mod error;
pub mod image;
pub mod models;
pub mod sequence;
pub mod store;

pub use error::{Error, Result};
