//! Asset store trait and shared descriptor types.
//!
//! The [`AssetStore`] trait is the only way the rest of the crate touches
//! stored files: an existence check used to revalidate cached variants, URL
//! construction, and scaling a stored image to a new width.
//!
//! The production implementation is
//! [`FsAssetStore`](super::fs_store::FsAssetStore). Tests use the recording
//! [`MockStore`](tests::MockStore).

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Asset not found: {0}")]
    NotFound(String),
}

/// Identity of one stored image: the original or one of its variants.
///
/// `filename`, `hash`, and `variant` are enough for the store to locate the
/// file again. `width` is carried so a `srcset` can be written without
/// reopening the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDescriptor {
    pub filename: String,
    /// Content hash of the original asset.
    pub hash: String,
    /// Variant tag, e.g. `ScaleWidth800`; `None` for the original.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub width: u32,
}

impl VariantDescriptor {
    pub fn original(filename: impl Into<String>, hash: impl Into<String>, width: u32) -> Self {
        Self {
            filename: filename.into(),
            hash: hash.into(),
            variant: None,
            width,
        }
    }
}

/// A source asset as seen by a rendering request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub descriptor: VariantDescriptor,
    /// Size in bytes.
    pub filesize: u64,
    /// Whether the file is present in the store.
    pub exists: bool,
}

impl SourceImage {
    pub fn filename(&self) -> &str {
        &self.descriptor.filename
    }

    pub fn hash(&self) -> &str {
        &self.descriptor.hash
    }

    /// Intrinsic pixel width; `0` when unknown.
    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(self.filename())
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Backing storage for images and their scaled variants.
pub trait AssetStore: Send + Sync {
    /// Whether the file for `(filename, hash, variant)` is still present.
    fn exists(&self, filename: &str, hash: &str, variant: Option<&str>) -> Result<bool, StoreError>;

    /// Public URL of a stored image.
    fn url_for(&self, descriptor: &VariantDescriptor) -> String;

    /// Produce (or reuse) a copy of `source` scaled to `width` pixels wide.
    fn scale(&self, source: &VariantDescriptor, width: u32)
    -> Result<VariantDescriptor, StoreError>;
}
