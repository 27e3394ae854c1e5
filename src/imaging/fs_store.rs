//! Filesystem asset store backed by the `image` crate.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! └── 3f2a9c81d0/                    # first 10 hex chars of the content hash
//!     ├── beach.jpg                  # original
//!     ├── beach__ScaleWidth800.jpg   # variant
//!     └── beach__ScaleWidth400.jpg
//! ```
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` |
//! | Content hash | `sha2::Sha256` |
//! | Decode / encode (by extension) | `image::ImageReader`, `DynamicImage::save` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |

use super::store::{AssetStore, SourceImage, StoreError, VariantDescriptor};
use image::ImageReader;
use image::imageops::FilterType;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Number of hash characters used for the per-asset directory.
const HASH_DIR_LEN: usize = 10;

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// Variant tag for a width-scaled copy.
pub fn scale_width_tag(width: u32) -> String {
    format!("ScaleWidth{width}")
}

pub struct FsAssetStore {
    root: PathBuf,
    base_url: String,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy `path` into the store and describe it.
    ///
    /// Importing the same content twice is a no-op after the first copy.
    pub fn import(&self, path: &Path) -> Result<SourceImage, StoreError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::NotFound(path.display().to_string()))?
            .to_string();
        let hash = hash_file(path)?;

        let target = self.path_for(&filename, &hash, None);
        if !target.exists() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(path, &target)?;
            debug!(file = %filename, hash = %hash, "imported asset");
        }

        Ok(self.describe(&filename, &hash))
    }

    /// Describe an asset already in the store.
    ///
    /// A missing file yields `exists = false`; an undecodable one yields
    /// width `0`. Neither is an error: the renderer degrades on both.
    pub fn describe(&self, filename: &str, hash: &str) -> SourceImage {
        let path = self.path_for(filename, hash, None);
        let filesize = std::fs::metadata(&path).map(|m| m.len()).ok();
        let width = image::image_dimensions(&path).map(|(w, _)| w).unwrap_or(0);
        SourceImage {
            descriptor: VariantDescriptor::original(filename, hash, width),
            filesize: filesize.unwrap_or(0),
            exists: filesize.is_some(),
        }
    }

    /// Absolute path of a stored file.
    pub fn path_for(&self, filename: &str, hash: &str, variant: Option<&str>) -> PathBuf {
        self.root.join(relative_path(filename, hash, variant))
    }
}

/// Store-relative path, always `/`-separated so it doubles as a URL path.
fn relative_path(filename: &str, hash: &str, variant: Option<&str>) -> String {
    let dir = hash.get(..HASH_DIR_LEN).unwrap_or(hash);
    let name = match variant {
        None => filename.to_string(),
        Some(tag) => variant_filename(filename, tag),
    };
    format!("{dir}/{name}")
}

/// `beach.jpg` + `ScaleWidth800` → `beach__ScaleWidth800.jpg`
fn variant_filename(filename: &str, tag: &str) -> String {
    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(filename);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}__{tag}.{ext}"),
        None => format!("{stem}__{tag}"),
    }
}

impl AssetStore for FsAssetStore {
    fn exists(&self, filename: &str, hash: &str, variant: Option<&str>) -> Result<bool, StoreError> {
        Ok(self.path_for(filename, hash, variant).try_exists()?)
    }

    fn url_for(&self, descriptor: &VariantDescriptor) -> String {
        let relative = relative_path(
            &descriptor.filename,
            &descriptor.hash,
            descriptor.variant.as_deref(),
        );
        format!("{}/{}", self.base_url.trim_end_matches('/'), relative)
    }

    fn scale(&self, source: &VariantDescriptor, width: u32) -> Result<VariantDescriptor, StoreError> {
        // Never upscale: the source already covers the request.
        if width >= source.width {
            return Ok(source.clone());
        }

        let tag = scale_width_tag(width);
        let output = self.path_for(&source.filename, &source.hash, Some(&tag));
        if !output.exists() {
            let input = self.path_for(&source.filename, &source.hash, source.variant.as_deref());
            if !input.exists() {
                return Err(StoreError::NotFound(input.display().to_string()));
            }
            let img = ImageReader::open(&input)?.with_guessed_format()?.decode()?;
            let height = (img.height() as f64 * width as f64 / img.width().max(1) as f64)
                .round()
                .max(1.0) as u32;
            let resized = img.resize_exact(width, height, FilterType::Lanczos3);
            resized.save(&output)?;
            debug!(file = %source.filename, width, "wrote variant");
        }

        Ok(VariantDescriptor {
            filename: source.filename.clone(),
            hash: source.hash.clone(),
            variant: Some(tag),
            width,
        })
    }
}
