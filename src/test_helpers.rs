//! Shared test utilities for the responsive-images test suite.
//!
//! Provides the reference rendering profile table, settings built on it, and
//! helpers for describing or writing source images.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let settings = test_settings();
//! let config = profile::resolve(Some("small"), None, &settings.rendering_classes);
//! assert_eq!(config.retina_level, 2);
//! ```

use std::path::Path;

use crate::config::Settings;
use crate::imaging::{SourceImage, VariantDescriptor};

// =========================================================================
// Profiles and settings
// =========================================================================

/// Reference profile table covering the interesting cases: stepped
/// variants, a single huge-diff variant, retina scaling, and `$USERWIDTH`.
pub fn test_profiles() -> toml::Table {
    toml::from_str(
        r#"
        [default]
        sizes = "100vw"
        size_diff = 10000
        max_steps = 4
        retina_level = 1

        [maxsteps_90vw]
        sizes = "90vw"
        size_diff = 1000
        max_steps = 4
        retina_level = 1

        [sizediff_90vw_2x]
        sizes = "90vw"
        size_diff = 2000000
        max_steps = 4
        retina_level = 2

        [small]
        sizes = "120px"
        size_diff = 50000
        retina_level = 2

        [userwidth]
        sizes = "(max-width:$USERWIDTHpx) calc(100vw - 80px), $USERWIDTHpx"
        size_diff = 50000
        retina_level = 1
        "#,
    )
    .unwrap()
}

/// Settings with [`test_profiles`] and a 320–1200px viewport range.
pub fn test_settings() -> Settings {
    Settings {
        min_viewport: 320,
        max_viewport: 1200,
        rendering_classes: test_profiles(),
        ..Settings::default()
    }
}

// =========================================================================
// Source images
// =========================================================================

/// Existing source image with a fixed hash.
pub fn source_image(filename: &str, width: u32) -> SourceImage {
    SourceImage {
        descriptor: VariantDescriptor::original(filename, "c0ffee00c0ffee00", width),
        filesize: 400_000,
        exists: true,
    }
}

/// Write a noisy RGB PNG so the file size is roughly proportional to its area.
pub fn write_test_png(path: &Path, width: u32, height: u32) {
    let mut state: u32 = 0x1234_5678;
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let [_, r, g, b] = state.to_le_bytes();
        image::Rgb([r, g, b])
    });
    img.save(path).unwrap();
}
