//! Fixtures shared by the integration tests.

use std::path::Path;

/// Noise compresses badly, so the PNG is large enough for many size steps.
pub fn write_noise_png(path: &Path, width: u32, height: u32) {
    let mut state: u32 = 0x9e37_79b9;
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let [_, r, g, b] = state.to_le_bytes();
        image::Rgb([r, g, b])
    });
    img.save(path).unwrap();
}
