//! Image storage and variant production.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Content hash** | `sha2::Sha256` |
//! | **Scale** | `resize_exact` with Lanczos3, encoded by extension |
//! | **Fan-out** | `rayon` `par_iter` over planned widths |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for `sizes` evaluation and width planning
//! - **Store**: [`AssetStore`] trait + [`FsAssetStore`]
//! - **Operations**: [`ResizeEngine`] trait + [`StepResizer`]

mod calculations;
pub mod fs_store;
pub mod operations;
pub mod store;

pub use calculations::{evaluate_sizes, parse_length, plan_widths, with_densities};
pub use fs_store::{FsAssetStore, hash_file};
pub use operations::{EngineError, ResizeEngine, StepResizer};
pub use store::{AssetStore, SourceImage, StoreError, VariantDescriptor};
