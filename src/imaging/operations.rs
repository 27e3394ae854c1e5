//! Resize engines.
//!
//! A [`ResizeEngine`] turns a source image and a resolved [`RenderConfig`]
//! into a variant set, widest first. [`StepResizer`] is the reference
//! engine: it plans widths with the pure functions in
//! [`calculations`](super::calculations) and asks the [`AssetStore`] to
//! produce each width, in parallel.

use super::calculations::{evaluate_sizes, explicit_widths, plan_widths, with_densities};
use super::store::{AssetStore, SourceImage, StoreError, VariantDescriptor};
use crate::config::Settings;
use crate::profile::RenderConfig;
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("No widths to render for {0}")]
    NoWidths(String),
}

/// Produces the variant set for one source image.
pub trait ResizeEngine: Send + Sync {
    /// Compute variants of `source` for `config`, widest first.
    fn compute_variants(
        &self,
        source: &SourceImage,
        config: &RenderConfig,
        store: &dyn AssetStore,
    ) -> Result<Vec<VariantDescriptor>, EngineError>;
}

/// Viewport-driven engine stepping down by estimated file size.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResizer {
    pub min_viewport: u32,
    pub max_viewport: u32,
    pub rem_size: u32,
}

impl StepResizer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            min_viewport: settings.min_viewport,
            max_viewport: settings.max_viewport,
            rem_size: settings.rem_size,
        }
    }

    /// Plan the widths for `source` without touching the store.
    ///
    /// Explicit `render_sizes` win. Otherwise the `sizes` expression is
    /// evaluated at the largest viewport (times `retina_level`) for the
    /// widest width and at the smallest viewport for the narrowest. An
    /// unparseable expression behaves like `100vw`. With `retina_level` above
    /// 1 the set also holds the slot width at every lower density.
    pub fn plan(&self, source: &SourceImage, config: &RenderConfig) -> Vec<u32> {
        if !config.render_sizes.is_empty() {
            return explicit_widths(&config.render_sizes, source.width());
        }

        let rem = self.rem_size as f64;
        let max_vp = self.max_viewport as f64;
        let min_vp = self.min_viewport as f64;
        let at_max = evaluate_sizes(&config.sizes, max_vp, rem).unwrap_or(max_vp);
        let at_min = evaluate_sizes(&config.sizes, min_vp, rem).unwrap_or(min_vp);

        let widest = (at_max * config.retina_level.max(1) as f64).round() as u32;
        let narrowest = at_min.round() as u32;

        let stepped = plan_widths(
            (source.width(), source.filesize),
            (widest, narrowest),
            config.size_diff,
            config.max_steps,
        );
        with_densities(stepped, at_max, config.retina_level, source.width())
    }
}

impl ResizeEngine for StepResizer {
    fn compute_variants(
        &self,
        source: &SourceImage,
        config: &RenderConfig,
        store: &dyn AssetStore,
    ) -> Result<Vec<VariantDescriptor>, EngineError> {
        let widths = self.plan(source, config);
        if widths.is_empty() {
            return Err(EngineError::NoWidths(source.filename().to_string()));
        }
        debug!(file = %source.filename(), ?widths, "planned variant widths");

        // par_iter + collect keeps input order
        let variants = widths
            .par_iter()
            .map(|&width| store.scale(&source.descriptor, width))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(variants)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::store::tests::{MockStore, RecordedOp};
    use std::sync::Mutex;

    /// Engine that scales a fixed list of widths and counts its calls.
    pub struct MockEngine {
        pub widths: Vec<u32>,
        pub calls: Mutex<u32>,
        pub fail: bool,
    }

    impl MockEngine {
        pub fn new(widths: &[u32]) -> Self {
            Self {
                widths: widths.to_vec(),
                calls: Mutex::new(0),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(&[])
            }
        }

        pub fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl ResizeEngine for MockEngine {
        fn compute_variants(
            &self,
            source: &SourceImage,
            _config: &RenderConfig,
            store: &dyn AssetStore,
        ) -> Result<Vec<VariantDescriptor>, EngineError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(EngineError::NoWidths(source.filename().to_string()));
            }
            self.widths
                .iter()
                .map(|&w| store.scale(&source.descriptor, w).map_err(EngineError::from))
                .collect()
        }
    }

    fn resizer() -> StepResizer {
        StepResizer {
            min_viewport: 320,
            max_viewport: 1200,
            rem_size: 16,
        }
    }

    fn source(width: u32, filesize: u64) -> SourceImage {
        SourceImage {
            descriptor: VariantDescriptor::original("photo.jpg", "abc123", width),
            filesize,
            exists: true,
        }
    }

    fn config(sizes: &str, max_steps: u32, size_diff: u64, retina_level: u8) -> RenderConfig {
        RenderConfig {
            sizes: sizes.to_string(),
            max_steps,
            size_diff,
            retina_level,
            ..RenderConfig::default()
        }
    }

    // =========================================================================
    // Planning
    // =========================================================================

    #[test]
    fn plan_90vw_four_steps() {
        let widths = resizer().plan(&source(1200, 400_000), &config("90vw", 4, 1000, 1));
        assert_eq!(widths, vec![1080, 816, 552, 288]);
    }

    #[test]
    fn plan_retina_keeps_one_width_per_density() {
        let widths = resizer().plan(&source(2400, 400_000), &config("90vw", 4, 2_000_000, 2));
        assert_eq!(widths, vec![2160, 1080]);
    }

    #[test]
    fn plan_retina_is_capped_at_source() {
        let widths = resizer().plan(&source(1200, 400_000), &config("90vw", 4, 2_000_000, 2));
        assert_eq!(widths, vec![1200, 1080]);
    }

    #[test]
    fn plan_small_fixed_width_with_retina() {
        let widths = resizer().plan(&source(2400, 400_000), &config("120px", 0, 50_000, 2));
        assert_eq!(widths, vec![240, 120]);
    }

    #[test]
    fn plan_render_sizes_override() {
        let cfg = RenderConfig {
            render_sizes: vec![400, 800, 2000],
            ..config("100vw", 0, 50_000, 1)
        };
        assert_eq!(resizer().plan(&source(1200, 1), &cfg), vec![1200, 800, 400]);
    }

    #[test]
    fn plan_unparseable_sizes_uses_full_viewport() {
        let widths = resizer().plan(&source(4000, 10_000), &config("auto", 0, 50_000, 1));
        assert_eq!(widths, vec![1200]);
    }

    // =========================================================================
    // compute_variants
    // =========================================================================

    #[test]
    fn compute_variants_scales_every_width_in_order() {
        let store = MockStore::new();
        let variants = resizer()
            .compute_variants(&source(1200, 400_000), &config("90vw", 4, 1000, 1), &store)
            .unwrap();

        let widths: Vec<u32> = variants.iter().map(|v| v.width).collect();
        assert_eq!(widths, vec![1080, 816, 552, 288]);
        assert_eq!(store.scale_count(), 4);
        assert!(
            store
                .get_operations()
                .iter()
                .all(|op| matches!(op, RecordedOp::Scale(_)))
        );
    }

    #[test]
    fn compute_variants_zero_width_errors() {
        let store = MockStore::new();
        let result = resizer().compute_variants(&source(0, 0), &config("100vw", 0, 1, 1), &store);
        assert!(matches!(result, Err(EngineError::NoWidths(_))));
        assert_eq!(store.scale_count(), 0);
    }
}
