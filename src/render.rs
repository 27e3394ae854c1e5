//! Rendering orchestration.
//!
//! [`Renderer::render`] is the one entry point a host calls per image tag.
//! It walks a short state machine:
//!
//! ```text
//! parse args ─► resolve config (config cache first)
//!            ─► source unusable? ──yes──► passthrough (original only)
//!            ─► cached variant set? ─yes─► revalidate ─ok─► hit
//!            ─► engine ─► store set ─► computed
//! ```
//!
//! The result is a [`Rendering`]: a short-lived value holding everything the
//! markup layer needs. Nothing is memoized on the source image itself; the
//! cache owned by the renderer is the only state that outlives a request.

use crate::args::{self, ArgInput, ArgsError, RenderingArguments};
use crate::cache::{CacheBackend, CacheError, CacheOutcome, VariantCache, cache_base_key};
use crate::config::Settings;
use crate::imaging::{AssetStore, EngineError, ResizeEngine, SourceImage, VariantDescriptor};
use crate::profile::{self, RenderConfig};
use crate::revalidate::revalidate_in;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("{0}")]
    InvalidArgument(#[from] ArgsError),
    #[error("Resize engine failed: {0}")]
    Engine(#[from] EngineError),
}

/// Ties together profile resolution, the render cache, an asset store and
/// a resize engine.
///
/// Collaborators are `Send + Sync`, so a renderer can be shared across
/// request threads behind an `Arc`. Concurrent misses for the same key may
/// both run the engine; the last cache write wins.
pub struct Renderer<C, S, E> {
    settings: Settings,
    cache: VariantCache<C>,
    store: S,
    engine: E,
}

impl<C: CacheBackend, S: AssetStore, E: ResizeEngine> Renderer<C, S, E> {
    pub fn new(settings: Settings, cache: C, store: S, engine: E) -> Self {
        Self {
            settings,
            cache: VariantCache::new(cache),
            store,
            engine,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &VariantCache<C> {
        &self.cache
    }

    /// Render `source` for one request.
    ///
    /// Only malformed arguments and engine failures are errors. An absent
    /// source, an unsupported file type, or an unknown width degrade to the
    /// original image.
    pub fn render(
        &self,
        source: &SourceImage,
        input: impl Into<ArgInput>,
    ) -> Result<Rendering, RenderError> {
        let arguments = args::parse(input.into())?;
        let base = cache_base_key(source.hash(), arguments.css_class(), arguments.user_width());
        debug!(file = %source.filename(), key = %base, "render");

        let (config, config_cached) = self.config_for(&base, &arguments);
        let supported = self.settings.is_supported(source.filename());

        let (variants, outcome) = if !source.exists || !supported || source.width() == 0 {
            debug!(
                file = %source.filename(),
                exists = source.exists,
                supported,
                width = source.width(),
                "serving original"
            );
            (vec![source.descriptor.clone()], CacheOutcome::Passthrough)
        } else {
            self.variant_set(&base, source, &config)?
        };

        Ok(Rendering {
            arguments,
            config,
            variants,
            supported,
            outcome,
            config_cached,
        })
    }

    /// Drop every cached configuration, variant set and shortcode markup.
    pub fn flush(&self) -> Result<(), CacheError> {
        self.cache.clear_all()?;
        info!("render cache flushed");
        Ok(())
    }

    fn config_for(&self, base: &str, arguments: &RenderingArguments) -> (RenderConfig, bool) {
        if let Some(config) = self.cache.get_config(base) {
            return (config, true);
        }
        let config = profile::resolve(
            arguments.css_class(),
            arguments.user_width(),
            &self.settings.rendering_classes,
        );
        self.cache.set_config(base, &config);
        (config, false)
    }

    fn variant_set(
        &self,
        base: &str,
        source: &SourceImage,
        config: &RenderConfig,
    ) -> Result<(Vec<VariantDescriptor>, CacheOutcome), RenderError> {
        let mut outcome = CacheOutcome::Miss;
        if let Some(cached) = self.cache.get_variants(base) {
            match revalidate_in(cached, &self.store) {
                Some(valid) => return Ok((valid, CacheOutcome::Hit)),
                None => outcome = CacheOutcome::Invalidated,
            }
        }

        info!(file = %source.filename(), sizes = %config.sizes, "computing variants");
        let variants = self.engine.compute_variants(source, config, &self.store)?;
        if variants.is_empty() {
            warn!(file = %source.filename(), "engine produced no variants, serving original");
            return Ok((vec![source.descriptor.clone()], CacheOutcome::Passthrough));
        }
        self.cache.set_variants(base, &variants);
        Ok((variants, outcome))
    }
}

/// Result of one render: what the markup layer reads.
#[derive(Debug, Clone)]
pub struct Rendering {
    arguments: RenderingArguments,
    config: RenderConfig,
    variants: Vec<VariantDescriptor>,
    supported: bool,
    outcome: CacheOutcome,
    config_cached: bool,
}

impl Rendering {
    /// URL of the widest variant.
    pub fn src(&self, store: &dyn AssetStore) -> Option<String> {
        self.variants.first().map(|v| store.url_for(v))
    }

    /// `"<url> <width>w"` entries joined by `", "`.
    ///
    /// `None` for unsupported file types, and when no variant has a known
    /// width.
    pub fn srcset(&self, store: &dyn AssetStore) -> Option<String> {
        if !self.supported {
            return None;
        }
        let entries: Vec<String> = self
            .variants
            .iter()
            .filter(|v| v.width > 0)
            .map(|v| format!("{} {}w", store.url_for(v), v.width))
            .collect();
        (!entries.is_empty()).then(|| entries.join(", "))
    }

    /// Resolved `sizes` attribute; empty for unsupported file types.
    pub fn sizes(&self) -> &str {
        if self.supported { &self.config.sizes } else { "" }
    }

    /// The raw class expression of the request.
    pub fn css_class(&self) -> Option<&str> {
        self.arguments.css_class()
    }

    pub fn user_width(&self) -> Option<&str> {
        self.arguments.user_width()
    }

    /// Profile fallback width, only meaningful without a `sizes` value.
    pub fn fallback_width(&self) -> Option<u32> {
        if self.sizes().is_empty() {
            self.config.fallback_width
        } else {
            None
        }
    }

    pub fn variant_widths(&self) -> Vec<u32> {
        self.variants.iter().map(|v| v.width).collect()
    }

    pub fn variants(&self) -> &[VariantDescriptor] {
        &self.variants
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn arguments(&self) -> &RenderingArguments {
        &self.arguments
    }

    pub fn outcome(&self) -> CacheOutcome {
        self.outcome
    }

    /// Whether the configuration came from the config cache.
    pub fn config_cached(&self) -> bool {
        self.config_cached
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }
}
