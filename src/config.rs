//! Configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! the base layer; a user `config.toml` overrides just the keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! min_viewport = 320        # Narrowest viewport (px) the resizer plans for
//! max_viewport = 2560       # Widest viewport (px) the resizer plans for
//! rem_size = 16             # px per rem/em in `sizes` expressions
//! supported_extensions = ["bmp", "gif", "jpg", "jpeg", "png", "tif", "tiff", "webp"]
//!
//! [processing]
//! max_processes = 4         # Max parallel scaling workers (omit for auto = CPU cores)
//!
//! [rendering_classes.default]
//! sizes = "100vw"
//! max_steps = 0             # 0 = unbounded, steps are limited by size_diff
//! size_diff = 20000         # Minimum byte delta between consecutive variants
//! retina_level = 2          # 1-3
//!
//! [rendering_classes.small]
//! sizes = "120px"
//! retina_level = 2
//! ```
//!
//! ## Rendering classes
//!
//! `rendering_classes` is kept as a raw TOML table rather than a typed map.
//! Entries are matched against caller-supplied class tokens and coerced by
//! [`RenderConfig::from_profile`](crate::profile::RenderConfig::from_profile),
//! which tolerates malformed entries instead of rejecting the whole file.
//! Everything outside that table is strict: unknown keys are rejected.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the mandatory fallback profile.
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Settings loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Narrowest viewport width in px considered when planning variants.
    pub min_viewport: u32,
    /// Widest viewport width in px considered when planning variants.
    pub max_viewport: u32,
    /// Pixels per `rem`/`em` in `sizes` expressions.
    pub rem_size: u32,
    /// File extensions (lowercase) that get a responsive set.
    pub supported_extensions: Vec<String>,
    /// Parallel scaling settings.
    pub processing: ProcessingConfig,
    /// Named rendering profiles; must contain [`DEFAULT_PROFILE`].
    pub rendering_classes: toml::Table,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_viewport: 320,
            max_viewport: 2560,
            rem_size: 16,
            supported_extensions: ["bmp", "gif", "jpg", "jpeg", "png", "tif", "tiff", "webp"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            processing: ProcessingConfig::default(),
            rendering_classes: stock_rendering_classes(),
        }
    }
}

impl Settings {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_viewport == 0 {
            return Err(ConfigError::Validation(
                "max_viewport must be non-zero".into(),
            ));
        }
        if self.min_viewport > self.max_viewport {
            return Err(ConfigError::Validation(
                "min_viewport must not exceed max_viewport".into(),
            ));
        }
        if self.rem_size == 0 {
            return Err(ConfigError::Validation("rem_size must be non-zero".into()));
        }
        if self.supported_extensions.is_empty() {
            return Err(ConfigError::Validation(
                "supported_extensions must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Whether `filename` has an extension that gets a responsive set.
    pub fn is_supported(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.supported_extensions
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(ext))
            })
    }

    /// Profile names in table order, `default` included.
    pub fn profile_names(&self) -> Vec<&str> {
        self.rendering_classes.keys().map(String::as_str).collect()
    }
}

/// The stock `default` rendering profile.
pub fn stock_default_profile() -> toml::Table {
    let mut profile = toml::Table::new();
    profile.insert("sizes".into(), "100vw".into());
    profile.insert("max_steps".into(), toml::Value::Integer(0));
    profile.insert("size_diff".into(), toml::Value::Integer(20000));
    profile.insert("retina_level".into(), toml::Value::Integer(2));
    profile
}

fn stock_rendering_classes() -> toml::Table {
    let mut classes = toml::Table::new();
    classes.insert(
        DEFAULT_PROFILE.into(),
        toml::Value::Table(stock_default_profile()),
    );
    classes
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel scaling workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Settings::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Settings, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let settings: Settings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `config.toml` in the given directory.
pub fn load_config(root: &Path) -> Result<Settings, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Responsive Images Configuration
# ===============================
# All settings are optional. Values shown below are the defaults.
# Unknown keys outside [rendering_classes] will cause an error.

# Viewport range (px) the resizer plans variants for.
min_viewport = 320
max_viewport = 2560

# Pixels per rem/em when evaluating `sizes` expressions.
rem_size = 16

# File types that get a responsive set. Anything else is served as-is.
supported_extensions = ["bmp", "gif", "jpg", "jpeg", "png", "tif", "tiff", "webp"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel scaling workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Rendering classes
# ---------------------------------------------------------------------------
# The first class token of a request that names a table below selects it.
# Fields left out are inherited from `default`.
#
#   sizes          - the `sizes` attribute; $USERWIDTH is replaced by the
#                    request's userwidth argument
#   max_steps      - cap on generated variants (0 = no cap)
#   size_diff      - minimum byte delta between consecutive variants
#   retina_level   - pixel density to cover, 1-3
#   render_sizes   - explicit widths, overriding the computed steps
#   fallback_width - width attribute for files without a responsive set
[rendering_classes.default]
sizes = "100vw"
max_steps = 0
size_diff = 20000
retina_level = 2

# [rendering_classes.small]
# sizes = "120px"
# size_diff = 50000
#
# [rendering_classes.userwidth]
# sizes = "(max-width:$USERWIDTHpx) calc(100vw - 80px), $USERWIDTHpx"
# retina_level = 1
"##
}
