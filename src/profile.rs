//! Rendering profile resolution.
//!
//! Turns a class token expression (e.g. `"small other-class"`), an optional
//! user width, and the configured `rendering_classes` table into a
//! [`RenderConfig`]:
//!
//! 1. The **first** token that names a table entry selects it. No token, or
//!    no match, selects `default`.
//! 2. A selected profile is shallow-merged over `default`: its fields win,
//!    missing ones are inherited.
//! 3. Every `$USERWIDTH` in a string, at any depth, is replaced by the user
//!    width when one was given.
//! 4. The merged table is coerced into a typed [`RenderConfig`]. Coercion is
//!    total: non-numeric or out-of-range values fall back to defaults.
//!
//! Malformed entries never fail a render. A profile that is not a table is
//! logged and replaced by `default`; a malformed or missing `default` is
//! replaced by the stock default profile.

use crate::config::{DEFAULT_PROFILE, stock_default_profile};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Placeholder substituted with the request's user width.
pub const USER_WIDTH_PLACEHOLDER: &str = "$USERWIDTH";

pub const DEFAULT_MAX_STEPS: u32 = 0;
pub const DEFAULT_SIZE_DIFF: u64 = 50_000;
pub const DEFAULT_RETINA_LEVEL: u8 = 1;
pub const MAX_RETINA_LEVEL: u8 = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileError {
    #[error("rendering class '{0}' is not a table")]
    InvalidConfiguration(String),
    #[error("rendering class 'default' is missing")]
    MissingDefault,
}

/// A fully resolved rendering profile.
///
/// Created once per distinct (class expression, user width) pair and cached;
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Value for the `sizes` attribute.
    pub sizes: String,
    /// Cap on generated variants; `0` means no cap.
    pub max_steps: u32,
    /// Minimum estimated byte delta between consecutive variants.
    pub size_diff: u64,
    /// Pixel density to cover, `1..=3`.
    pub retina_level: u8,
    /// Explicit widths overriding the computed steps.
    pub render_sizes: Vec<u32>,
    /// Width for sources that get no responsive set.
    pub fallback_width: Option<u32>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sizes: String::new(),
            max_steps: DEFAULT_MAX_STEPS,
            size_diff: DEFAULT_SIZE_DIFF,
            retina_level: DEFAULT_RETINA_LEVEL,
            render_sizes: Vec::new(),
            fallback_width: None,
        }
    }
}

impl RenderConfig {
    /// Coerce a raw profile table into a typed config.
    ///
    /// Integers, floats, and numeric strings count as numbers (truncated).
    /// Anything else falls back to the field's default.
    pub fn from_profile(profile: &toml::Table) -> Self {
        let sizes = profile
            .get("sizes")
            .and_then(toml::Value::as_str)
            .unwrap_or_default()
            .to_string();

        let max_steps = profile
            .get("max_steps")
            .and_then(numeric)
            .map(|n| n.max(0.0) as u32)
            .unwrap_or(DEFAULT_MAX_STEPS);

        let size_diff = profile
            .get("size_diff")
            .and_then(numeric)
            .filter(|n| *n >= 1.0)
            .map(|n| n as u64)
            .unwrap_or(DEFAULT_SIZE_DIFF);

        let retina_level = profile
            .get("retina_level")
            .and_then(numeric)
            .map(|n| (n as i64).clamp(1, MAX_RETINA_LEVEL as i64) as u8)
            .unwrap_or(DEFAULT_RETINA_LEVEL);

        let render_sizes = match profile.get("render_sizes") {
            Some(toml::Value::Array(items)) => items.iter().filter_map(positive_width).collect(),
            Some(single) => positive_width(single).into_iter().collect(),
            None => Vec::new(),
        };

        let fallback_width = profile.get("fallback_width").and_then(positive_width);

        Self {
            sizes,
            max_steps,
            size_diff,
            retina_level,
            render_sizes,
            fallback_width,
        }
    }
}

fn numeric(value: &toml::Value) -> Option<f64> {
    let n = match value {
        toml::Value::Integer(i) => *i as f64,
        toml::Value::Float(f) => *f,
        toml::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn positive_width(value: &toml::Value) -> Option<u32> {
    numeric(value).filter(|n| *n >= 1.0).map(|n| n as u32)
}

/// Resolve the profile for a class expression and optional user width.
pub fn resolve(
    class_expr: Option<&str>,
    user_width: Option<&str>,
    table: &toml::Table,
) -> RenderConfig {
    let default = default_profile(table);

    let merged = match class_expr.and_then(|expr| select_profile(expr, table)) {
        Some((name, value)) => match profile_table(name, value) {
            Ok(profile) => merge_profiles(&default, profile),
            Err(e) => {
                warn!("{e}; falling back to '{DEFAULT_PROFILE}'");
                default
            }
        },
        None => default,
    };

    let merged = match user_width {
        Some(width) => substitute_table(merged, width),
        None => merged,
    };

    RenderConfig::from_profile(&merged)
}

/// First whitespace-separated token of `class_expr` that names a table entry.
pub fn select_profile<'e, 't>(
    class_expr: &'e str,
    table: &'t toml::Table,
) -> Option<(&'e str, &'t toml::Value)> {
    class_expr
        .split_whitespace()
        .find_map(|token| table.get(token).map(|value| (token, value)))
}

fn profile_table<'a>(name: &str, value: &'a toml::Value) -> Result<&'a toml::Table, ProfileError> {
    value
        .as_table()
        .ok_or_else(|| ProfileError::InvalidConfiguration(name.to_string()))
}

fn default_profile(table: &toml::Table) -> toml::Table {
    let result = table
        .get(DEFAULT_PROFILE)
        .ok_or(ProfileError::MissingDefault)
        .and_then(|value| profile_table(DEFAULT_PROFILE, value));
    match result {
        Ok(profile) => profile.clone(),
        Err(e) => {
            warn!("{e}; using the stock default profile");
            stock_default_profile()
        }
    }
}

/// Shallow merge: every field of `profile` replaces the same field of `base`.
fn merge_profiles(base: &toml::Table, profile: &toml::Table) -> toml::Table {
    let mut merged = base.clone();
    for (key, value) in profile {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn substitute_table(table: toml::Table, width: &str) -> toml::Table {
    table
        .into_iter()
        .map(|(key, value)| (key, substitute(value, width)))
        .collect()
}

fn substitute(value: toml::Value, width: &str) -> toml::Value {
    match value {
        toml::Value::String(s) => toml::Value::String(s.replace(USER_WIDTH_PLACEHOLDER, width)),
        toml::Value::Array(items) => {
            toml::Value::Array(items.into_iter().map(|v| substitute(v, width)).collect())
        }
        toml::Value::Table(table) => toml::Value::Table(substitute_table(table, width)),
        other => other,
    }
}

/// Report every malformed entry of a profile table.
///
/// Used by the `check` command; rendering itself recovers from all of them.
pub fn check_table(table: &toml::Table) -> Vec<ProfileError> {
    let mut problems = Vec::new();
    if !table.contains_key(DEFAULT_PROFILE) {
        problems.push(ProfileError::MissingDefault);
    }
    for (name, value) in table {
        if let Err(e) = profile_table(name, value) {
            problems.push(e);
        }
    }
    problems
}
