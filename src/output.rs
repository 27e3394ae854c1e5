//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Render
//!
//! ```text
//! beach.jpg (maxsteps_90vw)
//!     Src: /assets/3f2a9c81d0/beach__ScaleWidth1080.jpg
//!     Srcset: /assets/3f2a9c81d0/beach__ScaleWidth1080.jpg 1080w, ...
//!     Sizes: 90vw
//!     Cssclass: maxsteps_90vw
//!     Variants: computed
//!         001 1080px
//!         002 816px
//! ```
//!
//! ## Check
//!
//! ```text
//! Rendering classes
//! 001 default
//!     sizes: 100vw
//!     max_steps: unbounded
//!     size_diff: 20000 bytes
//!     retina_level: 2
//!
//! Problems
//!     rendering class 'broken' is not a table
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::config::Settings;
use crate::imaging::AssetStore;
use crate::profile::{self, RenderConfig, check_table};
use crate::render::Rendering;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn field(depth: usize, label: &str, value: impl std::fmt::Display) -> String {
    format!("{}{}: {}", indent(depth), label, value)
}

// ============================================================================
// Render
// ============================================================================

/// Format one rendering: the markup fields, then the variant set.
///
/// Empty optional fields are left out rather than shown blank.
pub fn format_rendering(filename: &str, rendering: &Rendering, store: &dyn AssetStore) -> Vec<String> {
    let mut lines = vec![match rendering.css_class() {
        Some(class) => format!("{} ({})", filename, class),
        None => filename.to_string(),
    }];

    if let Some(src) = rendering.src(store) {
        lines.push(field(1, "Src", src));
    }
    if let Some(srcset) = rendering.srcset(store) {
        lines.push(field(1, "Srcset", srcset));
    }
    if !rendering.sizes().is_empty() {
        lines.push(field(1, "Sizes", rendering.sizes()));
    }
    if let Some(class) = rendering.css_class() {
        lines.push(field(1, "Cssclass", class));
    }
    if let Some(width) = rendering.fallback_width() {
        lines.push(field(1, "Fallbackwidth", width));
    }

    lines.push(field(1, "Variants", rendering.outcome().label()));
    for (i, width) in rendering.variant_widths().iter().enumerate() {
        lines.push(format!("{}{} {}px", indent(2), format_index(i + 1), width));
    }
    lines
}

pub fn print_rendering(filename: &str, rendering: &Rendering, store: &dyn AssetStore) {
    for line in format_rendering(filename, rendering, store) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

fn format_config(config: &RenderConfig) -> Vec<String> {
    let mut lines = vec![field(1, "sizes", &config.sizes)];
    match config.max_steps {
        0 => lines.push(field(1, "max_steps", "unbounded")),
        n => lines.push(field(1, "max_steps", n)),
    }
    lines.push(field(1, "size_diff", format!("{} bytes", config.size_diff)));
    lines.push(field(1, "retina_level", config.retina_level));
    if !config.render_sizes.is_empty() {
        let widths: Vec<String> = config.render_sizes.iter().map(u32::to_string).collect();
        lines.push(field(1, "render_sizes", widths.join(", ")));
    }
    if let Some(width) = config.fallback_width {
        lines.push(field(1, "fallback_width", width));
    }
    lines
}

/// Format every rendering class as it resolves, plus any malformed entries.
pub fn format_check(settings: &Settings) -> Vec<String> {
    let table = &settings.rendering_classes;
    let mut lines = vec!["Rendering classes".to_string()];
    for (i, name) in settings.profile_names().into_iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), name));
        lines.extend(format_config(&profile::resolve(Some(name), None, table)));
    }

    let problems = check_table(table);
    if !problems.is_empty() {
        lines.push(String::new());
        lines.push("Problems".to_string());
        for problem in problems {
            lines.push(format!("{}{}", indent(1), problem));
        }
    }
    lines
}

pub fn print_check(settings: &Settings) {
    for line in format_check(settings) {
        println!("{}", line);
    }
}
