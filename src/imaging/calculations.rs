//! Pure calculation functions for variant widths.
//!
//! All functions here are pure and testable without any I/O or images:
//! evaluating a `sizes` attribute at a given viewport, and planning the
//! list of widths a variant set should contain.

/// Evaluate a `sizes` attribute value at a viewport width.
///
/// Entries are comma-separated `[(media-condition)] length` pairs and the
/// first entry whose condition matches (or that has no condition) wins, as
/// in a browser. Lengths may use `px`, `vw`, `rem`, `em`, or a `calc()`
/// of those joined by `+`/`-`.
///
/// # Arguments
/// * `sizes` - The attribute value, e.g. `"(max-width: 600px) 100vw, 50vw"`
/// * `viewport` - Viewport width in CSS pixels
/// * `rem` - Root font size in CSS pixels
///
/// # Returns
/// * The slot width in CSS pixels, or `None` if no entry could be evaluated
pub fn evaluate_sizes(sizes: &str, viewport: f64, rem: f64) -> Option<f64> {
    for entry in split_top_level(sizes, |c| c == ',') {
        let tokens = split_top_level(entry, char::is_whitespace);
        let Some((length, condition)) = tokens.split_last() else {
            continue;
        };
        if !condition.is_empty() && !media_matches(condition, viewport, rem) {
            continue;
        }
        if let Some(px) = parse_length(length, viewport, rem) {
            return Some(px.max(0.0));
        }
    }
    None
}

/// Split on separator characters that are not nested inside parentheses.
/// Empty pieces are dropped.
fn split_top_level(s: &str, is_sep: impl Fn(char) -> bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if depth == 0 && is_sep(c) => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Evaluate a media condition made of `(feature: value)` groups joined by
/// `and`, optionally prefixed with `not`. Unknown features never match.
fn media_matches(tokens: &[&str], viewport: f64, rem: f64) -> bool {
    let mut negate = false;
    let mut matched = true;
    for token in tokens {
        let lower = token.to_ascii_lowercase();
        match lower.as_str() {
            "not" => negate = true,
            "and" | "only" | "screen" | "all" => {}
            group => {
                let Some(inner) = group.strip_prefix('(').and_then(|g| g.strip_suffix(')')) else {
                    return false;
                };
                matched &= feature_matches(inner, viewport, rem);
            }
        }
    }
    matched != negate
}

fn feature_matches(feature: &str, viewport: f64, rem: f64) -> bool {
    let Some((name, value)) = feature.split_once(':') else {
        return false;
    };
    let Some(limit) = parse_length(value, viewport, rem) else {
        return false;
    };
    match name.trim() {
        "max-width" => viewport <= limit,
        "min-width" => viewport >= limit,
        _ => false,
    }
}

/// Parse a single CSS length into pixels.
///
/// Unitless numbers are taken as pixels.
pub fn parse_length(s: &str, viewport: f64, rem: f64) -> Option<f64> {
    let s = s.trim().to_ascii_lowercase();
    if let Some(inner) = s.strip_prefix("calc(").and_then(|c| c.strip_suffix(')')) {
        return evaluate_calc(inner, viewport, rem);
    }
    let (number, factor) = if let Some(n) = s.strip_suffix("px") {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix("vw") {
        (n, viewport / 100.0)
    } else if let Some(n) = s.strip_suffix("rem") {
        (n, rem)
    } else if let Some(n) = s.strip_suffix("em") {
        (n, rem)
    } else {
        (s.as_str(), 1.0)
    };
    let value: f64 = number.trim().parse().ok()?;
    value.is_finite().then_some(value * factor)
}

fn evaluate_calc(expr: &str, viewport: f64, rem: f64) -> Option<f64> {
    let tokens = split_top_level(expr, char::is_whitespace);
    let mut iter = tokens.into_iter();
    let mut total = calc_term(iter.next()?, viewport, rem)?;
    while let Some(op) = iter.next() {
        let rhs = calc_term(iter.next()?, viewport, rem)?;
        match op {
            "+" => total += rhs,
            "-" => total -= rhs,
            _ => return None,
        }
    }
    Some(total)
}

fn calc_term(term: &str, viewport: f64, rem: f64) -> Option<f64> {
    match term.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => evaluate_calc(inner, viewport, rem),
        None => parse_length(term, viewport, rem),
    }
}

/// Widths requested explicitly by a profile's `render_sizes`.
///
/// Capped at the source width, zero entries dropped, widest first,
/// duplicates removed.
pub fn explicit_widths(render_sizes: &[u32], source_width: u32) -> Vec<u32> {
    let mut widths: Vec<u32> = render_sizes
        .iter()
        .map(|&w| w.min(source_width))
        .filter(|&w| w > 0)
        .collect();
    widths.sort_unstable_by(|a, b| b.cmp(a));
    widths.dedup();
    widths
}

/// Plan the widths of a variant set, widest first.
///
/// Starting from `widest`, each following width is the largest one whose
/// estimated file size is at least `size_diff` bytes smaller than the
/// previous. File size is estimated as proportional to pixel area:
/// `filesize × (w / source_width)²`. Planning stops at `narrowest`.
///
/// When `max_steps > 0` and the stepping produced more widths than that,
/// the result is replaced by `max_steps` widths spread linearly between
/// `widest` and `narrowest`.
///
/// # Arguments
/// * `source` - Source `(width, filesize in bytes)`
/// * `range` - `(widest, narrowest)` target widths before capping
/// * `size_diff` - Minimum estimated byte saving per step
/// * `max_steps` - Step cap, `0` for unbounded
pub fn plan_widths(source: (u32, u64), range: (u32, u32), size_diff: u64, max_steps: u32) -> Vec<u32> {
    let (source_width, filesize) = source;
    if source_width == 0 {
        return Vec::new();
    }
    let widest = range.0.clamp(1, source_width);
    let narrowest = range.1.clamp(1, widest);
    let size_diff = size_diff.max(1) as f64;
    let filesize = filesize as f64;

    let estimate = |w: u32| filesize * (w as f64 / source_width as f64).powi(2);

    let mut widths = vec![widest];
    let mut current = widest;
    while max_steps == 0 || widths.len() <= max_steps as usize {
        let target = estimate(current) - size_diff;
        if target <= 0.0 || filesize <= 0.0 {
            break;
        }
        let next = (source_width as f64 * (target / filesize).sqrt()).floor() as u32;
        if next < narrowest || next >= current {
            break;
        }
        widths.push(next);
        current = next;
    }

    if max_steps > 0 && widths.len() > max_steps as usize {
        return spread_widths(widest, narrowest, max_steps);
    }
    widths
}

/// Add the width of each lower pixel density to a planned set.
///
/// `slot` is the 1x width the image occupies at the largest viewport. For
/// `retina_level` N the set gets `slot × d` for every `d` in `1..N`, capped at
/// the source width. The result is deduplicated, widest first.
pub fn with_densities(mut widths: Vec<u32>, slot: f64, retina_level: u8, source_width: u32) -> Vec<u32> {
    if source_width == 0 || slot <= 0.0 {
        return widths;
    }
    for density in 1..retina_level.max(1) {
        let width = (slot * density as f64).round() as u32;
        widths.push(width.clamp(1, source_width));
    }
    widths.sort_unstable_by(|a, b| b.cmp(a));
    widths.dedup();
    widths
}

/// `steps` widths spread linearly from `widest` down to `narrowest`.
pub fn spread_widths(widest: u32, narrowest: u32, steps: u32) -> Vec<u32> {
    if steps <= 1 || widest <= narrowest {
        return vec![widest];
    }
    let span = (widest - narrowest) as f64;
    let last = (steps - 1) as f64;
    let mut widths: Vec<u32> = (0..steps)
        .map(|i| (widest as f64 - span * i as f64 / last).round() as u32)
        .collect();
    widths.dedup();
    widths
}
