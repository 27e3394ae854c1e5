//! # Responsive Images
//!
//! Cached responsive image sets for HTML `<img>` tags. A template asks for an
//! image with a class expression; this crate answers with the `src`,
//! `srcset`, and `sizes` to write, producing the scaled variants on first use
//! and reusing them afterwards.
//!
//! # Request Flow
//!
//! ```text
//! "cssclass=small;userwidth=300"
//!     │
//!     ▼ args         normalized key/value arguments
//!     ▼ profile      first matching class → RenderConfig ($USERWIDTH substituted)
//!     ▼ cache        SHA-256 key of (source hash, class, user width)
//!     ▼ revalidate   cached variants must all still exist
//!     ▼ imaging      on a miss: plan widths, scale in parallel
//!     ▼ render       Rendering { src, srcset, sizes, ... }
//!     ▼ markup       <img> via Maud
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`args`] | Rendering argument parsing: `;`-strings, maps, JSON |
//! | [`config`] | `config.toml` loading, validation, merging with stock defaults |
//! | [`profile`] | Rendering class selection, inheritance, coercion into [`profile::RenderConfig`] |
//! | [`cache`] | Cache keys, cache backends (memory, file), typed variant cache, stats |
//! | [`revalidate`] | All-or-nothing existence check of cached variant sets |
//! | [`imaging`] | Asset store, `sizes` evaluation, width planning, Lanczos3 scaling |
//! | [`render`] | The orchestrator: [`render::Renderer`] and its [`render::Rendering`] result |
//! | [`markup`] | `<img>` tags and `[image]` shortcodes |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Profiles Are Data
//!
//! Rendering classes live in `config.toml` as plain tables and are handed to
//! the renderer as a value. There is no global registry; two renderers with
//! different settings can run side by side.
//!
//! ## Degrade, Don't Fail
//!
//! A missing source, an unsupported file type, or an image of unknown width
//! still renders: the original is served alone. Malformed profiles fall back
//! to `default`. Only malformed request arguments and failing resizes are
//! errors.
//!
//! ## Cache Is an Accelerator
//!
//! Every cache failure reads as a miss and every failed write is dropped.
//! Cached variant sets are revalidated against the store on each hit, so
//! purging files never serves a broken `srcset`; it costs one recomputation.

pub mod args;
pub mod cache;
pub mod config;
pub mod imaging;
pub mod markup;
pub mod output;
pub mod profile;
pub mod render;
pub mod revalidate;

#[cfg(test)]
pub(crate) mod test_helpers;
