//! Render cache: resolved configurations and variant sets.
//!
//! Resolving a profile is cheap, producing variants is not. Decoding and
//! resampling a large photo several times can take seconds. This module
//! remembers both results per `(source, class expression, user width)` so a
//! repeated render never re-plans or re-encodes.
//!
//! ## Cache keys
//!
//! The base key is a SHA-256 over the source's content hash, the raw class
//! expression (`"default"` when there is none) and the user width when one
//! was given. Every other rendering argument (`alt`, `title`, ...) is
//! deliberately left out: it changes markup, not pixels.
//!
//! Two entries hang off each base key:
//!
//! - `<base>_config`: the [`RenderConfig`] the request resolved to
//! - `<base>_variants`: the variant set, widest first
//!
//! Shortcodes cache their finished markup under `<key>_markup`, keyed by
//! [`shortcode_key`] over the source hash and every shortcode argument.
//!
//! ## Staleness
//!
//! Entries never expire. A cached variant set may still point at files that
//! were purged from the asset store since; callers revalidate hits with
//! [`revalidate`](crate::revalidate::revalidate) before trusting them.
//!
//! ## Failure model
//!
//! The cache is an accelerator. A backend read error or an entry that no
//! longer decodes is logged and treated as a miss. A failed write is logged
//! and swallowed: the only cost is recomputation on the next request.

use crate::args::{ArgValue, RenderingArguments};
use crate::imaging::VariantDescriptor;
use crate::profile::RenderConfig;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Version of the key derivation. Bump this to orphan all existing entries
/// when the key computation or the stored value format changes.
const KEY_VERSION: u32 = 1;

/// Class sentinel used in keys when no class expression was given.
const DEFAULT_CLASS: &str = "default";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// Base cache key for one rendering request.
///
/// Deterministic: equal inputs always give equal keys. An empty class
/// expression is the same as none.
pub fn cache_base_key(source_hash: &str, class_expr: Option<&str>, user_width: Option<&str>) -> String {
    let class = class_expr.filter(|c| !c.is_empty()).unwrap_or(DEFAULT_CLASS);
    let mut hasher = Sha256::new();
    hasher.update(b"render\0");
    hasher.update(KEY_VERSION.to_le_bytes());
    hasher.update(source_hash.as_bytes());
    hasher.update(b"\0");
    hasher.update(class.as_bytes());
    hasher.update(b"\0");
    match user_width {
        Some(width) => {
            hasher.update(b"\x01");
            hasher.update(width.as_bytes());
            hasher.update(b"\0");
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Cache key for a shortcode's markup.
///
/// Covers every argument, `alt` and `title` included, since they all end
/// up in the markup.
pub fn shortcode_key(source_hash: &str, attrs: &RenderingArguments) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"shortcode\0");
    hasher.update(KEY_VERSION.to_le_bytes());
    hasher.update(source_hash.as_bytes());
    hasher.update(b"\0");
    for (key, value) in attrs.iter() {
        hasher.update(key.as_bytes());
        match value {
            ArgValue::Flag => hasher.update(b"\x00"),
            ArgValue::Text(text) => {
                hasher.update(b"\x01");
                hasher.update(text.as_bytes());
            }
        }
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

pub fn config_key(base: &str) -> String {
    format!("{base}_config")
}

pub fn variant_key(base: &str) -> String {
    format!("{base}_variants")
}

pub fn markup_key(base: &str) -> String {
    format!("{base}_markup")
}

/// Rendered shortcode markup and the stored files it points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMarkup {
    pub markup: String,
    pub files: Vec<VariantDescriptor>,
}

/// Key/value storage behind a [`VariantCache`].
///
/// Values are opaque strings. Implementations must tolerate concurrent use;
/// concurrent writers to one key may race, last write wins.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: String) -> Result<(), CacheError>;
    /// Remove every entry. Succeeds when there is nothing to remove.
    fn clear(&self) -> Result<(), CacheError>;
}

/// Process-local backend.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// One JSON file per key under a directory.
///
/// The directory is created on first write. It can live anywhere the
/// process may write, e.g. `.cache/responsive-images/`.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

/// Extension of entry files; `clear` only removes files carrying it.
const ENTRY_EXTENSION: &str = "json";

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.{ENTRY_EXTENSION}")))
    }
}

impl CacheBackend for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.entry_path(key)?) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(path, value)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    // Another flush got there first.
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}

/// Typed view over a [`CacheBackend`].
pub struct VariantCache<B> {
    backend: B,
}

impl<B: CacheBackend> VariantCache<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn get_config(&self, base: &str) -> Option<RenderConfig> {
        self.read(&config_key(base))
    }

    pub fn set_config(&self, base: &str, config: &RenderConfig) {
        self.write(&config_key(base), config);
    }

    /// Cached variant set, if any. An empty set counts as a miss.
    pub fn get_variants(&self, base: &str) -> Option<Vec<VariantDescriptor>> {
        self.read::<Vec<VariantDescriptor>>(&variant_key(base))
            .filter(|set| !set.is_empty())
    }

    pub fn set_variants(&self, base: &str, variants: &[VariantDescriptor]) {
        self.write(&variant_key(base), &variants);
    }

    pub fn get_markup(&self, key: &str) -> Option<CachedMarkup> {
        self.read(&markup_key(key))
    }

    pub fn set_markup(&self, key: &str, entry: &CachedMarkup) {
        self.write(&markup_key(key), entry);
    }

    /// Drop every cached configuration, variant set and markup entry.
    pub fn clear_all(&self) -> Result<(), CacheError> {
        self.backend.clear()
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(CacheError::from)
            .and_then(|json| self.backend.set(key, json));
        if let Err(e) = result {
            warn!(key, error = %e, "cache write failed");
        }
    }
}

/// How a single render obtained its variant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Source unusable; the original was served as-is.
    Passthrough,
    /// Valid cached set.
    Hit,
    /// Nothing cached; the engine ran.
    Miss,
    /// A cached set referenced a missing file; the engine ran.
    Invalidated,
}

impl CacheOutcome {
    pub fn label(self) -> &'static str {
        match self {
            CacheOutcome::Passthrough => "passthrough",
            CacheOutcome::Hit => "cached",
            CacheOutcome::Miss => "computed",
            CacheOutcome::Invalidated => "recomputed",
        }
    }
}

/// Summary of cache performance over a run.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub config_hits: u32,
    pub config_misses: u32,
    pub hits: u32,
    pub misses: u32,
    pub invalidated: u32,
    pub passthrough: u32,
}

impl CacheStats {
    pub fn config(&mut self, hit: bool) {
        if hit {
            self.config_hits += 1;
        } else {
            self.config_misses += 1;
        }
    }

    pub fn record(&mut self, outcome: CacheOutcome) {
        match outcome {
            CacheOutcome::Passthrough => self.passthrough += 1,
            CacheOutcome::Hit => self.hits += 1,
            CacheOutcome::Miss => self.misses += 1,
            CacheOutcome::Invalidated => self.invalidated += 1,
        }
    }

    /// Number of engine runs.
    pub fn computed(&self) -> u32 {
        self.misses + self.invalidated
    }

    pub fn total(&self) -> u32 {
        self.hits + self.computed() + self.passthrough
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(f, "{} cached, {} computed", self.hits, self.computed())?;
        } else {
            write!(f, "{} computed", self.computed())?;
        }
        if self.invalidated > 0 {
            write!(f, " ({} stale)", self.invalidated)?;
        }
        if self.passthrough > 0 {
            write!(f, ", {} passthrough", self.passthrough)?;
        }
        if self.config_hits + self.config_misses > 0 {
            write!(
                f,
                "; config: {} cached, {} resolved",
                self.config_hits, self.config_misses
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(width: u32) -> VariantDescriptor {
        VariantDescriptor {
            filename: "photo.jpg".into(),
            hash: "abc123".into(),
            variant: Some(format!("ScaleWidth{width}")),
            width,
        }
    }

    /// Backend whose every call fails.
    struct BrokenBackend;

    impl CacheBackend for BrokenBackend {
        fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Io(io::Error::other("backend down")))
        }
        fn set(&self, _key: &str, _value: String) -> Result<(), CacheError> {
            Err(CacheError::Io(io::Error::other("backend down")))
        }
        fn clear(&self) -> Result<(), CacheError> {
            Err(CacheError::Io(io::Error::other("backend down")))
        }
    }

    // =========================================================================
    // Keys
    // =========================================================================

    #[test]
    fn base_key_is_deterministic() {
        let a = cache_base_key("hash1", Some("small"), Some("300"));
        let b = cache_base_key("hash1", Some("small"), Some("300"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn base_key_varies_with_each_input() {
        let base = cache_base_key("hash1", Some("small"), Some("300"));
        assert_ne!(base, cache_base_key("hash2", Some("small"), Some("300")));
        assert_ne!(base, cache_base_key("hash1", Some("wide"), Some("300")));
        assert_ne!(base, cache_base_key("hash1", Some("small"), Some("301")));
        assert_ne!(base, cache_base_key("hash1", Some("small"), None));
    }

    #[test]
    fn missing_class_uses_default_sentinel() {
        let none = cache_base_key("hash1", None, None);
        assert_eq!(none, cache_base_key("hash1", Some(""), None));
        assert_eq!(none, cache_base_key("hash1", Some("default"), None));
    }

    #[test]
    fn empty_user_width_differs_from_none() {
        assert_ne!(
            cache_base_key("hash1", None, Some("")),
            cache_base_key("hash1", None, None)
        );
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        assert_ne!(
            cache_base_key("ab", Some("c"), None),
            cache_base_key("a", Some("bc"), None)
        );
    }

    #[test]
    fn namespaced_keys() {
        assert_eq!(config_key("k"), "k_config");
        assert_eq!(variant_key("k"), "k_variants");
        assert_eq!(markup_key("k"), "k_markup");
    }

    // =========================================================================
    // MemoryCache
    // =========================================================================

    #[test]
    fn shortcode_key_covers_every_argument() {
        let attrs = RenderingArguments::new().with("alt", "Sunset").with("class", "small");
        let key = shortcode_key("hash1", &attrs);
        assert_eq!(key, shortcode_key("hash1", &attrs.clone()));
        assert_ne!(key, shortcode_key("hash2", &attrs));
        assert_ne!(
            key,
            shortcode_key("hash1", &attrs.clone().with("alt", "Sunrise"))
        );

        let mut flagged = attrs.clone();
        flagged.insert("lazy", ArgValue::Flag);
        assert_ne!(key, shortcode_key("hash1", &flagged));
        assert_ne!(
            shortcode_key("hash1", &flagged),
            shortcode_key("hash1", &attrs.clone().with("lazy", ""))
        );
    }

    #[test]
    fn memory_cache_set_get_clear() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").unwrap(), None);
        cache.set("k", "v".into()).unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));
        cache.clear().unwrap();
        assert!(cache.is_empty());
        cache.clear().unwrap();
    }

    // =========================================================================
    // FileCache
    // =========================================================================

    #[test]
    fn file_cache_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("cache"));
        assert_eq!(cache.get("abc_config").unwrap(), None);
        cache.set("abc_config", "{}".into()).unwrap();
        assert_eq!(cache.get("abc_config").unwrap().as_deref(), Some("{}"));
        assert!(tmp.path().join("cache/abc_config.json").exists());
    }

    #[test]
    fn file_cache_clear_missing_dir_is_ok() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("never-created"));
        cache.clear().unwrap();
    }

    #[test]
    fn file_cache_clear_keeps_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path());
        cache.set("a_variants", "[]".into()).unwrap();
        std::fs::write(tmp.path().join("README.txt"), "keep me").unwrap();

        cache.clear().unwrap();
        assert_eq!(cache.get("a_variants").unwrap(), None);
        assert!(tmp.path().join("README.txt").exists());
    }

    #[test]
    fn file_cache_rejects_path_like_keys() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path());
        assert!(matches!(
            cache.set("../escape", "x".into()),
            Err(CacheError::InvalidKey(_))
        ));
    }

    // =========================================================================
    // VariantCache
    // =========================================================================

    #[test]
    fn config_roundtrip() {
        let cache = VariantCache::new(MemoryCache::new());
        let config = RenderConfig {
            sizes: "90vw".into(),
            max_steps: 4,
            ..RenderConfig::default()
        };
        assert_eq!(cache.get_config("k"), None);
        cache.set_config("k", &config);
        assert_eq!(cache.get_config("k"), Some(config));
    }

    #[test]
    fn variants_roundtrip_preserves_order() {
        let cache = VariantCache::new(MemoryCache::new());
        let set = vec![descriptor(1080), descriptor(816), descriptor(552)];
        cache.set_variants("k", &set);
        assert_eq!(cache.get_variants("k"), Some(set));
    }

    #[test]
    fn config_and_variants_do_not_collide() {
        let cache = VariantCache::new(MemoryCache::new());
        cache.set_variants("k", &[descriptor(100)]);
        assert_eq!(cache.get_config("k"), None);
    }

    #[test]
    fn empty_variant_set_is_a_miss() {
        let cache = VariantCache::new(MemoryCache::new());
        cache.set_variants("k", &[]);
        assert_eq!(cache.get_variants("k"), None);
    }

    #[test]
    fn undecodable_entry_is_a_miss() {
        let backend = MemoryCache::new();
        backend.set(&variant_key("k"), "not json".into()).unwrap();
        let cache = VariantCache::new(backend);
        assert_eq!(cache.get_variants("k"), None);
    }

    #[test]
    fn broken_backend_reads_miss_and_writes_are_swallowed() {
        let cache = VariantCache::new(BrokenBackend);
        cache.set_variants("k", &[descriptor(100)]);
        assert_eq!(cache.get_variants("k"), None);
        assert!(cache.clear_all().is_err());
    }

    #[test]
    fn clear_all_drops_everything() {
        let cache = VariantCache::new(MemoryCache::new());
        cache.set_config("k", &RenderConfig::default());
        cache.set_variants("k", &[descriptor(100)]);
        let entry = CachedMarkup {
            markup: "<img>".into(),
            files: vec![descriptor(100)],
        };
        cache.set_markup("k", &entry);
        assert_eq!(cache.get_markup("k"), Some(entry));
        cache.clear_all().unwrap();
        assert_eq!(cache.get_config("k"), None);
        assert_eq!(cache.get_variants("k"), None);
        assert_eq!(cache.get_markup("k"), None);
        assert!(cache.backend().is_empty());
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display_with_hits() {
        let mut s = CacheStats::default();
        s.hits = 5;
        s.misses = 2;
        assert_eq!(format!("{}", s), "5 cached, 2 computed");
    }

    #[test]
    fn cache_stats_display_with_stale_and_passthrough() {
        let mut s = CacheStats::default();
        s.record(CacheOutcome::Hit);
        s.record(CacheOutcome::Invalidated);
        s.record(CacheOutcome::Passthrough);
        assert_eq!(format!("{}", s), "1 cached, 1 computed (1 stale), 1 passthrough");
        assert_eq!(s.total(), 3);
    }

    #[test]
    fn cache_stats_display_config_counts() {
        let mut s = CacheStats::default();
        s.config(false);
        s.record(CacheOutcome::Miss);
        s.config(true);
        s.record(CacheOutcome::Hit);
        s.config(true);
        s.record(CacheOutcome::Hit);
        assert_eq!(
            format!("{}", s),
            "2 cached, 1 computed; config: 2 cached, 1 resolved"
        );
    }

    #[test]
    fn cache_stats_display_no_hits() {
        let mut s = CacheStats::default();
        s.misses = 3;
        assert_eq!(format!("{}", s), "3 computed");
    }
}
