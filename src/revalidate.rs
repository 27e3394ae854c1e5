//! Revalidation of cached variant sets.
//!
//! A cached set is only as good as the files it names. Files can be purged
//! from the asset store behind the cache's back, so every hit is checked
//! before use. The check is all-or-nothing: one missing file, or one failed
//! check, invalidates the whole set.

use crate::imaging::{AssetStore, StoreError, VariantDescriptor};
use tracing::debug;

/// Confirm that every descriptor in `set` still exists.
///
/// Returns the set unchanged when all checks pass, `None` otherwise. An
/// empty set is never valid. Checks run in order and stop at the first
/// failure.
pub fn revalidate<F>(set: Vec<VariantDescriptor>, mut exists: F) -> Option<Vec<VariantDescriptor>>
where
    F: FnMut(&str, &str, Option<&str>) -> Result<bool, StoreError>,
{
    if set.is_empty() {
        return None;
    }
    for descriptor in &set {
        match exists(&descriptor.filename, &descriptor.hash, descriptor.variant.as_deref()) {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    file = %descriptor.filename,
                    variant = ?descriptor.variant,
                    "cached variant missing"
                );
                return None;
            }
            Err(e) => {
                debug!(file = %descriptor.filename, error = %e, "existence check failed");
                return None;
            }
        }
    }
    Some(set)
}

/// [`revalidate`] against an [`AssetStore`].
pub fn revalidate_in(set: Vec<VariantDescriptor>, store: &impl AssetStore) -> Option<Vec<VariantDescriptor>> {
    revalidate(set, |filename, hash, variant| store.exists(filename, hash, variant))
}
