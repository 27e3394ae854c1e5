//! `<img>` markup for renderings and `[image]` shortcodes.
//!
//! All interpolation goes through Maud, so attribute values are escaped.

use crate::args::{ArgValue, RenderingArguments, USER_WIDTH_KEY};
use crate::cache::{CacheBackend, CachedMarkup, shortcode_key};
use crate::imaging::{AssetStore, ResizeEngine, SourceImage};
use crate::render::{RenderError, Renderer, Rendering};
use crate::revalidate::revalidate_in;
use maud::{Markup, PreEscaped, html};
use tracing::debug;

/// Responsive `<img>` for a rendering.
///
/// `srcset`, `sizes`, `class`, and `title` are omitted when empty. `width`
/// carries the profile's fallback width, which only exists without `sizes`.
pub fn img_tag(rendering: &Rendering, store: &dyn AssetStore) -> Markup {
    let args = rendering.arguments();
    let sizes = Some(rendering.sizes()).filter(|s| !s.is_empty());
    html! {
        img src=[rendering.src(store)]
            srcset=[rendering.srcset(store)]
            sizes=[sizes]
            class=[rendering.css_class()]
            width=[rendering.fallback_width()]
            alt=(args.text("alt").unwrap_or(""))
            title=[args.text("title")];
    }
}

/// Render an `[image]` shortcode.
///
/// `title` is the stored image's title, used as the default `alt`. A
/// `class` argument picks the rendering profile; without one the image
/// renders with `default`. Finished markup is cached per source and
/// argument set, and served again while every file it references exists.
pub fn render_shortcode<C, S, E>(
    renderer: &Renderer<C, S, E>,
    source: &SourceImage,
    title: &str,
    shortcode: &RenderingArguments,
) -> Result<Markup, RenderError>
where
    C: CacheBackend,
    S: AssetStore,
    E: ResizeEngine,
{
    let attrs = shortcode_attributes(title, shortcode);
    let key = shortcode_key(source.hash(), &attrs);

    if let Some(CachedMarkup { markup, files }) = renderer.cache().get_markup(&key) {
        if revalidate_in(files, renderer.store()).is_some() {
            debug!(file = %source.filename(), "shortcode markup from cache");
            return Ok(PreEscaped(markup));
        }
    }

    let rendering = renderer.render(source, attrs)?;
    let markup = img_tag(&rendering, renderer.store()).into_string();
    renderer.cache().set_markup(
        &key,
        &CachedMarkup {
            markup: markup.clone(),
            files: rendering.variants().to_vec(),
        },
    );
    Ok(PreEscaped(markup))
}

/// Rendering arguments for a shortcode.
///
/// `alt` defaults to the image title and `userwidth` to the shortcode's
/// `width`; explicit shortcode arguments override both. `id` is dropped, as
/// is every empty value.
pub fn shortcode_attributes(title: &str, shortcode: &RenderingArguments) -> RenderingArguments {
    let mut attrs = RenderingArguments::new().with("alt", title);
    if let Some(width) = shortcode.text("width") {
        attrs.insert(USER_WIDTH_KEY, ArgValue::Text(width.to_string()));
    }
    for (key, value) in shortcode.iter() {
        attrs.insert(key.clone(), value.clone());
    }
    attrs.remove("id");

    attrs
        .iter()
        .filter(|(_, value)| value.as_text() != Some(""))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
