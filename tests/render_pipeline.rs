//! End-to-end rendering against the filesystem store, the file cache and the
//! step resizer, on a generated PNG.

use responsive_images::cache::{CacheOutcome, FileCache};
use responsive_images::config::Settings;
use responsive_images::imaging::{AssetStore, FsAssetStore, SourceImage, StepResizer};
use responsive_images::args::parse_str;
use responsive_images::markup::{img_tag, render_shortcode};
use responsive_images::render::Renderer;
use tempfile::TempDir;

mod common;

use common::write_noise_png;

type FsRenderer = Renderer<FileCache, FsAssetStore, StepResizer>;

const PROFILES: &str = r#"
[default]
sizes = "100vw"
size_diff = 10000
max_steps = 4
retina_level = 1

[maxsteps_90vw]
sizes = "90vw"
size_diff = 1000
max_steps = 4
retina_level = 1
"#;

fn settings() -> Settings {
    Settings {
        min_viewport: 320,
        max_viewport: 1200,
        rendering_classes: toml::from_str(PROFILES).unwrap(),
        ..Settings::default()
    }
}

fn setup(tmp: &TempDir) -> (FsRenderer, SourceImage) {
    let original = tmp.path().join("beach.png");
    write_noise_png(&original, 1200, 60);

    let settings = settings();
    let engine = StepResizer::from_settings(&settings);
    let store = FsAssetStore::new(tmp.path().join("assets"), "/assets");
    let renderer = Renderer::new(settings, FileCache::new(tmp.path().join("cache")), store, engine);
    let source = renderer.store().import(&original).unwrap();
    (renderer, source)
}

#[test]
fn renders_caches_revalidates_and_flushes() {
    let tmp = TempDir::new().unwrap();
    let (renderer, source) = setup(&tmp);
    assert_eq!(source.width(), 1200);

    // First render plans and writes four variants.
    let first = renderer.render(&source, "cssclass=maxsteps_90vw;alt=Beach").unwrap();
    assert_eq!(first.outcome(), CacheOutcome::Miss);
    assert_eq!(first.variant_widths(), vec![1080, 816, 552, 288]);
    for variant in first.variants() {
        let path = renderer.store().path_for(
            &variant.filename,
            &variant.hash,
            variant.variant.as_deref(),
        );
        let (w, _) = image::image_dimensions(&path).unwrap();
        assert_eq!(w, variant.width);
    }

    // Second render is served from the cache.
    let second = renderer.render(&source, "cssclass=maxsteps_90vw;alt=Beach").unwrap();
    assert_eq!(second.outcome(), CacheOutcome::Hit);
    assert_eq!(second.variants(), first.variants());

    // Purging one variant file invalidates the whole cached set.
    let purged = &first.variants()[1];
    std::fs::remove_file(renderer.store().path_for(
        &purged.filename,
        &purged.hash,
        purged.variant.as_deref(),
    ))
    .unwrap();
    let third = renderer.render(&source, "cssclass=maxsteps_90vw").unwrap();
    assert_eq!(third.outcome(), CacheOutcome::Invalidated);
    assert!(
        renderer
            .store()
            .exists(&purged.filename, &purged.hash, purged.variant.as_deref())
            .unwrap()
    );

    // Flushing forgets everything.
    renderer.flush().unwrap();
    let fourth = renderer.render(&source, "cssclass=maxsteps_90vw").unwrap();
    assert_eq!(fourth.outcome(), CacheOutcome::Miss);
    assert!(!fourth.config_cached());
}

#[test]
fn markup_points_at_stored_variants() {
    let tmp = TempDir::new().unwrap();
    let (renderer, source) = setup(&tmp);
    let rendering = renderer.render(&source, "cssclass=maxsteps_90vw;alt=Beach").unwrap();
    let html = img_tag(&rendering, renderer.store()).into_string();

    let dir = &source.hash()[..10];
    assert!(html.starts_with(&format!(
        "<img src=\"/assets/{dir}/beach__ScaleWidth1080.png\""
    )));
    assert!(html.contains(&format!("/assets/{dir}/beach__ScaleWidth288.png 288w")));
    assert!(html.contains("sizes=\"90vw\""));
    assert!(html.contains("class=\"maxsteps_90vw\""));
    assert!(html.contains("alt=\"Beach\""));
}

#[test]
fn cache_survives_a_new_renderer() {
    let tmp = TempDir::new().unwrap();
    let (renderer, source) = setup(&tmp);
    renderer.render(&source, "").unwrap();
    drop(renderer);

    let (renderer, source) = setup(&tmp);
    let again = renderer.render(&source, "").unwrap();
    assert_eq!(again.outcome(), CacheOutcome::Hit);
    assert!(again.config_cached());
}

#[test]
fn unsupported_file_is_served_as_is() {
    let tmp = TempDir::new().unwrap();
    let (renderer, _) = setup(&tmp);
    let doc = tmp.path().join("notes.txt");
    std::fs::write(&doc, "plain text").unwrap();
    let source = renderer.store().import(&doc).unwrap();

    let rendering = renderer.render(&source, "cssclass=maxsteps_90vw").unwrap();
    assert_eq!(rendering.outcome(), CacheOutcome::Passthrough);
    assert_eq!(rendering.srcset(renderer.store()), None);
    assert_eq!(rendering.sizes(), "");
}

#[test]
fn shortcode_without_class_is_responsive_and_cached_on_disk() {
    let tmp = TempDir::new().unwrap();
    let (renderer, source) = setup(&tmp);
    let args = parse_str("width=600");

    let first = render_shortcode(&renderer, &source, "Beach", &args).unwrap().into_string();
    assert!(first.contains("srcset="));
    assert!(first.contains("sizes=\"100vw\""));
    assert!(first.contains("alt=\"Beach\""));

    let entries = std::fs::read_dir(tmp.path().join("cache"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with("_markup.json"))
        .count();
    assert_eq!(entries, 1);

    let second = render_shortcode(&renderer, &source, "Beach", &args).unwrap().into_string();
    assert_eq!(second, first);
}
