use clap::{Parser, Subcommand};
use responsive_images::cache::{CacheStats, FileCache, VariantCache};
use responsive_images::imaging::{FsAssetStore, StepResizer};
use responsive_images::render::Renderer;
use responsive_images::{config, markup, output};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Called once from the clap attribute.
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "responsive-images")]
#[command(about = "Responsive image sets from named rendering profiles")]
#[command(long_about = "\
Responsive image sets from named rendering profiles

An image is rendered with a class expression (e.g. \"small wide\"). The first
class that names a profile in config.toml decides the sizes attribute and how
many scaled variants to produce; the rest inherit from the 'default' profile.
Resolved profiles and variant lists are cached, so rendering the same image
with the same class again reuses the existing files.

Layout:

  config.toml                      # [rendering_classes.<name>] profiles
  assets/
  └── 3f2a9c81d0/                  # first 10 chars of the content hash
      ├── beach.jpg                # imported original
      └── beach__ScaleWidth800.jpg # variant
  .responsive-images-cache/        # one JSON file per cache entry

Rendering arguments are ';'-separated: \"cssclass=small;userwidth=300;alt=Beach\"

Run 'responsive-images gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    /// Asset store directory
    #[arg(long, default_value = "assets", global = true)]
    assets: PathBuf,

    /// Render cache directory
    #[arg(long, default_value = ".responsive-images-cache", global = true)]
    cache_dir: PathBuf,

    /// URL prefix of the asset store
    #[arg(long, default_value = "/assets", global = true)]
    base_url: String,

    /// More log output (-v info, -vv debug); RUST_LOG applies otherwise
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import images and render their responsive sets
    Render {
        /// Image files to render
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Rendering arguments, e.g. "cssclass=small;alt=Beach"
        #[arg(long, default_value = "")]
        args: String,
    },
    /// Drop every cached profile, variant list and shortcode markup
    Flush,
    /// Validate config.toml and show how every rendering class resolves
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Render { images, args } => {
            let settings = config::load_config(&cli.config)?;
            init_thread_pool(&settings.processing);
            let engine = StepResizer::from_settings(&settings);
            let store = FsAssetStore::new(&cli.assets, cli.base_url.clone());
            let renderer = Renderer::new(settings, FileCache::new(&cli.cache_dir), store, engine);

            let mut stats = CacheStats::default();
            for image in &images {
                let source = renderer.store().import(image)?;
                let rendering = renderer.render(&source, args.as_str())?;
                stats.config(rendering.config_cached());
                stats.record(rendering.outcome());
                output::print_rendering(source.filename(), &rendering, renderer.store());
                println!(
                    "    {}",
                    markup::img_tag(&rendering, renderer.store()).into_string()
                );
            }
            println!("Cache: {}", stats);
        }
        Command::Flush => {
            VariantCache::new(FileCache::new(&cli.cache_dir)).clear_all()?;
            println!("==> Flushed {}", cli.cache_dir.display());
        }
        Command::Check => {
            let settings = config::load_config(&cli.config)?;
            output::print_check(&settings);
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr. `-v` flags win over `RUST_LOG`; the default is `warn`.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Never more threads than available cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
