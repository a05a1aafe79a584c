use std::time::{Duration, Instant};

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imgcache::infrastructure::{
    AppConfig, CliArgs, ImageLoader, ListingClient, StorageManager, UiContext,
};
use imgcache::presentation::Grid;

/// How often the UI loop applies finished loads.
const FRAME: Duration = Duration::from_millis(16);

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    if args.save_config {
        let path = storage.save_config(&config, args.config.as_deref())?;
        println!("Saved configuration to {}", path.display());
    }
    Ok(config)
}

/// Pumps deliveries until the page shows every image, nothing is pending, or
/// the timeout passes.
fn settle(grid: &Grid, loader: &ImageLoader, ui: &mut UiContext, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        ui.dispatch_pending();
        if grid.is_settled() {
            return;
        }
        if loader.pending_count() == 0 {
            // Last results may still be in the channel.
            std::thread::sleep(FRAME);
            ui.dispatch_pending();
            return;
        }
        if Instant::now() >= deadline {
            warn!(pending = loader.pending_count(), "Page did not settle in time");
            return;
        }
        std::thread::sleep(FRAME);
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = imgcache::VERSION, "Starting {}", imgcache::NAME);

    let (loader, mut ui) = ImageLoader::with_defaults(config.loader.clone())?;

    if args.clear_cache {
        loader.block_on(loader.clear_all())??;
    }

    let listing = ListingClient::new(config.loader.timeout())?;
    let urls = loader.block_on(listing.fetch_image_urls(&args.listing_url))?;
    if urls.is_empty() {
        println!("No image URLs found at {}", args.listing_url);
        return Ok(());
    }
    println!("Found {} images", urls.len());

    let mut grid = Grid::new(urls, &config.browse);
    let pages = args.pages.clamp(1, grid.page_count());
    let timeout = Duration::from_secs(args.page_timeout);

    for page in 0..pages {
        grid.scroll_to(page);
        let started = grid.on_idle(&loader);
        info!(page, started, "Requested page images");

        let begin = Instant::now();
        settle(&grid, &loader, &mut ui, timeout);

        println!(
            "\nPage {}/{} ({} of {} loaded in {:.2?})",
            page + 1,
            grid.page_count(),
            grid.loaded_count(),
            grid.cells().iter().filter(|c| c.url().is_some()).count(),
            begin.elapsed()
        );
        println!("{}", grid.render());
    }

    println!();
    println!("{}", loader.memory_cache().stats());
    println!("{}", loader.block_on(loader.disk_cache().stats()));

    Ok(())
}
