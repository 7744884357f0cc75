//! Live try-on preview with SDL2 and camera integration

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tokio::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tryon::capture::{CameraDevice, SyntheticCamera};
use tryon::catalog::{self, CatalogClient, CatalogItem};
use tryon::display::{PreviewWindow, UserAction};
use tryon::remote::HttpTryOnService;
use tryon::{CaptureSource, Config, LiveTryOn, SelectionContext};

#[derive(Debug, Parser)]
#[command(name = "tryon", about = "Live virtual try-on preview")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only offer catalog items of this brand
    #[arg(short, long)]
    brand: Option<String>,

    /// Use the built-in test pattern instead of a camera
    #[arg(long)]
    synthetic: bool,

    /// Start the camera as soon as the window opens
    #[arg(long)]
    autostart: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tryon=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let cli = Cli::parse();
    info!("Live try-on launching...");

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.synthetic {
        config.capture.source = CaptureSource::Synthetic;
    }
    config.pipeline.autostart |= cli.autostart;
    tryon::CONFIG.store(Arc::new(config.clone()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let catalog = runtime.block_on(load_catalog(&config, cli.brand.as_deref()));
    let service = HttpTryOnService::new(&config.remote)?;
    info!("Try-on endpoint: {}", service.endpoint());

    match config.capture.source {
        CaptureSource::Synthetic => {
            run_app(&runtime, SyntheticCamera::new(), service, &config, catalog)?
        }
        CaptureSource::V4l2 => run_camera(&runtime, service, &config, catalog)?,
    }

    info!("Live try-on shutting down");
    Ok(())
}

#[cfg(feature = "v4l2")]
fn run_camera(
    runtime: &Runtime,
    service: HttpTryOnService,
    config: &Config,
    catalog: Vec<CatalogItem>,
) -> Result<()> {
    // An empty path is auto-detected each time the camera starts
    let device = tryon::capture::V4l2Camera::new(config.capture.device.clone());
    run_app(runtime, device, service, config, catalog)
}

#[cfg(not(feature = "v4l2"))]
fn run_camera(
    runtime: &Runtime,
    service: HttpTryOnService,
    config: &Config,
    catalog: Vec<CatalogItem>,
) -> Result<()> {
    warn!("Built without V4L2 support, using the synthetic camera");
    run_app(runtime, SyntheticCamera::new(), service, config, catalog)
}

/// The window keeps working without a catalog; selection keys just do nothing.
async fn load_catalog(config: &Config, brand: Option<&str>) -> Vec<CatalogItem> {
    let items = match CatalogClient::new(&config.remote) {
        Ok(client) => client.fetch().await,
        Err(e) => Err(e),
    };
    let items = match items {
        Ok(items) => items,
        Err(e) => {
            warn!("Catalog unavailable: {}", e);
            return Vec::new();
        }
    };

    let items = match brand {
        Some(brand) => {
            let filtered = catalog::filter_by_brand(&items, brand);
            if filtered.is_empty() {
                warn!(
                    "No items for brand {:?}, known brands: {:?}",
                    brand,
                    catalog::brands(&items)
                );
            }
            filtered
        }
        None => items,
    };
    for (i, item) in items.iter().take(9).enumerate() {
        info!("[{}] {} ({:.2})", i + 1, item.name, item.price);
    }
    items
}

fn run_app<D: CameraDevice>(
    runtime: &Runtime,
    device: D,
    service: HttpTryOnService,
    config: &Config,
    catalog: Vec<CatalogItem>,
) -> Result<()> {
    info!("Camera source: {}", device.describe());

    let selection = Arc::new(SelectionContext::new());
    let live = LiveTryOn::new(device, service, config).with_selection(Arc::clone(&selection));
    let surface = Arc::clone(live.surface());
    let live = RefCell::new(live);

    let sdl_context = sdl2::init().map_err(|e| eyre!(e))?;
    let mut window = PreviewWindow::new(&sdl_context, config.display.width, config.display.height)?;

    if config.pipeline.autostart {
        // Failures are reported through the status line
        let _ = runtime.block_on(live.borrow_mut().start());
    }

    window.run(
        &sdl_context,
        &surface,
        |action| {
            let mut live = live.borrow_mut();
            match action {
                UserAction::ToggleCamera if live.is_active() => runtime.block_on(live.stop()),
                UserAction::ToggleCamera => {
                    let _ = runtime.block_on(live.start());
                }
                UserAction::RetryPlayback => {
                    let _ = runtime.block_on(live.retry_playback());
                }
                UserAction::Select(index) => match catalog.get(index) {
                    Some(item) => {
                        selection.select(item.to_selection());
                    }
                    None => warn!("No catalog item at position {}", index + 1),
                },
                UserAction::ClearSelection => selection.clear(),
                UserAction::Quit => return false,
            }
            true
        },
        || format!("Live Try-On | {}", live.borrow().status()),
    )?;

    runtime.block_on(live.borrow_mut().stop());
    Ok(())
}
