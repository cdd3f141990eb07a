//! drm-still - show one raw image on a DRM/KMS output
//!
//! Brings up the first connected display, copies the image into a dumb buffer,
//! commits it and keeps it on screen until a key is pressed.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use drm_still::{DisplaySession, Error, OutputConfig, PixelFormat};
use tracing::{error, info};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code for failures that are not a pipeline stage (e.g. stdin errors)
const EXIT_OTHER: u8 = 64;

#[derive(Parser, Debug)]
#[command(name = "drm-still")]
#[command(about = "Show a raw image on a DRM/KMS display until a key is pressed", long_about = None)]
struct Args {
    /// Raw, headerless image to display
    image: PathBuf,

    /// DRM card node (default /dev/dri/card0)
    #[arg(long)]
    device: Option<PathBuf>,

    /// Pixel format of the image: xrgb32, xbgr32, argb32, abgr32, rgb565, yuyv or a fourcc
    #[arg(short, long)]
    format: Option<PixelFormat>,

    /// Framebuffer color depth (default 24)
    #[arg(long)]
    depth: Option<u32>,

    /// TOML file with output settings; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Flash white/black this many times before showing the image
    #[arg(long, default_value_t = 0)]
    flash: u32,

    /// Pause between flash frames in milliseconds
    #[arg(long, default_value_t = 1000)]
    flash_interval_ms: u64,

    /// Also log to a daily rotated file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = init_logging(&args);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let code = e.downcast_ref::<Error>().map_or(EXIT_OTHER, Error::exit_code);
            ExitCode::from(code)
        }
    }
}

/// Quiet by default, verbose with --debug. RUST_LOG wins over both.
fn init_logging(args: &Args) -> Option<WorkerGuard> {
    let default_filter = if args.debug {
        "debug,drm_still=debug"
    } else {
        "warn,drm_still=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).ok();
            let file_appender = rolling::daily(dir, "drm-still.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (
                Some(fmt::layer().with_writer(non_blocking).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn load_config(args: &Args) -> Result<OutputConfig> {
    let mut config = match &args.config {
        Some(path) => OutputConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => OutputConfig::default(),
    };

    if let Some(device) = &args.device {
        config.device_path = device.clone();
    }
    if let Some(format) = args.format {
        config.pixel_format = format;
    }
    if let Some(depth) = args.depth {
        config.color_depth = depth;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    info!(
        device = %config.device_path.display(),
        format = %config.pixel_format,
        depth = config.color_depth,
        "drm-still starting"
    );

    let mut session = DisplaySession::open(&config)?;
    let output = *session.output();
    info!(
        connector = output.connector_id,
        crtc = output.crtc_id,
        "Output {} {}x{}@{}Hz, buffer pitch {} size {}",
        output.mode.name(),
        output.mode.width(),
        output.mode.height(),
        output.mode.refresh(),
        session.buffer().pitch(),
        session.buffer().size()
    );

    if args.flash > 0 {
        session.flash(args.flash, Duration::from_millis(args.flash_interval_ms))?;
    }

    // White background for images shorter than the buffer
    session.clear(0xFF);
    let copied = session.draw_image(&args.image)?;
    info!("Showing {} ({} bytes), press Enter to exit", args.image.display(), copied);

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("waiting for keypress")?;

    session.close();
    info!("drm-still done");
    Ok(())
}
