//! RGB-D capture demo on the simulated camera

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use flume::bounded;
use realsense_rgbd::backend::SimulatedBackend;
use realsense_rgbd::pipeline::PipelineState;
use realsense_rgbd::{DriverConfig, RgbdDriver, RgbdFrame};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "realsense-rgbd")]
#[command(about = "Stream color and depth images from an RGB-D camera")]
#[command(version)]
struct Cli {
    /// TOML configuration file (RGBD_* environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frame pairs to acquire, 0 runs until interrupted
    #[arg(short, long, default_value = "90")]
    frames: u64,

    /// Directory to write the last color and depth image to as PNG
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("realsense_rgbd=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let cli = Cli::parse();

    info!("RGB-D driver launching...");

    // Load configuration
    let config = DriverConfig::load(cli.config.as_deref())?;
    realsense_rgbd::CONFIG.store(Arc::new(config.clone()));

    // Open the camera, this blocks until one is plugged in
    let driver = tokio::task::spawn_blocking(move || RgbdDriver::open(SimulatedBackend::new().realtime(true), &config))
        .await??;
    let driver = Arc::new(driver);
    info!(
        "Streaming color {} and depth {}",
        driver.rgb_resolution()?,
        driver.depth_resolution()?
    );

    // Set up tx/rx
    let (tx, rx) = bounded::<RgbdFrame>(4);

    // Spawn acquisition task
    let acquisition = {
        let driver = driver.clone();
        let limit = cli.frames;
        tokio::task::spawn_blocking(move || {
            let mut acquired = 0u64;
            while limit == 0 || acquired < limit {
                match driver.images() {
                    Ok(frame) => {
                        acquired += 1;
                        if tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Acquisition error: {}", e);
                        // Per-frame failures are retried, a stopped pipeline is not
                        if driver.pipeline_state() != PipelineState::Running {
                            break;
                        }
                    }
                }
            }
        })
    };

    let mut last = None;
    loop {
        tokio::select! {
            frame = rx.recv_async() => match frame {
                Ok(frame) => {
                    let center_m = frame.depth.pixel(frame.depth.width / 2, frame.depth.height / 2).unwrap_or(0.0);
                    if realsense_rgbd::CONFIG.load().verbose {
                        info!(seq = frame.color_stamp.sequence, center_m, "Frame pair received");
                    } else {
                        debug!(seq = frame.color_stamp.sequence, center_m, "Frame pair received");
                    }
                    last = Some(frame);
                }
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                break;
            }
        }
    }
    drop(rx);
    acquisition.await?;

    // Write the last frame pair out
    if let (Some(dir), Some(frame)) = (cli.snapshot, last) {
        std::fs::create_dir_all(&dir)?;
        let color = frame
            .color
            .to_rgb_image()
            .ok_or_else(|| eyre!("Color format {:?} can't be exported", frame.color.pixel_code))?;
        color.save(dir.join("color.png"))?;
        let depth = frame
            .depth
            .to_luma16_mm()
            .ok_or_else(|| eyre!("Depth image buffer is inconsistent"))?;
        depth.save(dir.join("depth_mm.png"))?;
        info!("Snapshot written to {}", dir.display());
    }

    let stats = driver.stats();
    info!(
        color = stats.color_frames,
        depth = stats.depth_frames,
        failures = stats.failures,
        "RGB-D driver shutting down"
    );
    driver.close()?;
    Ok(())
}
