//! capture - periodic camera capture
//!
//! Every interval, grabs one still per configured camera, stores it as JPEG
//! under the storage root and appends a `Captured` row to the capture ledger.
//! Runs until Ctrl-C or until `--cycles` cycles have completed.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use traffic_counter::{
    camera_for, CaptureLoop, CounterConfig, FrameSource, FrameStore, Ledger,
    SqliteWorksheetStore, SystemClock,
};

#[derive(Parser, Debug)]
#[command(about = "Capture camera stills into the traffic ledger")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "TRAFFIC_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured ledger database.
    #[arg(long)]
    db_path: Option<String>,

    /// Stop after this many cycles.
    #[arg(long)]
    cycles: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = CounterConfig::load_from(args.config.as_deref())?;
    if let Some(db_path) = args.db_path {
        cfg.db_path = db_path;
    }
    if cfg.cameras.is_empty() {
        return Err(anyhow!(
            "no cameras configured; set `cameras` in the config file or TRAFFIC_CAMERAS"
        ));
    }

    let store = SqliteWorksheetStore::open(&cfg.db_path)?;
    let mut ledger = Ledger::open(store, cfg.locations.clone())?;
    let frames = FrameStore::new(&cfg.storage_root).with_quality(cfg.capture.jpeg_quality);
    frames.ensure_root()?;

    let mut cameras: Vec<Box<dyn FrameSource>> = cfg
        .cameras
        .iter()
        .map(|cam| camera_for(&cam.location, &cam.url))
        .collect::<traffic_counter::Result<_>>()?;
    let clock = SystemClock::new(cfg.capture.timezone);

    let capture_loop = CaptureLoop::new(cfg.capture.interval);
    let stop = capture_loop.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, std::sync::atomic::Ordering::SeqCst);
    })?;

    log::info!(
        "capturing {} camera(s) every {}s ({} time) into {} (ledger {})",
        cameras.len(),
        cfg.capture.interval.as_secs(),
        cfg.capture.timezone,
        frames.root().display(),
        cfg.db_path
    );
    let cycles = capture_loop.run(&mut cameras, &frames, &mut ledger, &clock, args.cycles)?;
    log::info!("capture stopped after {} cycle(s)", cycles);
    Ok(())
}
