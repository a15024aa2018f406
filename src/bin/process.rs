//! process - count target objects in captured frames
//!
//! Runs one processing pass over the capture ledger: every `Captured` entry is
//! loaded from the storage root, run through the detector, and its count recorded
//! in the detection sheet. Entries whose frame fails are left for the next run.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use traffic_counter::config::DetectionSettings;
use traffic_counter::{
    run_processing_pass, ClassNames, CounterConfig, DetectorBackend, FramePipeline, FrameStore,
    Ledger, SqliteWorksheetStore,
};

#[derive(Parser, Debug)]
#[command(about = "Count detections for captured frames in the traffic ledger")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "TRAFFIC_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured ledger database.
    #[arg(long)]
    db_path: Option<String>,

    /// Overrides the configured ONNX model.
    #[arg(long)]
    model: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = CounterConfig::load_from(args.config.as_deref())?;
    if let Some(db_path) = args.db_path {
        cfg.db_path = db_path;
    }
    if let Some(model) = args.model {
        cfg.detection.model_path = Some(model);
    }

    let labels = match &cfg.detection.class_names_path {
        Some(path) => ClassNames::from_file(path)?,
        None => ClassNames::coco(),
    };
    if labels.id_of(&cfg.detection.target_class).is_none() {
        log::warn!(
            "target class '{}' is not in the class list; counts will be zero",
            cfg.detection.target_class
        );
    }

    let backend = build_backend(&cfg.detection)?;
    log::info!("using {} detector backend", backend.name());
    let mut pipeline = FramePipeline::new(backend, labels, cfg.detection.pipeline_settings());

    let store = SqliteWorksheetStore::open(&cfg.db_path)?;
    let mut ledger = Ledger::open(store, cfg.locations.clone())?;
    let frames = FrameStore::new(&cfg.storage_root);

    let summary = run_processing_pass(
        &mut ledger,
        &mut pipeline,
        &frames,
        &cfg.detection.target_class,
    )?;
    log::info!(
        "processing pass complete: {} processed, {} failed, {} unmapped",
        summary.processed,
        summary.failed,
        summary.unmapped
    );
    Ok(())
}

#[cfg(feature = "backend-tract")]
fn build_backend(detection: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    let model_path = detection
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("no model configured; set TRAFFIC_MODEL_PATH or --model"))?;
    let mut backend = traffic_counter::TractBackend::new(
        model_path,
        detection.input_width,
        detection.input_height,
    )?;
    backend.warm_up()?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_backend(_detection: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "no detector backend available; rebuild with --features backend-tract"
    ))
}
