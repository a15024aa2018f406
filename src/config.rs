use anyhow::{anyhow, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{SuppressionScope, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_NMS_THRESHOLD};
use crate::pipeline::PipelineSettings;

const DEFAULT_DB_PATH: &str = "traffic.db";
const DEFAULT_STORAGE_ROOT: &str = "annotated_frames";
const DEFAULT_INTERVAL_SECS: u64 = 10;
const DEFAULT_JPEG_QUALITY: u8 = crate::capture::DEFAULT_JPEG_QUALITY;
const DEFAULT_TARGET_CLASS: &str = "car";
const DEFAULT_MODEL_INPUT: u32 = 416;

#[derive(Debug, Deserialize, Default)]
struct CounterConfigFile {
    db_path: Option<String>,
    storage_root: Option<PathBuf>,
    cameras: Option<Vec<CameraConfigFile>>,
    locations: Option<Vec<String>>,
    capture: Option<CaptureConfigFile>,
    detection: Option<DetectionConfigFile>,
}

#[derive(Debug, Deserialize)]
struct CameraConfigFile {
    location: String,
    url: String,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    interval_secs: Option<u64>,
    jpeg_quality: Option<u8>,
    timezone: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    nms_threshold: Option<f32>,
    scope: Option<SuppressionScope>,
    target_class: Option<String>,
    model_path: Option<PathBuf>,
    class_names_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub db_path: String,
    pub storage_root: PathBuf,
    pub cameras: Vec<CameraSettings>,
    /// Count columns of the detection sheet, in order.
    pub locations: Vec<String>,
    pub capture: CaptureSettings,
    pub detection: DetectionSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    pub location: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub interval: Duration,
    pub jpeg_quality: u8,
    /// IANA zone for capture timestamps and filenames.
    pub timezone: Tz,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub scope: SuppressionScope,
    pub target_class: String,
    pub model_path: Option<PathBuf>,
    /// Names file, one class per line. COCO names are used when unset.
    pub class_names_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
}

impl DetectionSettings {
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            confidence_threshold: self.confidence_threshold,
            nms_threshold: self.nms_threshold,
            scope: self.scope,
        }
    }
}

impl CounterConfig {
    /// Load from the file named by `TRAFFIC_CONFIG` (if set), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRAFFIC_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or none), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Result<Self> {
        let cameras: Vec<CameraSettings> = file
            .cameras
            .unwrap_or_default()
            .into_iter()
            .map(|cam| CameraSettings {
                location: cam.location,
                url: cam.url,
            })
            .collect();
        let locations = file
            .locations
            .unwrap_or_else(|| cameras.iter().map(|c| c.location.clone()).collect());
        let capture_file = file.capture.unwrap_or_default();
        let capture = CaptureSettings {
            interval: Duration::from_secs(
                capture_file.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS),
            ),
            jpeg_quality: capture_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            timezone: parse_timezone(
                capture_file
                    .timezone
                    .as_deref()
                    .unwrap_or(crate::capture::DEFAULT_TIMEZONE),
            )?,
        };
        let detection_file = file.detection.unwrap_or_default();
        let detection = DetectionSettings {
            confidence_threshold: detection_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            nms_threshold: detection_file
                .nms_threshold
                .unwrap_or(DEFAULT_NMS_THRESHOLD),
            scope: detection_file.scope.unwrap_or_default(),
            target_class: detection_file
                .target_class
                .unwrap_or_else(|| DEFAULT_TARGET_CLASS.to_string()),
            model_path: detection_file.model_path,
            class_names_path: detection_file.class_names_path,
            input_width: detection_file.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: detection_file.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
        };
        Ok(Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            storage_root: file
                .storage_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
            cameras,
            locations,
            capture,
            detection,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("TRAFFIC_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(root) = std::env::var("TRAFFIC_STORAGE_ROOT") {
            if !root.trim().is_empty() {
                self.storage_root = PathBuf::from(root);
            }
        }
        if let Ok(cameras) = std::env::var("TRAFFIC_CAMERAS") {
            let parsed = parse_cameras(&cameras)?;
            if !parsed.is_empty() {
                self.locations = parsed.iter().map(|c| c.location.clone()).collect();
                self.cameras = parsed;
            }
        }
        if let Ok(locations) = std::env::var("TRAFFIC_LOCATIONS") {
            let parsed = split_csv(&locations);
            if !parsed.is_empty() {
                self.locations = parsed;
            }
        }
        if let Ok(value) = std::env::var("TRAFFIC_CONFIDENCE") {
            self.detection.confidence_threshold = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("TRAFFIC_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Ok(value) = std::env::var("TRAFFIC_NMS") {
            self.detection.nms_threshold = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("TRAFFIC_NMS must be a number in [0, 1]"))?;
        }
        if let Ok(value) = std::env::var("TRAFFIC_NMS_SCOPE") {
            self.detection.scope = value.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Ok(value) = std::env::var("TRAFFIC_INTERVAL_SECS") {
            let seconds: u64 = value.trim().parse().map_err(|_| {
                anyhow!("TRAFFIC_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.capture.interval = Duration::from_secs(seconds);
        }
        if let Ok(value) = std::env::var("TRAFFIC_TIMEZONE") {
            if !value.trim().is_empty() {
                self.capture.timezone = parse_timezone(&value)?;
            }
        }
        if let Ok(value) = std::env::var("TRAFFIC_TARGET_CLASS") {
            if !value.trim().is_empty() {
                self.detection.target_class = value.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("TRAFFIC_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detection.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("TRAFFIC_CLASS_NAMES") {
            if !path.trim().is_empty() {
                self.detection.class_names_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        check_unit_interval("confidence_threshold", self.detection.confidence_threshold)?;
        check_unit_interval("nms_threshold", self.detection.nms_threshold)?;
        if self.capture.interval.is_zero() {
            return Err(anyhow!("capture interval must be greater than zero"));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if self.detection.target_class.trim().is_empty() {
            return Err(anyhow!("target_class must not be empty"));
        }
        if self.detection.input_width == 0 || self.detection.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        check_unique("location", &self.locations)?;
        let camera_locations: Vec<String> =
            self.cameras.iter().map(|c| c.location.clone()).collect();
        check_unique("camera location", &camera_locations)?;
        for camera in &self.cameras {
            let url = url::Url::parse(&camera.url)
                .map_err(|e| anyhow!("camera '{}' url invalid: {}", camera.location, e))?;
            if !matches!(url.scheme(), "http" | "https" | "stub") {
                return Err(anyhow!(
                    "camera '{}' uses unsupported scheme '{}'",
                    camera.location,
                    url.scheme()
                ));
            }
        }
        Ok(())
    }
}

fn parse_timezone(name: &str) -> Result<Tz> {
    Ok(crate::capture::parse_timezone(name)?)
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}

fn check_unique(what: &str, names: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(anyhow!("{} names must not be empty", what));
        }
        if !seen.insert(name.as_str()) {
            return Err(anyhow!("duplicate {} '{}'", what, name));
        }
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// Parse `Location=url` pairs separated by commas.
fn parse_cameras(value: &str) -> Result<Vec<CameraSettings>> {
    split_csv(value)
        .into_iter()
        .map(|entry| {
            let (location, url) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("TRAFFIC_CAMERAS entry '{}' must be Location=url", entry))?;
            Ok(CameraSettings {
                location: location.trim().to_string(),
                url: url.trim().to_string(),
            })
        })
        .collect()
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
