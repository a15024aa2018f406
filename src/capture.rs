//! Camera capture.
//!
//! A capture cycle visits every configured camera once, in configured order:
//! grab a still, write it to the frame store as JPEG, then append a `Captured`
//! ledger entry. A camera that fails is logged and skipped; the cycle always
//! moves on to the next camera. Ledger failures abort the cycle.
//!
//! Camera reads are blocking and use the HTTP client's default timeouts, so a
//! stalled camera stalls the whole cycle.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use url::Url;

use crate::error::{CounterError, Result};
use crate::filename::capture_filename;
use crate::frame::Frame;
use crate::ledger::{Ledger, LedgerEntry};
use crate::storage::WorksheetStore;

/// JPEG quality for stored frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

const MAX_SNAPSHOT_BYTES: u64 = 20 * 1024 * 1024;
const STUB_FRAME_WIDTH: u32 = 64;
const STUB_FRAME_HEIGHT: u32 = 48;

/// Wall-clock source for capture timestamps.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Default zone for capture timestamps and filenames.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// System time as wall-clock time in an IANA time zone, daylight saving included.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    zone: Tz,
}

impl SystemClock {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    /// Clock for a zone name such as `America/New_York`.
    pub fn from_zone_name(name: &str) -> Result<Self> {
        parse_timezone(name).map(Self::new)
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Wall-clock time in this zone at `instant`.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.zone).naive_local()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(chrono_tz::America::New_York)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        self.local_time(Utc::now())
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| CounterError::Config(format!("unknown time zone '{}': {}", name, e)))
}

/// A camera that can be asked for one still frame.
pub trait FrameSource {
    fn location(&self) -> &str;

    /// Grab one frame, stamping it with `captured_at`.
    fn grab(&mut self, captured_at: NaiveDateTime) -> Result<Frame>;
}

/// Camera that serves a still image over HTTP(S).
pub struct HttpSnapshotCamera {
    location: String,
    url: String,
}

impl HttpSnapshotCamera {
    pub fn new(location: &str, url: &str) -> Self {
        Self {
            location: location.to_string(),
            url: url.to_string(),
        }
    }

    fn failure(&self, reason: impl Into<String>) -> CounterError {
        CounterError::CaptureFailure {
            location: self.location.clone(),
            reason: reason.into(),
        }
    }

    fn fetch(&self) -> Result<Vec<u8>> {
        let response = ureq::get(&self.url)
            .call()
            .map_err(|e| self.failure(format!("fetch {}: {}", self.url, e)))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_SNAPSHOT_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| self.failure(format!("read snapshot: {}", e)))?;
        if bytes.is_empty() {
            return Err(self.failure("empty snapshot"));
        }
        Ok(bytes)
    }
}

impl FrameSource for HttpSnapshotCamera {
    fn location(&self) -> &str {
        &self.location
    }

    fn grab(&mut self, captured_at: NaiveDateTime) -> Result<Frame> {
        let bytes = self.fetch()?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| self.failure(format!("decode snapshot: {}", e)))?;
        Frame::from_image(image, captured_at, &self.location)
    }
}

/// Scripted camera for tests and `stub://` URLs.
///
/// Each grab pops the next scripted outcome (`true` = frame, `false` = failure).
/// With an empty script every grab produces a synthetic gray frame.
pub struct StubCamera {
    location: String,
    width: u32,
    height: u32,
    script: VecDeque<bool>,
    grabs: u64,
}

impl StubCamera {
    pub fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            width: STUB_FRAME_WIDTH,
            height: STUB_FRAME_HEIGHT,
            script: VecDeque::new(),
            grabs: 0,
        }
    }

    /// Camera whose first `attempts` grabs fail.
    pub fn failing(location: &str, attempts: usize) -> Self {
        let mut cam = Self::new(location);
        cam.script.extend(std::iter::repeat(false).take(attempts));
        cam
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.script.extend(script);
        self
    }

    pub fn grabs(&self) -> u64 {
        self.grabs
    }
}

impl FrameSource for StubCamera {
    fn location(&self) -> &str {
        &self.location
    }

    fn grab(&mut self, captured_at: NaiveDateTime) -> Result<Frame> {
        self.grabs += 1;
        if !self.script.pop_front().unwrap_or(true) {
            return Err(CounterError::CaptureFailure {
                location: self.location.clone(),
                reason: "stub camera returned no frame".to_string(),
            });
        }
        let shade = (self.grabs % 200) as u8 + 28;
        let pixels = vec![shade; (self.width * self.height * 3) as usize];
        Frame::new(pixels, self.width, self.height, captured_at, &self.location)
    }
}

/// Build a camera for a configured URL. `http`/`https` fetch snapshots;
/// `stub` produces synthetic frames.
pub fn camera_for(location: &str, url: &str) -> Result<Box<dyn FrameSource>> {
    let parsed = Url::parse(url)
        .map_err(|e| CounterError::Config(format!("camera url '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(Box::new(HttpSnapshotCamera::new(location, url))),
        "stub" => Ok(Box::new(StubCamera::new(location))),
        other => Err(CounterError::Config(format!(
            "unsupported camera scheme '{}'; expected http(s) or stub",
            other
        ))),
    }
}

/// JPEG frame files under a root folder.
#[derive(Clone, Debug)]
pub struct FrameStore {
    root: PathBuf,
    quality: u8,
}

impl FrameStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Create the root folder when it does not exist yet.
    pub fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            log::info!("created folder: {}", self.root.display());
        }
        Ok(())
    }

    /// Encode `frame` as JPEG and return its filename relative to the root.
    pub fn save(&self, frame: &Frame) -> Result<String> {
        self.ensure_root()?;
        let filename = capture_filename(frame.location(), frame.captured_at());
        let image = frame.to_rgb_image().ok_or_else(|| CounterError::CaptureFailure {
            location: frame.location().to_string(),
            reason: "frame buffer does not form an RGB image".to_string(),
        })?;
        let file = File::create(self.path_for(&filename))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.quality).encode_image(&image)?;
        writer.flush()?;
        Ok(filename)
    }

    /// Load a stored frame for processing.
    pub fn load(
        &self,
        filename: &str,
        location: &str,
        captured_at: NaiveDateTime,
    ) -> Result<Frame> {
        let image: DynamicImage = image::open(self.path_for(filename))?;
        Frame::from_image(image, captured_at, location)
    }
}

#[derive(Debug)]
pub enum CaptureOutcome {
    Saved(LedgerEntry),
    Failed(String),
}

/// What happened to each camera in one cycle, in camera order.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub attempts: Vec<(String, CaptureOutcome)>,
}

impl CycleReport {
    pub fn saved(&self) -> usize {
        self.attempts
            .iter()
            .filter(|(_, o)| matches!(o, CaptureOutcome::Saved(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.attempts.len() - self.saved()
    }
}

/// Visit every camera once.
pub fn run_capture_cycle<S: WorksheetStore>(
    cameras: &mut [Box<dyn FrameSource>],
    store: &FrameStore,
    ledger: &mut Ledger<S>,
    clock: &dyn Clock,
) -> Result<CycleReport> {
    let mut report = CycleReport::default();
    for camera in cameras.iter_mut() {
        let location = camera.location().to_string();
        let saved = camera
            .grab(clock.now())
            .and_then(|frame| store.save(&frame).map(|filename| (frame, filename)));
        match saved {
            Ok((frame, filename)) => {
                let entry = ledger.record_capture(frame.captured_at(), &location, &filename)?;
                log::info!("saved image from {} to {}", location, filename);
                report.attempts.push((location, CaptureOutcome::Saved(entry)));
            }
            Err(e) => {
                log::warn!("failed to capture image from {}: {}", location, e);
                report
                    .attempts
                    .push((location, CaptureOutcome::Failed(e.to_string())));
            }
        }
    }
    Ok(report)
}

/// Repeats capture cycles with a fixed pause until stopped.
pub struct CaptureLoop {
    interval: Duration,
    stop: Arc<AtomicBool>,
}

impl CaptureLoop {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends the loop after the current cycle or pause.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run until the stop flag is set or `max_cycles` cycles have completed.
    /// Returns the number of completed cycles.
    pub fn run<S: WorksheetStore>(
        &self,
        cameras: &mut [Box<dyn FrameSource>],
        store: &FrameStore,
        ledger: &mut Ledger<S>,
        clock: &dyn Clock,
        max_cycles: Option<u64>,
    ) -> Result<u64> {
        let mut cycles = 0u64;
        while !self.stop.load(Ordering::SeqCst) {
            let report = run_capture_cycle(cameras, store, ledger, clock)?;
            cycles += 1;
            log::debug!(
                "cycle {}: {} saved, {} failed",
                cycles,
                report.saved(),
                report.failed()
            );
            if max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }
            self.pause();
        }
        Ok(cycles)
    }

    fn pause(&self) {
        let started = Instant::now();
        while started.elapsed() < self.interval && !self.stop.load(Ordering::SeqCst) {
            let remaining = self.interval.saturating_sub(started.elapsed());
            std::thread::sleep(remaining.min(Duration::from_millis(100)));
        }
    }
}
