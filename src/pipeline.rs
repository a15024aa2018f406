//! Frame processing: inference, decode, suppress, count.

use crate::capture::FrameStore;
use crate::detect::{DetectionResult, DetectorBackend, Decoder, SuppressionScope, Suppressor};
use crate::error::{CounterError, Result};
use crate::frame::Frame;
use crate::labels::ClassNames;
use crate::ledger::Ledger;
use crate::storage::WorksheetStore;

/// Thresholds applied after inference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineSettings {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub scope: SuppressionScope,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: crate::detect::DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: crate::detect::DEFAULT_NMS_THRESHOLD,
            scope: SuppressionScope::Joint,
        }
    }
}

pub struct FramePipeline {
    backend: Box<dyn DetectorBackend>,
    decoder: Decoder,
    suppressor: Suppressor,
    labels: ClassNames,
}

impl FramePipeline {
    /// The decoder expects one score column per entry in `labels`.
    pub fn new(
        backend: Box<dyn DetectorBackend>,
        labels: ClassNames,
        settings: PipelineSettings,
    ) -> Self {
        let decoder = Decoder::new(labels.len()).with_threshold(settings.confidence_threshold);
        let suppressor = Suppressor::new(settings.confidence_threshold, settings.nms_threshold)
            .with_scope(settings.scope);
        Self {
            backend,
            decoder,
            suppressor,
            labels,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn labels(&self) -> &ClassNames {
        &self.labels
    }

    /// Run inference on `frame` and return the suppressed detections.
    pub fn detect_frame(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let layers = self.backend.infer(frame)?;
        let candidates = self
            .decoder
            .decode(&layers, frame.width(), frame.height())?;
        Ok(DetectionResult {
            detections: self.suppressor.suppress(&candidates),
        })
    }

    /// Number of surviving detections whose class name is `target_class`.
    pub fn process_frame(&mut self, frame: &Frame, target_class: &str) -> Result<u32> {
        let result = self.detect_frame(frame)?;
        let count = result
            .detections
            .iter()
            .filter(|c| self.labels.name(c.class_id) == Some(target_class))
            .count();
        count_value(count)
    }
}

fn count_value(count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| {
        CounterError::MalformedDetectionInput(format!(
            "{} detections do not fit a count column",
            count
        ))
    })
}

/// Outcome of one processing pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Entries that received a detection row.
    pub processed: usize,
    /// Entries whose frame could not be loaded or processed; left for the next run.
    pub failed: usize,
    /// Processed entries whose location has no count column.
    pub unmapped: usize,
}

/// Process every unprocessed ledger entry once.
///
/// A frame that fails to load, infer or decode is logged and left `Captured` so a
/// later run retries it. Ledger failures stop the pass.
pub fn run_processing_pass<S: WorksheetStore>(
    ledger: &mut Ledger<S>,
    pipeline: &mut FramePipeline,
    frames: &FrameStore,
    target_class: &str,
) -> Result<PassSummary> {
    let mut summary = PassSummary::default();
    for entry in ledger.next_unprocessed()? {
        let captured_at = entry
            .timestamp
            .or_else(|| crate::filename::parse_filename_timestamp(&entry.filename))
            .unwrap_or_default();
        let counted = frames
            .load(&entry.filename, &entry.location, captured_at)
            .and_then(|frame| pipeline.process_frame(&frame, target_class));
        let count = match counted {
            Ok(count) => count,
            Err(e) if e.is_frame_local() => {
                log::error!("failed to process {}: {}", entry.filename, e);
                summary.failed += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if ledger.record_count(&entry, &entry.location, count)? {
            summary.processed += 1;
            if !ledger.locations().contains(&entry.location) {
                summary.unmapped += 1;
            }
            log::info!(
                "processed {}: {} {} detected at {}",
                entry.filename,
                count,
                target_class,
                entry.location
            );
        }
    }
    Ok(summary)
}
