use crate::error::{CounterError, Result};
use crate::geometry::to_box;

use super::result::{Candidate, RawDetection, RawTensor, ROW_PREFIX_LEN};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// Turns raw network output rows into confidence-filtered candidates.
#[derive(Clone, Debug)]
pub struct Decoder {
    class_count: usize,
    confidence_threshold: f32,
}

impl Decoder {
    pub fn new(class_count: usize) -> Self {
        Self {
            class_count,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Expected row width: box, objectness, then one score per class.
    pub fn row_len(&self) -> usize {
        ROW_PREFIX_LEN + self.class_count
    }

    /// Decode every layer in order. Rows whose best score is below the threshold
    /// are dropped; a score equal to the threshold is kept.
    ///
    /// All layers are validated before any candidate is produced, so a malformed
    /// layer never yields a partial result.
    pub fn decode(
        &self,
        layers: &[RawTensor],
        image_width: u32,
        image_height: u32,
    ) -> Result<Vec<Candidate>> {
        for (idx, layer) in layers.iter().enumerate() {
            self.check_layout(idx, layer)?;
        }

        let mut candidates = Vec::new();
        for layer in layers {
            for row in layer.iter_rows() {
                let raw = RawDetection::from_row(row).ok_or_else(|| {
                    CounterError::MalformedDetectionInput(format!(
                        "row of {} values is shorter than the box prefix",
                        row.len()
                    ))
                })?;
                let Some((class_id, confidence)) = raw.best_class() else {
                    continue;
                };
                if confidence >= self.confidence_threshold {
                    candidates.push(Candidate {
                        bbox: to_box(&raw, image_width, image_height),
                        class_id,
                        confidence,
                    });
                }
            }
        }
        Ok(candidates)
    }

    fn check_layout(&self, idx: usize, layer: &RawTensor) -> Result<()> {
        let expected_cols = self.row_len();
        if layer.cols() != expected_cols {
            return Err(CounterError::MalformedDetectionInput(format!(
                "layer {} has {} columns, expected {} ({} classes)",
                idx,
                layer.cols(),
                expected_cols,
                self.class_count
            )));
        }
        let expected_len = layer
            .rows()
            .checked_mul(layer.cols())
            .ok_or_else(|| {
                CounterError::MalformedDetectionInput(format!("layer {} shape overflows", idx))
            })?;
        if layer.data().len() != expected_len {
            return Err(CounterError::MalformedDetectionInput(format!(
                "layer {} holds {} values, shape {}x{} needs {}",
                idx,
                layer.data().len(),
                layer.rows(),
                layer.cols(),
                expected_len
            )));
        }
        Ok(())
    }
}
