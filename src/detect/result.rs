use crate::error::{CounterError, Result};
use crate::geometry::BBox;

/// Columns preceding the per-class scores in every output row:
/// center x, center y, width, height, objectness.
pub const ROW_PREFIX_LEN: usize = 5;

/// One raw output layer of the network, `rows x cols` values in row-major order.
///
/// Shape is not validated here; the decoder rejects tensors whose layout does not
/// match the class count it was built for.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl RawTensor {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        Self { rows, cols, data }
    }

    /// Build a tensor from explicit rows. Ragged input is rejected.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(CounterError::MalformedDetectionInput(format!(
                    "row {} has {} values, expected {}",
                    idx,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Iterate rows. Callers must have checked `data.len() == rows * cols`.
    pub(crate) fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }
}

/// Borrowed view of one output row.
#[derive(Clone, Copy, Debug)]
pub struct RawDetection<'a> {
    /// Center x, normalized to the image width.
    pub x: f32,
    /// Center y, normalized to the image height.
    pub y: f32,
    pub w: f32,
    pub h: f32,
    /// Present in the layout but not used for scoring.
    pub objectness: f32,
    pub scores: &'a [f32],
}

impl<'a> RawDetection<'a> {
    /// Split a row into box, objectness and scores. Returns `None` for rows shorter
    /// than the fixed prefix.
    pub fn from_row(row: &'a [f32]) -> Option<Self> {
        if row.len() < ROW_PREFIX_LEN {
            return None;
        }
        Some(Self {
            x: row[0],
            y: row[1],
            w: row[2],
            h: row[3],
            objectness: row[4],
            scores: &row[ROW_PREFIX_LEN..],
        })
    }

    /// Index and value of the highest class score.
    ///
    /// Ties resolve to the lowest index: a later score only wins when strictly
    /// greater. NaN scores never win.
    pub fn best_class(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, &score) in self.scores.iter().enumerate() {
            match best {
                Some((_, current)) if score > current => best = Some((idx, score)),
                None if !score.is_nan() => best = Some((idx, score)),
                _ => {}
            }
        }
        best
    }
}

/// Decoded, confidence-filtered detection in pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: BBox,
    pub class_id: usize,
    pub confidence: f32,
}

/// Candidates kept after suppression for one frame, highest confidence first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub detections: Vec<Candidate>,
}

impl DetectionResult {
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn count_class(&self, class_id: usize) -> usize {
        self.detections
            .iter()
            .filter(|c| c.class_id == class_id)
            .count()
    }
}
