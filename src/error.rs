//! Error taxonomy for capture and processing.

use thiserror::Error;

/// Errors surfaced by the counting pipeline, the ledger and the capture cycle.
///
/// Frame-level errors (capture, decode, inference, image) are fatal for one frame
/// only; the processing pass leaves that ledger entry untouched so the next run
/// retries it.
/// `PersistenceFailure` is fatal for the current operation.
#[derive(Error, Debug)]
pub enum CounterError {
    #[error("capture failed for {location}: {reason}")]
    CaptureFailure { location: String, reason: String },

    #[error("malformed detection input: {0}")]
    MalformedDetectionInput(String),

    #[error("location '{0}' is not configured")]
    UnmappedLocation(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for CounterError {
    fn from(err: rusqlite::Error) -> Self {
        CounterError::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for CounterError {
    fn from(err: serde_json::Error) -> Self {
        CounterError::PersistenceFailure(format!("cell encoding: {}", err))
    }
}

impl CounterError {
    /// True when the failure is confined to one frame and the entry may be retried.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            CounterError::CaptureFailure { .. }
                | CounterError::MalformedDetectionInput(_)
                | CounterError::Inference(_)
                | CounterError::Image(_)
                | CounterError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CounterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_are_retryable_and_store_errors_are_not() {
        let rebuilt = CounterError::CaptureFailure {
            location: "Location 1".into(),
            reason: "frame has empty dimensions 0x0".into(),
        };
        assert!(rebuilt.is_frame_local());
        assert!(CounterError::MalformedDetectionInput("short row".into()).is_frame_local());
        assert!(!CounterError::PersistenceFailure("locked".into()).is_frame_local());
        assert!(!CounterError::Config("bad header".into()).is_frame_local());
        assert!(!CounterError::UnmappedLocation("Back Lot".into()).is_frame_local());
    }
}
