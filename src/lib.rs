//! Traffic counter.
//!
//! Periodically captures stills from a fixed set of roadside cameras, runs a
//! YOLO-style detector over each saved frame, and records per-location counts
//! of a target class (cars by default) in a worksheet ledger.
//!
//! # Module Structure
//!
//! - `capture`: camera sources, frame store, capture cycle and loop
//! - `detect`: detector backends, output decoding, non-maximum suppression
//! - `geometry`: boxes and IoU
//! - `ledger`: capture entries and detection counts on top of `storage`
//! - `pipeline`: per-frame counting and processing passes
//! - `config`: file and environment configuration for the binaries

use rand::RngCore;
use rusqlite::{Connection, OpenFlags};

pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod filename;
pub mod frame;
pub mod geometry;
pub mod labels;
pub mod ledger;
pub mod pipeline;
pub mod storage;

pub use capture::{
    camera_for, run_capture_cycle, CaptureLoop, CaptureOutcome, Clock, CycleReport, FrameSource,
    FrameStore, HttpSnapshotCamera, StubCamera, SystemClock,
};
pub use config::CounterConfig;
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use detect::{
    Candidate, Decoder, DetectionResult, DetectorBackend, RawTensor, StubBackend,
    SuppressionScope, Suppressor,
};
pub use error::{CounterError, Result};
pub use frame::Frame;
pub use geometry::{iou, BBox};
pub use labels::ClassNames;
pub use ledger::{CountCell, DetectionRow, EntryState, Ledger, LedgerEntry};
pub use pipeline::{run_processing_pass, FramePipeline, PassSummary, PipelineSettings};
pub use storage::{Cell, InMemoryWorksheetStore, SheetOp, SqliteWorksheetStore, WorksheetStore};

/// URI for a private in-memory SQLite database that survives across
/// connections opened with the same URI.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:traffic_counter_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> rusqlite::Result<Connection> {
    if db_path.starts_with("file:") {
        return Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        );
    }
    Connection::open(db_path)
}
