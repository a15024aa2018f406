//! Capture/processing ledger.
//!
//! Two worksheets back the ledger:
//!
//! - `ImageCaptures`: one row per captured frame,
//!   `[Date & Time, Location, Image Filename, Processed]`.
//! - `DetectionCounts`: one row per processed frame,
//!   `[Date/Time, <one column per location>, File Location]`.
//!
//! A capture row starts `Captured` (empty `Processed` cell) and moves to
//! `Processed` exactly once. The detection row and the `Processed` flag are
//! written in one atomic batch, so a crash never leaves a counted frame that is
//! still marked unprocessed.

use chrono::NaiveDateTime;

use crate::error::{CounterError, Result};
use crate::filename::{
    format_ledger_timestamp, parse_ledger_timestamp, timestamp_from_filename, UNKNOWN_TIMESTAMP,
};
use crate::storage::{Cell, SheetOp, WorksheetStore};

pub const CAPTURE_SHEET: &str = "ImageCaptures";
pub const DETECTION_SHEET: &str = "DetectionCounts";

pub const CAPTURE_HEADER: [&str; 4] = ["Date & Time", "Location", "Image Filename", "Processed"];
const PROCESSED_COLUMN: &str = "Processed";
const PROCESSED_MARK: &str = "Yes";

const DETECTION_DATE_COLUMN: &str = "Date/Time";
const DETECTION_FILE_COLUMN: &str = "File Location";

/// Sentinel written in count columns that have no count.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Captured,
    Processed,
}

/// One captured frame as recorded in the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    /// 0-based data row in the capture sheet.
    pub row: usize,
    /// `None` when the stored text is not in the ledger timestamp format.
    pub timestamp: Option<NaiveDateTime>,
    pub location: String,
    pub filename: String,
    pub state: EntryState,
}

impl LedgerEntry {
    pub fn is_processed(&self) -> bool {
        self.state == EntryState::Processed
    }

    /// Text for the detection row's date column: the capture timestamp, else the
    /// timestamp embedded in the filename, else a fixed marker.
    pub fn timestamp_text(&self) -> String {
        match self.timestamp {
            Some(at) => format_ledger_timestamp(at),
            None => timestamp_from_filename(&self.filename)
                .unwrap_or_else(|| UNKNOWN_TIMESTAMP.to_string()),
        }
    }
}

/// A per-location count column value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountCell {
    Count(u32),
    NotAvailable,
}

impl CountCell {
    fn to_cell(self) -> Cell {
        match self {
            CountCell::Count(n) => Cell::Number(i64::from(n)),
            CountCell::NotAvailable => Cell::text(NOT_AVAILABLE),
        }
    }

    fn from_cell(cell: &Cell) -> Self {
        match cell {
            Cell::Number(n) => u32::try_from(*n)
                .map(CountCell::Count)
                .unwrap_or(CountCell::NotAvailable),
            _ => CountCell::NotAvailable,
        }
    }
}

/// One row of the detection sheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectionRow {
    pub timestamp: String,
    /// One value per configured location, in configured order.
    pub counts: Vec<CountCell>,
    pub filename: String,
}

pub struct Ledger<S: WorksheetStore> {
    store: S,
    locations: Vec<String>,
    processed_col: usize,
}

impl<S: WorksheetStore> Ledger<S> {
    /// Open the ledger over `store`, creating both sheets when missing.
    ///
    /// A capture sheet written without a `Processed` column gets one appended to
    /// its header. An existing detection sheet must have the columns implied by
    /// `locations`.
    pub fn open(mut store: S, locations: Vec<String>) -> Result<Self> {
        let capture_header: Vec<String> = CAPTURE_HEADER.iter().map(|s| s.to_string()).collect();
        store.ensure_sheet(CAPTURE_SHEET, &capture_header)?;

        let mut header = store.header(CAPTURE_SHEET)?;
        let processed_col = match header.iter().position(|h| h == PROCESSED_COLUMN) {
            Some(col) => col,
            None => {
                header.push(PROCESSED_COLUMN.to_string());
                store.apply(&[SheetOp::SetHeader {
                    sheet: CAPTURE_SHEET.to_string(),
                    header: header.clone(),
                }])?;
                log::info!("added {} column to {}", PROCESSED_COLUMN, CAPTURE_SHEET);
                header.len() - 1
            }
        };

        let detection_header = detection_header(&locations);
        store.ensure_sheet(DETECTION_SHEET, &detection_header)?;
        let existing = store.header(DETECTION_SHEET)?;
        if existing != detection_header {
            return Err(CounterError::Config(format!(
                "{} header {:?} does not match configured locations {:?}",
                DETECTION_SHEET, existing, locations
            )));
        }

        Ok(Self {
            store,
            locations,
            processed_col,
        })
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Append a `Captured` entry for a newly saved frame.
    pub fn record_capture(
        &mut self,
        timestamp: NaiveDateTime,
        location: &str,
        filename: &str,
    ) -> Result<LedgerEntry> {
        let row = self.store.rows(CAPTURE_SHEET)?.len();
        let mut cells = vec![
            Cell::text(format_ledger_timestamp(timestamp)),
            Cell::text(location),
            Cell::text(filename),
        ];
        if cells.len() <= self.processed_col {
            cells.resize(self.processed_col + 1, Cell::Empty);
        }
        self.store.append_row(CAPTURE_SHEET, cells)?;
        Ok(LedgerEntry {
            row,
            timestamp: Some(timestamp),
            location: location.to_string(),
            filename: filename.to_string(),
            state: EntryState::Captured,
        })
    }

    /// Every capture entry, in capture order.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let rows = self.store.rows(CAPTURE_SHEET)?;
        Ok(rows
            .iter()
            .enumerate()
            .map(|(row, cells)| self.entry_from_cells(row, cells))
            .collect())
    }

    /// `Captured` entries in capture order.
    ///
    /// Rows without a filename cannot be processed and are skipped with a warning.
    pub fn next_unprocessed(&self) -> Result<Vec<LedgerEntry>> {
        let mut out = Vec::new();
        for entry in self.entries()? {
            if entry.is_processed() {
                continue;
            }
            if entry.filename.is_empty() {
                log::warn!(
                    "{} row {} has no image filename; skipping",
                    CAPTURE_SHEET,
                    entry.row
                );
                continue;
            }
            out.push(entry);
        }
        Ok(out)
    }

    /// Mark `entry` processed and append its detection row.
    ///
    /// Returns `false` without writing anything when the entry is already
    /// processed. A location outside the configured set still marks the entry
    /// processed, with every count column left as `N/A`.
    pub fn record_count(&mut self, entry: &LedgerEntry, location: &str, count: u32) -> Result<bool> {
        let rows = self.store.rows(CAPTURE_SHEET)?;
        let cells = rows.get(entry.row).ok_or_else(|| {
            CounterError::PersistenceFailure(format!(
                "{} has no row {}",
                CAPTURE_SHEET, entry.row
            ))
        })?;
        let current = self.entry_from_cells(entry.row, cells);
        if current.filename != entry.filename {
            return Err(CounterError::PersistenceFailure(format!(
                "{} row {} holds {}, expected {}",
                CAPTURE_SHEET, entry.row, current.filename, entry.filename
            )));
        }
        if current.is_processed() {
            log::debug!("{} already processed; skipping", entry.filename);
            return Ok(false);
        }

        let mut counts = vec![CountCell::NotAvailable; self.locations.len()];
        match self.locations.iter().position(|l| l == location) {
            Some(idx) => counts[idx] = CountCell::Count(count),
            None => log::warn!(
                "{}; {} recorded as {}",
                CounterError::UnmappedLocation(location.to_string()),
                entry.filename,
                NOT_AVAILABLE
            ),
        }

        let mut detection = Vec::with_capacity(counts.len() + 2);
        detection.push(Cell::text(current.timestamp_text()));
        detection.extend(counts.into_iter().map(CountCell::to_cell));
        detection.push(Cell::text(entry.filename.as_str()));

        self.store.apply(&[
            SheetOp::AppendRow {
                sheet: DETECTION_SHEET.to_string(),
                cells: detection,
            },
            SheetOp::UpdateCell {
                sheet: CAPTURE_SHEET.to_string(),
                row: entry.row,
                col: self.processed_col,
                value: Cell::text(PROCESSED_MARK),
            },
        ])?;
        Ok(true)
    }

    pub fn detection_rows(&self) -> Result<Vec<DetectionRow>> {
        let n = self.locations.len();
        let rows = self.store.rows(DETECTION_SHEET)?;
        Ok(rows
            .iter()
            .map(|cells| DetectionRow {
                timestamp: cells.first().map(Cell::display).unwrap_or_default(),
                counts: (0..n)
                    .map(|i| {
                        cells
                            .get(i + 1)
                            .map(CountCell::from_cell)
                            .unwrap_or(CountCell::NotAvailable)
                    })
                    .collect(),
                filename: cells.get(n + 1).map(Cell::display).unwrap_or_default(),
            })
            .collect())
    }

    /// Count recorded for `entry` at its own location, if it has been processed.
    pub fn count_for(&self, entry: &LedgerEntry) -> Result<Option<CountCell>> {
        let idx = self.locations.iter().position(|l| l == &entry.location);
        Ok(self
            .detection_rows()?
            .into_iter()
            .find(|row| row.filename == entry.filename)
            .map(|row| match idx {
                Some(i) => row.counts[i],
                None => CountCell::NotAvailable,
            }))
    }

    fn entry_from_cells(&self, row: usize, cells: &[Cell]) -> LedgerEntry {
        let text = |col: usize| cells.get(col).map(Cell::display).unwrap_or_default();
        let processed = cells
            .get(self.processed_col)
            .and_then(Cell::as_text)
            .is_some_and(|v| v == PROCESSED_MARK);
        LedgerEntry {
            row,
            timestamp: parse_ledger_timestamp(&text(0)),
            location: text(1),
            filename: text(2),
            state: if processed {
                EntryState::Processed
            } else {
                EntryState::Captured
            },
        }
    }
}

fn detection_header(locations: &[String]) -> Vec<String> {
    let mut header = Vec::with_capacity(locations.len() + 2);
    header.push(DETECTION_DATE_COLUMN.to_string());
    header.extend(locations.iter().cloned());
    header.push(DETECTION_FILE_COLUMN.to_string());
    header
}
