//! Capture filenames and ledger timestamps.
//!
//! Filenames look like `Main_St_07-05-2024_14-30-05.jpg`: the location with
//! spaces replaced by `_`, the date as `MM-DD-YYYY` and the time as `HH-MM-SS`.
//! Older detection rows derived their timestamp from that pattern, so the parser
//! is kept for rows whose stored timestamp is missing.

use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;

/// Timestamp format used in the ledger's date columns.
pub const LEDGER_TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

const FILENAME_TIMESTAMP_FORMAT: &str = "%m-%d-%Y_%H-%M-%S";

/// Written when neither the ledger nor the filename yields a timestamp.
pub const UNKNOWN_TIMESTAMP: &str = "Unknown Date/Time";

fn filename_timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\d{2}-\d{2}-\d{4}_\d{2}-\d{2}-\d{2}").expect("static regex is valid")
    })
}

/// Filename for a frame captured at `location` and `captured_at`.
pub fn capture_filename(location: &str, captured_at: NaiveDateTime) -> String {
    format!(
        "{}_{}.jpg",
        location.replace(' ', "_"),
        captured_at.format(FILENAME_TIMESTAMP_FORMAT)
    )
}

/// Legacy timestamp text embedded in a filename, `_` replaced by a space
/// (`07-05-2024 14-30-05`).
pub fn timestamp_from_filename(filename: &str) -> Option<String> {
    filename_timestamp_pattern()
        .find(filename)
        .map(|m| m.as_str().replace('_', " "))
}

/// Parsed form of the timestamp embedded in a filename.
pub fn parse_filename_timestamp(filename: &str) -> Option<NaiveDateTime> {
    let m = filename_timestamp_pattern().find(filename)?;
    NaiveDateTime::parse_from_str(m.as_str(), FILENAME_TIMESTAMP_FORMAT).ok()
}

pub fn format_ledger_timestamp(at: NaiveDateTime) -> String {
    at.format(LEDGER_TIMESTAMP_FORMAT).to_string()
}

pub fn parse_ledger_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), LEDGER_TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 5)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap()
    }

    #[test]
    fn filename_encodes_location_date_and_time() {
        assert_eq!(
            capture_filename("Main St North", at()),
            "Main_St_North_07-05-2024_14-30-05.jpg"
        );
    }

    #[test]
    fn filename_timestamp_round_trips() {
        let name = capture_filename("Location 1", at());
        assert_eq!(
            timestamp_from_filename(&name).as_deref(),
            Some("07-05-2024 14-30-05")
        );
        assert_eq!(parse_filename_timestamp(&name), Some(at()));
    }

    #[test]
    fn filename_parser_finds_pattern_inside_paths() {
        let path = "annotated_frames/Location_3_12-31-2023_23-59-59.jpg";
        assert_eq!(
            timestamp_from_filename(path).as_deref(),
            Some("12-31-2023 23-59-59")
        );
    }

    #[test]
    fn filename_without_timestamp_yields_none() {
        assert_eq!(timestamp_from_filename("snapshot.jpg"), None);
        assert_eq!(parse_filename_timestamp("snapshot.jpg"), None);
    }

    #[test]
    fn ledger_timestamp_format() {
        let text = format_ledger_timestamp(at());
        assert_eq!(text, "07/05/2024 14:30:05");
        assert_eq!(parse_ledger_timestamp(&text), Some(at()));
        assert_eq!(parse_ledger_timestamp("yesterday"), None);
    }
}
