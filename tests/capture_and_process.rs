use chrono::{NaiveDate, NaiveDateTime};
use std::cell::Cell;

use traffic_counter::ledger::EntryState;
use traffic_counter::{
    run_capture_cycle, run_processing_pass, CaptureOutcome, ClassNames, Clock, CountCell,
    FramePipeline, FrameSource, FrameStore, Ledger, PipelineSettings, RawTensor,
    SqliteWorksheetStore, StubBackend, StubCamera,
};

/// Clock that advances one minute per reading.
struct SteppingClock {
    next: Cell<NaiveDateTime>,
}

impl SteppingClock {
    fn starting_at(hour: u32) -> Self {
        Self {
            next: Cell::new(
                NaiveDate::from_ymd_opt(2024, 7, 5)
                    .unwrap()
                    .and_hms_opt(hour, 0, 0)
                    .unwrap(),
            ),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> NaiveDateTime {
        let now = self.next.get();
        self.next.set(now + chrono::Duration::minutes(1));
        now
    }
}

fn locations() -> Vec<String> {
    vec!["Location 1".into(), "Location 2".into(), "Location 3".into()]
}

/// One output row with a single class score.
fn row(cx: f32, cy: f32, w: f32, h: f32, class_id: usize, score: f32) -> Vec<f32> {
    let mut r = vec![cx, cy, w, h, 1.0];
    let mut scores = vec![0.0; 80];
    scores[class_id] = score;
    r.extend(scores);
    r
}

fn two_cars() -> Vec<RawTensor> {
    vec![RawTensor::from_rows(&[
        row(0.25, 0.25, 0.2, 0.2, 2, 0.9),
        row(0.26, 0.26, 0.2, 0.2, 2, 0.7),
        row(0.75, 0.75, 0.2, 0.2, 2, 0.8),
    ])
    .unwrap()]
}

fn one_car() -> Vec<RawTensor> {
    vec![RawTensor::from_rows(&[row(0.5, 0.5, 0.3, 0.3, 2, 0.6)]).unwrap()]
}

fn pipeline(backend: StubBackend) -> FramePipeline {
    FramePipeline::new(
        Box::new(backend),
        ClassNames::coco(),
        PipelineSettings::default(),
    )
}

#[test]
fn failed_camera_does_not_stop_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let frames = FrameStore::new(dir.path().join("frames"));
    let store = SqliteWorksheetStore::open(&traffic_counter::shared_memory_uri()).unwrap();
    let mut ledger = Ledger::open(store, locations()).unwrap();
    let clock = SteppingClock::starting_at(8);

    let mut cameras: Vec<Box<dyn FrameSource>> = vec![
        Box::new(StubCamera::failing("Location 1", 1)),
        Box::new(StubCamera::new("Location 2")),
        Box::new(StubCamera::new("Location 3")),
    ];

    let report = run_capture_cycle(&mut cameras, &frames, &mut ledger, &clock).unwrap();
    let order: Vec<&str> = report.attempts.iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(order, vec!["Location 1", "Location 2", "Location 3"]);
    assert!(matches!(report.attempts[0].1, CaptureOutcome::Failed(_)));
    assert_eq!(report.saved(), 2);

    let report = run_capture_cycle(&mut cameras, &frames, &mut ledger, &clock).unwrap();
    assert_eq!(report.saved(), 3);

    let entries = ledger.entries().unwrap();
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|e| e.state == EntryState::Captured));
    assert!(entries.iter().all(|e| frames.path_for(&e.filename).exists()));
    assert_eq!(entries[0].location, "Location 2");
    assert_eq!(entries[0].filename, "Location_2_07-05-2024_08-01-00.jpg");
}

#[test]
fn processing_counts_once_and_retries_failures() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ledger.db");
    let db_path = db_path.to_str().unwrap();
    let frames = FrameStore::new(dir.path().join("frames"));
    let clock = SteppingClock::starting_at(9);

    {
        let store = SqliteWorksheetStore::open(db_path).unwrap();
        let mut ledger = Ledger::open(store, locations()).unwrap();
        let mut cameras: Vec<Box<dyn FrameSource>> = vec![
            Box::new(StubCamera::new("Location 1")),
            Box::new(StubCamera::new("Location 2")),
            Box::new(StubCamera::new("Location 3")),
        ];
        run_capture_cycle(&mut cameras, &frames, &mut ledger, &clock).unwrap();
    }

    let store = SqliteWorksheetStore::open(db_path).unwrap();
    let mut ledger = Ledger::open(store, locations()).unwrap();

    let mut backend = StubBackend::with_output(one_car());
    backend.push_output(two_cars()).push_failure("accelerator reset");
    let mut first = pipeline(backend);
    let summary = run_processing_pass(&mut ledger, &mut first, &frames, "car").unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.unmapped, 0);

    let pending = ledger.next_unprocessed().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].location, "Location 2");

    let entries = ledger.entries().unwrap();
    assert_eq!(
        ledger.count_for(&entries[0]).unwrap(),
        Some(CountCell::Count(2))
    );
    assert_eq!(
        ledger.count_for(&entries[2]).unwrap(),
        Some(CountCell::Count(1))
    );

    let mut second = pipeline(StubBackend::with_output(one_car()));
    let summary = run_processing_pass(&mut ledger, &mut second, &frames, "car").unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);

    let summary = run_processing_pass(&mut ledger, &mut second, &frames, "car").unwrap();
    assert_eq!(summary.processed, 0);

    let rows = ledger.detection_rows().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].timestamp, "07/05/2024 09:00:00");
    assert_eq!(
        rows[0].counts,
        vec![
            CountCell::Count(2),
            CountCell::NotAvailable,
            CountCell::NotAvailable
        ]
    );
    assert_eq!(rows[2].filename, entries[1].filename);
}

#[test]
fn malformed_output_and_missing_frames_are_left_for_retry() {
    let dir = tempfile::tempdir().unwrap();
    let frames = FrameStore::new(dir.path().join("frames"));
    let store = SqliteWorksheetStore::open(&traffic_counter::shared_memory_uri()).unwrap();
    let mut ledger = Ledger::open(store, locations()).unwrap();
    let clock = SteppingClock::starting_at(10);

    let mut cameras: Vec<Box<dyn FrameSource>> = vec![
        Box::new(StubCamera::new("Location 1")),
        Box::new(StubCamera::new("Location 2")),
    ];
    run_capture_cycle(&mut cameras, &frames, &mut ledger, &clock).unwrap();
    let entries = ledger.entries().unwrap();
    std::fs::remove_file(frames.path_for(&entries[1].filename)).unwrap();

    let wrong_width = vec![RawTensor::new(1, 10, vec![0.5; 10])];
    let mut malformed = pipeline(StubBackend::with_output(wrong_width));
    let summary = run_processing_pass(&mut ledger, &mut malformed, &frames, "car").unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed, 2);
    assert_eq!(ledger.next_unprocessed().unwrap().len(), 2);
    assert!(ledger.detection_rows().unwrap().is_empty());
}

#[test]
fn unmapped_location_is_recorded_as_not_available() {
    let dir = tempfile::tempdir().unwrap();
    let frames = FrameStore::new(dir.path().join("frames"));
    let store = SqliteWorksheetStore::open(&traffic_counter::shared_memory_uri()).unwrap();
    let mut ledger = Ledger::open(store, locations()).unwrap();
    let clock = SteppingClock::starting_at(11);

    let mut cameras: Vec<Box<dyn FrameSource>> = vec![Box::new(StubCamera::new("Back Lot"))];
    run_capture_cycle(&mut cameras, &frames, &mut ledger, &clock).unwrap();

    let mut counting = pipeline(StubBackend::with_output(two_cars()));
    let summary = run_processing_pass(&mut ledger, &mut counting, &frames, "car").unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.unmapped, 1);
    assert!(ledger.next_unprocessed().unwrap().is_empty());

    let rows = ledger.detection_rows().unwrap();
    assert_eq!(rows[0].counts, vec![CountCell::NotAvailable; 3]);
}
