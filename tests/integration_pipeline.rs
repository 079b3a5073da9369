//! Integration tests for the full ingest workflow
//!
//! These run complete copy-transfer ingests end to end against temporary
//! working trees. The copy path needs no external tools; characterization
//! tools that are absent on the test machine become recorded failures and
//! warnings, so the pipeline still carries the unit all the way to done.

use ingot::config::Settings;
use ingot::error::IngotError;
use ingot::ledger::{EventKind, document};
use ingot::pipeline::{IngestPipeline, IngestRequest, UnitState};
use ingot::registry::{Registry, RegistryRecord};
use ingot::unit::{JobType, UnitPaths};
use std::fs;
use std::path::{Path, PathBuf};

fn settings_for(root: &Path) -> Settings {
    Settings {
        work_root: root.join("work"),
        registry: root.join("registry.json"),
        ..Settings::default()
    }
}

fn seed_registry(settings: &Settings, barcode: &str, title: &str) {
    let mut registry = Registry::open(&settings.registry).unwrap();
    registry.upsert(
        barcode,
        RegistryRecord {
            shipment: "2024-06".to_owned(),
            title: title.to_owned(),
            ..RegistryRecord::default()
        },
    );
    registry.save().unwrap();
}

fn set_modified(path: &Path, secs_after_epoch: u64) {
    let time = std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs_after_epoch);
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_times(fs::FileTimes::new().set_modified(time)).unwrap();
}

/// Five files with period mtimes (1994-1998): two identical non-empty, one
/// empty, one with an unsafe name.
fn transfer_fixture(root: &Path) -> PathBuf {
    let source = root.join("transfer");
    fs::create_dir_all(source.join("docs")).unwrap();
    fs::write(source.join("letter.txt"), "annual report draft").unwrap();
    fs::write(source.join("docs").join("letter-copy.txt"), "annual report draft").unwrap();
    fs::write(source.join("docs").join("empty.dat"), "").unwrap();
    fs::write(source.join("budget.csv"), "year,amount\n1997,100\n").unwrap();
    fs::write(source.join("we?ird.txt"), "odd name").unwrap();

    set_modified(&source.join("letter.txt"), 852_076_800); // 1997-01-01
    set_modified(&source.join("docs").join("letter-copy.txt"), 852_076_800);
    set_modified(&source.join("docs").join("empty.dat"), 820_454_400); // 1996-01-01
    set_modified(&source.join("budget.csv"), 757_382_400); // 1994-01-01
    set_modified(&source.join("we?ird.txt"), 883_612_800); // 1998-01-01
    source
}

fn request(barcode: &str, source: PathBuf) -> IngestRequest {
    IngestRequest {
        barcode: barcode.to_owned(),
        job_type: JobType::CopyOnly,
        source,
        rerun: false,
    }
}

#[tokio::test]
async fn test_copy_transfer_reaches_done() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_for(dir.path());
    seed_registry(&settings, "39002011112222", "Staff files, USB stick");
    let source = transfer_fixture(dir.path());

    let pipeline = IngestPipeline::new(settings.clone());
    let summary = pipeline
        .run(&request("39002011112222", source))
        .await
        .unwrap();

    assert_eq!(summary.state, UnitState::Done);
    assert_eq!(summary.phases_run, vec!["acquire", "characterize", "report"]);

    let paths = UnitPaths::new(&settings.work_root, "39002011112222");
    assert!(paths.objects_dir().join("letter.txt").exists());
    assert!(
        paths.objects_dir().join("we_ird.txt").exists(),
        "unsafe filename must be sanitized during the copy"
    );
    assert!(paths.report_file().exists());
    assert!(paths.done_marker().exists());
    assert!(
        !paths.lock_file().exists(),
        "lock must be removed after the run"
    );

    // The exported document parses back and holds the whole history.
    let events = document::read_events(&paths.document_file()).unwrap();
    assert!(events.iter().any(|e| e.kind == EventKind::Replication));
    assert!(events.iter().any(|e| e.kind == EventKind::FilenameChange));
    assert!(
        events
            .iter()
            .any(|e| e.kind == EventKind::MetadataModification),
        "the registry update must itself be recorded"
    );

    // Registry results: 5 files, 1 empty, 3 distinct, 1 extra copy.
    let registry = Registry::open(&settings.registry).unwrap();
    let record = registry.lookup("39002011112222").unwrap();
    let results = record.results.as_ref().unwrap();
    assert_eq!(results.total_files, 5);
    assert_eq!(results.empty_files, 1);
    assert_eq!(results.distinct_files, 3);
    assert_eq!(results.duplicate_copies, 1);
    assert_eq!(results.outcome, 0);
    assert_eq!(results.method, "direct copy");
    assert_eq!(
        results.date_range, "1994-1998",
        "source mtimes must survive the copy and drive the date range"
    );
}

#[tokio::test]
async fn test_finished_unit_is_not_reprocessed() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_for(dir.path());
    seed_registry(&settings, "39002033334444", "Floppy no. 4");
    let source = transfer_fixture(dir.path());
    let request = request("39002033334444", source);

    let pipeline = IngestPipeline::new(settings.clone());
    pipeline.run(&request).await.unwrap();

    let paths = UnitPaths::new(&settings.work_root, "39002033334444");
    let events_before = document::read_events(&paths.document_file()).unwrap().len();

    let summary = pipeline.run(&request).await.unwrap();
    assert_eq!(summary.state, UnitState::Done);
    assert!(
        summary.phases_run.is_empty(),
        "a finished unit must be left alone without the re-run flag"
    );

    let events_after = document::read_events(&paths.document_file()).unwrap().len();
    assert_eq!(events_before, events_after);
}

#[tokio::test]
async fn test_rerun_flag_repeats_completed_stages() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_for(dir.path());
    seed_registry(&settings, "39002055556666", "Zip disk");
    let source = transfer_fixture(dir.path());
    let first = request("39002055556666", source);

    let pipeline = IngestPipeline::new(settings.clone());
    pipeline.run(&first).await.unwrap();

    let summary = pipeline
        .run(&IngestRequest {
            rerun: true,
            ..first
        })
        .await
        .unwrap();
    assert_eq!(summary.state, UnitState::Done);
    assert_eq!(summary.phases_run, vec!["acquire", "characterize", "report"]);

    // Fresh events are appended alongside the old ones, never replacing them.
    let paths = UnitPaths::new(&settings.work_root, "39002055556666");
    let events = document::read_events(&paths.document_file()).unwrap();
    let digests = events
        .iter()
        .filter(|e| e.kind == EventKind::MessageDigestCalculation)
        .count();
    assert_eq!(digests, 2);
}

#[tokio::test]
async fn test_resume_skips_completed_acquisition() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_for(dir.path());
    seed_registry(&settings, "39002077778888", "Transfer batch");
    let source = transfer_fixture(dir.path());
    let request = request("39002077778888", source);

    let pipeline = IngestPipeline::new(settings.clone());
    let first = pipeline.acquire(&request).await.unwrap();
    assert_eq!(first.state, UnitState::Acquired);
    assert_eq!(first.phases_run, vec!["acquire"]);

    // The follow-up run picks up where the evidence says it stopped.
    let second = pipeline.run(&request).await.unwrap();
    assert_eq!(second.state, UnitState::Done);
    assert_eq!(second.phases_run, vec!["characterize", "report"]);

    let paths = UnitPaths::new(&settings.work_root, "39002077778888");
    let events = document::read_events(&paths.document_file()).unwrap();
    let copies = events
        .iter()
        .filter(|e| e.kind == EventKind::Replication)
        .count();
    assert_eq!(copies, 1, "the completed copy must not be repeated");
}

#[tokio::test]
async fn test_locked_registry_blocks_reporting_but_not_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_for(dir.path());
    seed_registry(&settings, "39002099990000", "External drive");
    let source = transfer_fixture(dir.path());
    let request = request("39002099990000", source);

    let lock = dir.path().join("registry.json.lock");
    fs::write(&lock, b"").unwrap();

    let pipeline = IngestPipeline::new(settings.clone());
    let error = pipeline.run(&request).await.unwrap_err();
    assert!(matches!(
        error.downcast_ref(),
        Some(IngotError::RegistryLocked(_))
    ));

    let paths = UnitPaths::new(&settings.work_root, "39002099990000");
    assert!(paths.objects_dir().join("letter.txt").exists());
    assert!(
        paths.report_file().exists(),
        "characterization completes before the registry refusal"
    );
    assert!(!paths.done_marker().exists());
    assert!(!paths.lock_file().exists());

    // Once the registry is free again, only reporting remains.
    fs::remove_file(&lock).unwrap();
    let summary = pipeline.run(&request).await.unwrap();
    assert_eq!(summary.state, UnitState::Done);
    assert_eq!(summary.phases_run, vec!["report"]);
}

#[tokio::test]
async fn test_status_follows_the_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_for(dir.path());
    seed_registry(&settings, "39002012121212", "Carton 12, CD-R");
    let source = transfer_fixture(dir.path());
    let request = request("39002012121212", source);

    let pipeline = IngestPipeline::new(settings.clone());

    let before = pipeline.status("39002012121212").unwrap();
    assert_eq!(before.state, UnitState::New);
    assert_eq!(before.events, 0);

    pipeline.acquire(&request).await.unwrap();
    let acquired = pipeline.status("39002012121212").unwrap();
    assert_eq!(acquired.state, UnitState::Acquired);
    assert!(acquired.events > 0);
    assert!(!acquired.has_results);

    pipeline.run(&request).await.unwrap();
    let done = pipeline.status("39002012121212").unwrap();
    assert_eq!(done.state, UnitState::Done);
    assert!(done.has_results);
}
