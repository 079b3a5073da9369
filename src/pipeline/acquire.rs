//! Acquisition phase: get content off the medium.
//!
//! Dispatch is by job type. Direct transfers are copied in-process; every
//! other method shells out to the configured tool. Each step is gated so a
//! resumed run never repeats work that already left usable output, and a
//! nonzero exit with usable output is recorded with its real code rather
//! than repeated (re-imaging a dying disc can destroy it).

use std::collections::HashSet;
use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use super::state;
use crate::config::Settings;
use crate::error::IngotError;
use crate::fingerprint::walk::walk_files;
use crate::gate::StageGate;
use crate::ledger::{Agent, EventKind, Ledger, ProvenanceEvent};
use crate::replicate::{self, ExtractionMethod};
use crate::runner::{ToolOutput, ToolRunner, render_command};
use crate::unit::{IngestUnit, JobType, UnitPaths};

/// Run the acquisition method for the unit's job type.
///
/// # Errors
///
/// [`IngotError::AcquisitionFailed`] when the capture step fails and leaves
/// nothing usable behind; I/O errors writing into the working tree.
pub async fn run(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
) -> Result<()> {
    match unit.job_type {
        JobType::CopyOnly => copy_transfer(unit, paths, ledger, gate),
        JobType::DiskImage => image_and_extract(unit, paths, ledger, gate, settings, runner).await,
        JobType::DvdVideo => rip_dvd(unit, paths, ledger, gate, settings, runner).await,
        JobType::AudioCd => rip_audio(unit, paths, ledger, gate, settings, runner).await,
    }
}

/// Is this step already behind us? Either it succeeded, or it was attempted
/// and left usable output (the partial-acquisition rule).
fn step_done(gate: StageGate, ledger: &Ledger, kind: EventKind, usable: bool) -> bool {
    gate.is_done(ledger, kind) || (usable && gate.is_attempted(ledger, kind))
}

fn failure_code(exit: i64) -> i64 {
    if exit == 0 { 1 } else { exit }
}

/// Append the acquisition event and apply the partial-acquisition rule:
/// usable output continues (real exit code preserved), no usable output is
/// terminal.
fn record_acquisition(
    ledger: &mut Ledger,
    command: String,
    note: String,
    output: &ToolOutput,
    usable: bool,
    agent: Agent,
    failure_detail: String,
) -> Result<()> {
    let code = if usable { output.exit } else { failure_code(output.exit) };
    let outcome_note = if !usable && output.success() {
        "produced no output".to_owned()
    } else {
        output.outcome_note()
    };
    ledger.append(ProvenanceEvent::new(
        EventKind::Acquisition,
        command,
        note,
        code,
        outcome_note,
        agent,
    ))?;

    if !usable {
        return Err(IngotError::AcquisitionFailed {
            code,
            detail: failure_detail,
        }
        .into());
    }
    if code != 0 {
        tracing::warn!("Acquisition exited {code} with usable output; continuing");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Direct transfers

fn copy_transfer(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
) -> Result<()> {
    let objects = paths.objects_dir();
    if step_done(
        gate,
        ledger,
        EventKind::Replication,
        state::dir_has_files(&objects),
    ) {
        tracing::info!("Objects already copied for {}; skipping", unit.barcode);
        return Ok(());
    }

    let outcome = copy_tree(&unit.source, &objects)?;

    for (from, to) in &outcome.renames {
        ledger.append(ProvenanceEvent::success(
            EventKind::FilenameChange,
            format!("rename '{}' -> '{}'", from.display(), to.display()),
            "Filename carried characters unsafe for preservation storage",
            Agent::internal(),
        ))?;
    }
    for failure in &outcome.failures {
        tracing::warn!("Copy failure: {failure}");
    }

    let usable = state::dir_has_files(&objects);
    let exit = i64::from(!outcome.failures.is_empty());
    let code = if usable { exit } else { failure_code(exit) };
    let outcome_note = if code == 0 {
        "completed".to_owned()
    } else if usable {
        format!("{} files failed to copy", outcome.failures.len())
    } else {
        "produced no output".to_owned()
    };
    ledger.append(ProvenanceEvent::new(
        EventKind::Replication,
        format!("copy {} {}", unit.source.display(), objects.display()),
        format!("Recursive copy of {} files", outcome.copied),
        code,
        outcome_note,
        Agent::internal(),
    ))?;

    if !usable {
        return Err(IngotError::AcquisitionFailed {
            code,
            detail: format!("copy produced no files under {}", objects.display()),
        }
        .into());
    }
    Ok(())
}

#[derive(Debug, Default)]
struct CopyOutcome {
    copied: usize,
    /// Relative source path to relative destination path, one per rename.
    renames: Vec<(PathBuf, PathBuf)>,
    failures: Vec<String>,
}

/// Recursive copy preserving modify times, with filename sanitation.
///
/// Destination names already on disk are overwritten in place so a re-run
/// converges; only two *source* files mapping to the same sanitized name get
/// a numbered suffix.
fn copy_tree(source: &Path, dest: &Path) -> Result<CopyOutcome> {
    let mut outcome = CopyOutcome::default();
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for relative in walk_files(source) {
        let safe = sanitize_relative(&relative);
        let mut target = safe.clone();
        let mut counter = 1;
        while !claimed.insert(target.clone()) {
            target = numbered_alternative(&safe, counter);
            counter += 1;
        }
        if target != relative {
            outcome.renames.push((relative.clone(), target.clone()));
        }

        let from = source.join(&relative);
        let to = dest.join(&target);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create folder: {}", parent.display()))?;
        }
        match copy_with_times(&from, &to) {
            Ok(()) => outcome.copied += 1,
            Err(e) => outcome.failures.push(format!("{}: {e}", relative.display())),
        }
    }

    Ok(outcome)
}

fn copy_with_times(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::copy(from, to)?;
    let modified = fs::metadata(from)?.modified()?;
    let file = File::options().write(true).open(to)?;
    file.set_times(FileTimes::new().set_modified(modified))?;
    Ok(())
}

fn sanitize_relative(relative: &Path) -> PathBuf {
    relative
        .components()
        .map(|component| sanitize_component(&component.as_os_str().to_string_lossy()))
        .collect()
}

/// Replace characters no preservation filesystem target accepts, and strip
/// trailing dots and spaces.
fn sanitize_component(name: &str) -> String {
    let mut safe: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') {
                '_'
            } else {
                c
            }
        })
        .collect();
    while safe.ends_with('.') || safe.ends_with(' ') {
        safe.pop();
    }
    if safe.is_empty() {
        safe.push('_');
    }
    safe
}

fn numbered_alternative(relative: &Path, counter: usize) -> PathBuf {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "_".to_owned());
    let name = match relative.extension() {
        Some(ext) => format!("{stem}_{counter}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{counter}"),
    };
    match relative.parent() {
        Some(parent) if parent != Path::new("") => parent.join(name),
        _ => PathBuf::from(name),
    }
}

// ---------------------------------------------------------------------------
// Disk images

async fn image_and_extract(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
) -> Result<()> {
    fs::create_dir_all(paths.diskimage_dir())
        .with_context(|| format!("Failed to create image folder for {}", unit.barcode))?;

    image_medium(unit, paths, ledger, gate, settings, runner).await?;
    list_filesystem(paths, ledger, gate, settings, runner).await?;
    extract_volumes(paths, ledger, gate, settings, runner).await
}

async fn image_medium(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
) -> Result<()> {
    let image = paths.image_file();
    if step_done(
        gate,
        ledger,
        EventKind::Acquisition,
        state::file_has_content(&image),
    ) {
        tracing::info!("Image already rescued for {}; skipping", unit.barcode);
        return Ok(());
    }

    let tools = &settings.tools;
    let args = vec![
        "-d".to_owned(),
        "-r3".to_owned(),
        unit.source.display().to_string(),
        image.display().to_string(),
        paths.image_map_file().display().to_string(),
    ];
    let version = runner.version(&tools.imaging).await;
    let output = runner
        .run(&tools.imaging, &args, settings.long_tool_timeout())
        .await;

    record_acquisition(
        ledger,
        render_command(&tools.imaging, &args),
        format!("Imaged {} to {}", unit.source.display(), image.display()),
        &output,
        state::file_has_content(&image),
        Agent::tool(&tools.imaging, version),
        format!("imaging left no usable image at {}", image.display()),
    )
}

/// Body-file listing of the image, written to `metadata/listing.txt`.
///
/// Failure is soft; fingerprinting falls back to walking the extracted
/// objects.
async fn list_filesystem(
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
) -> Result<()> {
    let listing = paths.listing_file();
    if step_done(
        gate,
        ledger,
        EventKind::ForensicAnalysis,
        state::file_has_content(&listing),
    ) {
        tracing::info!("File listing already produced; skipping");
        return Ok(());
    }

    let tools = &settings.tools;
    let args = vec![
        "-r".to_owned(),
        "-m".to_owned(),
        "/".to_owned(),
        paths.image_file().display().to_string(),
    ];
    let version = runner.version(&tools.listing).await;
    let output = runner
        .run(&tools.listing, &args, settings.tool_timeout())
        .await;

    fs::write(&listing, &output.stdout)
        .with_context(|| format!("Failed to write listing: {}", listing.display()))?;

    if !output.success() {
        tracing::warn!("File listing failed ({})", output.outcome_note());
    }
    ledger.append(ProvenanceEvent::new(
        EventKind::ForensicAnalysis,
        render_command(&tools.listing, &args),
        format!("Filesystem listing written to {}", listing.display()),
        output.exit,
        output.outcome_note(),
        Agent::tool(&tools.listing, version),
    ))?;
    Ok(())
}

async fn extract_volumes(
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
) -> Result<()> {
    let objects = paths.objects_dir();
    if step_done(
        gate,
        ledger,
        EventKind::Replication,
        state::dir_has_files(&objects),
    ) {
        tracing::info!("Volumes already extracted; skipping");
        return Ok(());
    }

    let tools = &settings.tools;
    let image = paths.image_file();
    let detection = runner
        .run(
            &tools.detection,
            &[image.display().to_string()],
            settings.tool_timeout(),
        )
        .await;
    if !detection.success() {
        tracing::warn!(
            "Filesystem detection failed ({}); treating image as unsupported",
            detection.outcome_note()
        );
    }
    fs::write(paths.detection_file(), &detection.stdout).with_context(|| {
        format!(
            "Failed to write detection evidence: {}",
            paths.detection_file().display()
        )
    })?;

    let evidence = replicate::parse_evidence(&detection.stdout);
    let plan = replicate::plan(&evidence, &objects);
    tracing::info!("Replication plan: {}", plan.method_summary());

    let results = replicate::execute(
        &plan,
        &image,
        &objects,
        runner,
        tools,
        settings.long_tool_timeout(),
    )
    .await?;

    for result in &results {
        let agent = method_agent(result.job.method, settings, runner).await;
        let note = if result.job.method == ExtractionMethod::Unsupported {
            "No recognizable filesystem; extraction skipped".to_owned()
        } else {
            format!(
                "Extracted volume '{}' to {}",
                result.job.label,
                result.job.output.display()
            )
        };
        ledger.append(ProvenanceEvent::new(
            EventKind::Replication,
            result.command.clone(),
            note,
            result.output.exit,
            result.output.outcome_note(),
            agent,
        ))?;
    }

    // The rescued image remains preservation output even when nothing could
    // be extracted from it, so this is not terminal.
    if !state::dir_has_files(&objects) {
        tracing::warn!("Extraction produced no files; the image is the only copy");
    }
    Ok(())
}

async fn method_agent(
    method: ExtractionMethod,
    settings: &Settings,
    runner: &ToolRunner,
) -> Agent {
    let tools = &settings.tools;
    match method {
        ExtractionMethod::BulkCopy => {
            Agent::tool(&tools.bulk_copy, runner.version(&tools.bulk_copy).await)
        }
        ExtractionMethod::HfsExtract => {
            Agent::tool(&tools.hfs_extract, runner.version(&tools.hfs_extract).await)
        }
        ExtractionMethod::TskRecover => {
            Agent::tool(&tools.recover, runner.version(&tools.recover).await)
        }
        ExtractionMethod::Unsupported => Agent::internal(),
    }
}

// ---------------------------------------------------------------------------
// Optical rips

async fn rip_dvd(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
) -> Result<()> {
    let objects = paths.objects_dir();
    if step_done(
        gate,
        ledger,
        EventKind::Acquisition,
        state::dir_has_files(&objects),
    ) {
        tracing::info!("Titles already ripped for {}; skipping", unit.barcode);
        return Ok(());
    }

    let tools = &settings.tools;
    let args = vec![
        "mkv".to_owned(),
        format!("dev:{}", unit.source.display()),
        "all".to_owned(),
        objects.display().to_string(),
    ];
    let version = runner.version(&tools.dvd_rip).await;
    let output = runner
        .run(&tools.dvd_rip, &args, settings.long_tool_timeout())
        .await;

    record_acquisition(
        ledger,
        render_command(&tools.dvd_rip, &args),
        format!("Ripped video titles from {}", unit.source.display()),
        &output,
        state::dir_has_files(&objects),
        Agent::tool(&tools.dvd_rip, version),
        "video rip produced no titles".to_owned(),
    )
}

async fn rip_audio(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
) -> Result<()> {
    let objects = paths.objects_dir();
    if !step_done(
        gate,
        ledger,
        EventKind::Acquisition,
        state::dir_has_files(&objects),
    ) {
        let tools = &settings.tools;
        let args = vec![
            "-B".to_owned(),
            "-d".to_owned(),
            unit.source.display().to_string(),
        ];
        let version = runner.version(&tools.audio_rip).await;
        // cdparanoia writes its track files into the working directory.
        let output = runner
            .run_in(&tools.audio_rip, &args, &objects, settings.long_tool_timeout())
            .await;

        record_acquisition(
            ledger,
            render_command(&tools.audio_rip, &args),
            format!("Ripped audio tracks from {}", unit.source.display()),
            &output,
            state::dir_has_files(&objects),
            Agent::tool(&tools.audio_rip, version),
            "audio rip produced no tracks".to_owned(),
        )?;
    } else {
        tracing::info!("Tracks already ripped for {}; skipping", unit.barcode);
    }

    if gate.is_done(ledger, EventKind::Normalization) {
        tracing::info!("Tracks already normalized; skipping");
        return Ok(());
    }
    normalize_audio(paths, ledger, settings, runner).await
}

/// Transcode each ripped wav track to FLAC beside it; originals are kept.
async fn normalize_audio(
    paths: &UnitPaths,
    ledger: &mut Ledger,
    settings: &Settings,
    runner: &ToolRunner,
) -> Result<()> {
    let objects = paths.objects_dir();
    let tracks: Vec<PathBuf> = walk_files(&objects)
        .into_iter()
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        })
        .collect();
    if tracks.is_empty() {
        tracing::warn!("No wav tracks to normalize");
        return Ok(());
    }

    let tools = &settings.tools;
    let version = runner.version(&tools.audio_normalize).await;
    let mut converted = 0_usize;
    let mut worst = 0_i64;

    for track in &tracks {
        let input = objects.join(track);
        let flac = input.with_extension("flac");
        let args = vec![
            "-y".to_owned(),
            "-i".to_owned(),
            input.display().to_string(),
            flac.display().to_string(),
        ];
        let output = runner
            .run(&tools.audio_normalize, &args, settings.tool_timeout())
            .await;
        if output.success() {
            converted += 1;
        } else {
            worst = failure_code(output.exit);
            tracing::warn!(
                "Normalization of {} failed ({})",
                track.display(),
                output.outcome_note()
            );
        }
    }

    let command = format!("{} -y -i <track>.wav <track>.flac", tools.audio_normalize);
    let note = format!("Normalized {converted} of {} tracks to FLAC", tracks.len());
    let agent = Agent::tool(&tools.audio_normalize, version);
    let event = if worst == 0 {
        ProvenanceEvent::success(EventKind::Normalization, command, note, agent)
    } else {
        ProvenanceEvent::failure(
            EventKind::Normalization,
            command,
            note,
            worst,
            "some tracks failed",
            agent,
        )
    };
    ledger.append(event)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolCommands;
    use std::time::{Duration, SystemTime};

    fn set_modified(path: &Path, time: SystemTime) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_modified(time)).unwrap();
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("plain.txt"), "plain.txt");
        assert_eq!(sanitize_component("we?ird.txt"), "we_ird.txt");
        assert_eq!(sanitize_component("a<b>c:d\"e|f"), "a_b_c_d_e_f");
        assert_eq!(sanitize_component("trailing. . "), "trailing_");
        assert_eq!(sanitize_component("..."), "_");
        assert_eq!(sanitize_component("tab\there"), "tab_here");
    }

    #[test]
    fn test_copy_preserves_modify_times() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(source.path().join("old.txt"), "from 1990").unwrap();
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(631_152_000);
        set_modified(&source.path().join("old.txt"), past);

        let outcome = copy_tree(source.path(), dest.path()).unwrap();
        assert_eq!(outcome.copied, 1);
        assert!(outcome.renames.is_empty());

        let copied = fs::metadata(dest.path().join("old.txt"))
            .unwrap()
            .modified()
            .unwrap();
        let drift = copied
            .duration_since(past)
            .unwrap_or_default()
            .as_secs();
        assert_eq!(drift, 0);
    }

    #[test]
    fn test_copy_sanitizes_and_reports_renames() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::create_dir(source.path().join("sub")).unwrap();
        fs::write(source.path().join("sub").join("we?ird.txt"), "x").unwrap();

        let outcome = copy_tree(source.path(), dest.path()).unwrap();
        assert_eq!(outcome.copied, 1);
        assert_eq!(
            outcome.renames,
            vec![(
                PathBuf::from("sub/we?ird.txt"),
                PathBuf::from("sub/we_ird.txt")
            )]
        );
        assert!(dest.path().join("sub/we_ird.txt").is_file());
    }

    #[test]
    fn test_copy_collision_gets_numbered_suffix() {
        let source = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(source.path().join("a*b.txt"), "star").unwrap();
        fs::write(source.path().join("a?b.txt"), "question").unwrap();

        let outcome = copy_tree(source.path(), dest.path()).unwrap();
        assert_eq!(outcome.copied, 2);
        assert_eq!(
            fs::read_to_string(dest.path().join("a_b.txt")).unwrap(),
            "star"
        );
        assert_eq!(
            fs::read_to_string(dest.path().join("a_b_1.txt")).unwrap(),
            "question"
        );
    }

    #[test]
    fn test_copy_transfer_is_idempotent() {
        let work = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("doc.txt"), "content").unwrap();
        fs::write(source.path().join("we?ird.txt"), "odd").unwrap();

        let unit = IngestUnit::bind(
            work.path(),
            "39002012345678",
            JobType::CopyOnly,
            source.path(),
            false,
        )
        .unwrap();
        let paths = UnitPaths::new(work.path(), "39002012345678");
        let mut ledger = Ledger::open(&paths.metadata_dir()).unwrap();
        let gate = StageGate::new(false);

        copy_transfer(&unit, &paths, &mut ledger, gate).unwrap();
        assert_eq!(ledger.events_of_kind(EventKind::Replication).count(), 1);
        assert_eq!(ledger.events_of_kind(EventKind::FilenameChange).count(), 1);

        copy_transfer(&unit, &paths, &mut ledger, gate).unwrap();
        assert_eq!(ledger.events_of_kind(EventKind::Replication).count(), 1);
        assert_eq!(ledger.events_of_kind(EventKind::FilenameChange).count(), 1);
    }

    #[test]
    fn test_empty_source_is_terminal() {
        let work = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();

        let unit = IngestUnit::bind(
            work.path(),
            "39002087654321",
            JobType::CopyOnly,
            source.path(),
            false,
        )
        .unwrap();
        let paths = UnitPaths::new(work.path(), "39002087654321");
        let mut ledger = Ledger::open(&paths.metadata_dir()).unwrap();

        let err = copy_transfer(&unit, &paths, &mut ledger, StageGate::new(false)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngotError>(),
            Some(IngotError::AcquisitionFailed { .. })
        ));

        let event = ledger
            .events_of_kind(EventKind::Replication)
            .next()
            .unwrap();
        assert_ne!(event.outcome, 0);
        assert_eq!(event.outcome_note, "produced no output");
    }

    #[test]
    fn test_partial_output_is_not_redone() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(dir.path()).unwrap();
        ledger
            .append(ProvenanceEvent::failure(
                EventKind::Acquisition,
                "ddrescue -d -r3 /dev/sr0 a.img a.map",
                String::new(),
                32,
                "exit status 32",
                Agent::tool("ddrescue", "1.28"),
            ))
            .unwrap();
        let gate = StageGate::new(false);

        assert!(step_done(gate, &ledger, EventKind::Acquisition, true));
        assert!(!step_done(gate, &ledger, EventKind::Acquisition, false));
        assert!(!step_done(
            StageGate::new(true),
            &ledger,
            EventKind::Acquisition,
            true
        ));
    }

    #[tokio::test]
    async fn test_missing_rip_tool_is_terminal() {
        let work = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("disc"), "dev").unwrap();

        let unit = IngestUnit::bind(
            work.path(),
            "39002055555555",
            JobType::DvdVideo,
            &source.path().join("disc"),
            false,
        )
        .unwrap();
        let paths = UnitPaths::new(work.path(), "39002055555555");
        let mut ledger = Ledger::open(&paths.metadata_dir()).unwrap();

        let settings = Settings {
            tools: ToolCommands {
                dvd_rip: "ingot-test-no-such-ripper".to_owned(),
                ..ToolCommands::default()
            },
            ..Settings::default()
        };
        let runner = ToolRunner::new();

        let err = rip_dvd(
            &unit,
            &paths,
            &mut ledger,
            StageGate::new(false),
            &settings,
            &runner,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngotError>(),
            Some(IngotError::AcquisitionFailed { code: 127, .. })
        ));

        let event = ledger
            .events_of_kind(EventKind::Acquisition)
            .next()
            .unwrap();
        assert_eq!(event.outcome, 127);
        assert_eq!(event.agent.version, "unknown");
    }
}
