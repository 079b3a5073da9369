//! Characterization phase: ordered stages over the acquired content.
//!
//! Every stage with a ledger kind is gated, so a resumed pass only runs what
//! is missing. Stage failures are soft (recorded, pipeline continues) except
//! fingerprinting, whose absence makes statistics impossible. The provenance
//! document is re-exported wholesale at the end of each successful pass.

use std::fs;

use anyhow::{Context as _, Result};

use crate::config::Settings;
use crate::dedup;
use crate::error::IngotError;
use crate::fingerprint::{self, FileFingerprint};
use crate::gate::StageGate;
use crate::ledger::{Agent, EventKind, Ledger, ProvenanceEvent, document};
use crate::report;
use crate::runner::{ToolRunner, render_command};
use crate::unit::{IngestUnit, JobType, UnitPaths};

/// Run the characterization stages in order.
///
/// # Errors
///
/// [`IngotError::MissingFingerprints`] when fingerprint collection failed
/// and statistics cannot be produced; I/O errors writing stage output or
/// appending to the ledger. Tool failures are not errors here, they become
/// recorded events and warnings.
pub async fn run(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
    warnings: &mut Vec<String>,
) -> Result<()> {
    scan_malware(paths, ledger, gate, settings, runner, warnings).await?;
    let fingerprints = collect_fingerprints(unit, paths, ledger, gate, warnings)?;
    document_tree(paths, ledger, gate, settings, runner, warnings).await?;
    scan_sensitive(unit, paths, ledger, gate, settings, runner, warnings).await?;
    identify_formats(paths, ledger, gate, settings, runner, warnings).await?;
    generate_statistics(unit, paths, fingerprints.as_deref(), warnings)?;

    document::export(
        ledger.document_path(),
        super::describe(unit),
        &settings.organization,
        ledger.events(),
    )
    .context("Failed to export provenance document")?;
    Ok(())
}

/// Load fingerprints for the unit without touching the ledger.
///
/// Disk-image jobs prefer the forensic listing (digests come from the
/// listing itself); anything else walks the extracted objects with the
/// crash-resumable checkpoint. Returns the fingerprints and a short
/// description of where they came from.
///
/// # Errors
///
/// I/O errors walking or hashing the designated output.
pub fn load_fingerprints(
    unit: &IngestUnit,
    paths: &UnitPaths,
) -> Result<(Vec<FileFingerprint>, String)> {
    if unit.job_type == JobType::DiskImage {
        match fingerprint::from_listing(&paths.listing_file()) {
            Ok(list) if !list.is_empty() => {
                return Ok((
                    list,
                    format!("digests from {}", paths.listing_file().display()),
                ));
            }
            Ok(_) => {
                tracing::warn!("Forensic listing held no usable entries; walking objects instead");
            }
            Err(e) => {
                tracing::warn!("Forensic listing unusable ({e:#}); walking objects instead");
            }
        }
    }

    let list = fingerprint::collect(&paths.objects_dir(), &paths.checkpoint_file())?;
    Ok((
        list,
        format!("sha256 {}", paths.objects_dir().display()),
    ))
}

fn collect_fingerprints(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    warnings: &mut Vec<String>,
) -> Result<Option<Vec<FileFingerprint>>> {
    // An explicit re-run is the only thing that clears the checkpoint.
    if unit.rerun && paths.checkpoint_file().exists() {
        fs::remove_file(paths.checkpoint_file()).with_context(|| {
            format!(
                "Failed to clear checkpoint: {}",
                paths.checkpoint_file().display()
            )
        })?;
    }

    let done = gate.is_done(ledger, EventKind::MessageDigestCalculation);
    match load_fingerprints(unit, paths) {
        Ok((list, source)) => {
            if !done {
                ledger.append(ProvenanceEvent::success(
                    EventKind::MessageDigestCalculation,
                    source,
                    format!("Calculated digests for {} files", list.len()),
                    Agent::internal(),
                ))?;
            }
            Ok(Some(list))
        }
        Err(e) => {
            warnings.push(format!("fingerprint collection failed: {e:#}"));
            if !done {
                ledger.append(ProvenanceEvent::failure(
                    EventKind::MessageDigestCalculation,
                    format!("sha256 {}", paths.objects_dir().display()),
                    format!("{e:#}"),
                    1,
                    "failed",
                    Agent::internal(),
                ))?;
            }
            Ok(None)
        }
    }
}

async fn scan_malware(
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
    warnings: &mut Vec<String>,
) -> Result<()> {
    if gate.is_done(ledger, EventKind::MalwareScan) {
        tracing::info!("Malware scan already attempted; skipping");
        return Ok(());
    }

    let tools = &settings.tools;
    let args = vec!["-r".to_owned(), paths.objects_dir().display().to_string()];
    let version = runner.version(&tools.malware_scan).await;
    let output = runner
        .run(&tools.malware_scan, &args, settings.long_tool_timeout())
        .await;

    fs::write(paths.virus_scan_log(), &output.stdout).with_context(|| {
        format!(
            "Failed to write scan log: {}",
            paths.virus_scan_log().display()
        )
    })?;

    // Scanner convention: 0 clean, 1 findings, anything else is an error.
    if output.exit == 1 {
        warnings.push(format!(
            "malware scanner reported findings; see {}",
            paths.virus_scan_log().display()
        ));
    } else if !output.success() {
        warnings.push(format!("malware scan failed: {}", output.outcome_note()));
    }

    ledger.append(ProvenanceEvent::new(
        EventKind::MalwareScan,
        render_command(&tools.malware_scan, &args),
        format!("Scan log written to {}", paths.virus_scan_log().display()),
        output.exit,
        output.outcome_note(),
        Agent::tool(&tools.malware_scan, version),
    ))?;
    Ok(())
}

async fn document_tree(
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let tools = &settings.tools;
    let version = runner.version(&tools.doc_tree).await;
    if gate.is_documented(ledger, &version) {
        tracing::info!("Directory structure already documented by this tool version; skipping");
        return Ok(());
    }

    let args = vec!["-a".to_owned(), paths.objects_dir().display().to_string()];
    let output = runner
        .run(&tools.doc_tree, &args, settings.tool_timeout())
        .await;

    if output.success() {
        fs::write(paths.tree_file(), &output.stdout).with_context(|| {
            format!("Failed to write tree file: {}", paths.tree_file().display())
        })?;
    } else {
        warnings.push(format!(
            "directory documentation failed: {}",
            output.outcome_note()
        ));
    }

    ledger.append(ProvenanceEvent::new(
        EventKind::MetadataExtraction,
        render_command(&tools.doc_tree, &args),
        format!("Directory tree written to {}", paths.tree_file().display()),
        output.exit,
        output.outcome_note(),
        Agent::tool(&tools.doc_tree, version),
    ))?;
    Ok(())
}

async fn scan_sensitive(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
    warnings: &mut Vec<String>,
) -> Result<()> {
    if gate.is_done(ledger, EventKind::SensitiveDataScan) {
        tracing::info!("Sensitive data scan already done; skipping");
        return Ok(());
    }

    // Audio and video rips hold no operator files; the skip is a recorded
    // decision, not a silent omission.
    if unit.job_type.skips_sensitive_scan() {
        ledger.append(ProvenanceEvent::success(
            EventKind::SensitiveDataScan,
            "(skipped)",
            format!(
                "Sensitive data scan not applicable to {} jobs",
                unit.job_type
            ),
            Agent::internal(),
        ))?;
        return Ok(());
    }

    let out_dir = paths.sensitive_dir();
    // The scanner insists on creating its output folder itself.
    if out_dir.exists() {
        fs::remove_dir_all(&out_dir).with_context(|| {
            format!("Failed to clear stale scan output: {}", out_dir.display())
        })?;
    }

    let tools = &settings.tools;
    let args = vec![
        "-o".to_owned(),
        out_dir.display().to_string(),
        "-R".to_owned(),
        paths.objects_dir().display().to_string(),
    ];
    let version = runner.version(&tools.sensitive_scan).await;
    let output = runner
        .run(&tools.sensitive_scan, &args, settings.long_tool_timeout())
        .await;

    if !output.success() {
        warnings.push(format!(
            "sensitive data scan failed: {}",
            output.outcome_note()
        ));
    }

    ledger.append(ProvenanceEvent::new(
        EventKind::SensitiveDataScan,
        render_command(&tools.sensitive_scan, &args),
        format!("Scan features written to {}", out_dir.display()),
        output.exit,
        output.outcome_note(),
        Agent::tool(&tools.sensitive_scan, version),
    ))?;
    Ok(())
}

async fn identify_formats(
    paths: &UnitPaths,
    ledger: &mut Ledger,
    gate: StageGate,
    settings: &Settings,
    runner: &ToolRunner,
    warnings: &mut Vec<String>,
) -> Result<()> {
    if gate.is_done(ledger, EventKind::FormatIdentification) {
        tracing::info!("Formats already identified; skipping");
        return Ok(());
    }

    let tools = &settings.tools;
    let args = vec!["-csv".to_owned(), paths.objects_dir().display().to_string()];
    let version = runner.version(&tools.format_id).await;
    let output = runner
        .run(&tools.format_id, &args, settings.tool_timeout())
        .await;

    if output.success() {
        fs::write(paths.formats_file(), &output.stdout).with_context(|| {
            format!(
                "Failed to write format listing: {}",
                paths.formats_file().display()
            )
        })?;
    } else {
        warnings.push(format!(
            "format identification failed: {}",
            output.outcome_note()
        ));
    }

    ledger.append(ProvenanceEvent::new(
        EventKind::FormatIdentification,
        render_command(&tools.format_id, &args),
        format!(
            "Format listing written to {}",
            paths.formats_file().display()
        ),
        output.exit,
        output.outcome_note(),
        Agent::tool(&tools.format_id, version),
    ))?;
    Ok(())
}

/// Derived data: dedup statistics and the human report. Recomputed on every
/// pass, no ledger kind.
fn generate_statistics(
    unit: &IngestUnit,
    paths: &UnitPaths,
    fingerprints: Option<&[FileFingerprint]>,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let Some(fingerprints) = fingerprints else {
        return Err(IngotError::MissingFingerprints(unit.barcode.clone()).into());
    };

    let stats = dedup::analyze(fingerprints, unit.created_at);
    let groups = dedup::duplicate_groups(fingerprints);
    let formats = match report::format_counts(&paths.formats_file()) {
        Ok(formats) => formats,
        Err(e) => {
            warnings.push(format!("format listing unusable: {e:#}"));
            Vec::new()
        }
    };

    let text = report::render(unit, &stats, &groups, &formats)?;
    fs::write(paths.report_file(), &text).with_context(|| {
        format!("Failed to write report: {}", paths.report_file().display())
    })?;
    tracing::info!("Report written to {}", paths.report_file().display());
    Ok(())
}
