//! Replication strategy selection for disk images.
//!
//! After imaging, the detection tool's output tells us what filesystems the
//! carrier holds; this module turns that evidence into a deterministic
//! extraction plan (which tool, per partition, into which folder) and runs
//! the plan. Optical filesystems are copied wholesale, HFS-family volumes go
//! through the HFS extractor, and anything else recognizable goes through
//! the forensic recoverer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use regex::Regex;

use crate::config::ToolCommands;
use crate::runner::{ToolOutput, ToolRunner, render_command};

/// How one volume's content is pulled out of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Whole-volume archive extraction (iso9660/UDF).
    BulkCopy,
    /// HFS-family extraction.
    HfsExtract,
    /// Forensic recovery of allocated files.
    TskRecover,
    /// No recognizable filesystem; surfaced rather than silently dropped.
    Unsupported,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BulkCopy => "bulk-copy",
            Self::HfsExtract => "hfs-extract",
            Self::TskRecover => "tsk-recover",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filesystem seen in the detection evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeEvidence {
    /// Partition number as printed by the detection tool.
    pub slot: Option<u32>,

    /// Start of the partition in sectors.
    pub sector_offset: Option<u64>,

    /// Lowercased filesystem label(s); empty when nothing was recognized.
    pub label: String,
}

/// Everything the selector needs from the detection tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesystemEvidence {
    pub volumes: Vec<VolumeEvidence>,
}

/// One extraction to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeJob {
    pub slot: Option<u32>,
    pub sector_offset: Option<u64>,
    pub label: String,
    pub method: ExtractionMethod,
    pub output: PathBuf,
}

/// Deterministic extraction plan for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationPlan {
    pub volumes: Vec<VolumeJob>,
}

impl ReplicationPlan {
    /// Comma-joined distinct methods, for registry/report text.
    pub fn method_summary(&self) -> String {
        let mut methods: Vec<&str> = Vec::new();
        for job in &self.volumes {
            if !methods.contains(&job.method.as_str()) {
                methods.push(job.method.as_str());
            }
        }
        methods.join(", ")
    }

    pub fn is_unsupported(&self) -> bool {
        self.volumes
            .iter()
            .all(|job| job.method == ExtractionMethod::Unsupported)
    }
}

/// Extraction outcome for one volume of the plan.
#[derive(Debug)]
pub struct VolumeResult {
    pub job: VolumeJob,
    pub command: String,
    pub output: ToolOutput,
}

/// Parse detection-tool output into filesystem evidence.
///
/// The tool prints partition headers (`Partition 2: ... from 409663`) with
/// the recognized filesystems nested beneath (`HFS Plus file system`); a
/// partition-less carrier prints its filesystem at the top level. Hybrid
/// volumes carrying several filesystems keep all their labels.
pub fn parse_evidence(detection_output: &str) -> FilesystemEvidence {
    // Unwrap is fine: the pattern is a compile-time constant.
    #[expect(clippy::unwrap_used)]
    let partition_re = Regex::new(r"^Partition\s+(\d+):.*?\bfrom\s+(\d+)").unwrap();

    let mut evidence = FilesystemEvidence::default();
    let mut open_partition: Option<VolumeEvidence> = None;
    let mut whole_disc: Option<usize> = None;

    for raw_line in detection_output.lines() {
        let line = raw_line.trim();

        if let Some(captures) = partition_re.captures(line) {
            if let Some(partition) = open_partition.take() {
                evidence.volumes.push(partition);
            }
            open_partition = Some(VolumeEvidence {
                slot: captures.get(1).and_then(|m| m.as_str().parse().ok()),
                sector_offset: captures.get(2).and_then(|m| m.as_str().parse().ok()),
                label: String::new(),
            });
            continue;
        }

        if let Some((head, _)) = line.split_once(" file system") {
            let label = head.trim().to_lowercase();
            if label.is_empty() {
                continue;
            }
            match open_partition.as_mut() {
                Some(partition) if partition.label.is_empty() => partition.label = label,
                Some(partition) => {
                    partition.label.push_str(", ");
                    partition.label.push_str(&label);
                }
                // Top-level filesystems all describe the one whole-disc
                // volume (hybrid discs list several).
                None => match whole_disc {
                    Some(index) => {
                        let existing = &mut evidence.volumes[index].label;
                        existing.push_str(", ");
                        existing.push_str(&label);
                    }
                    None => {
                        whole_disc = Some(evidence.volumes.len());
                        evidence.volumes.push(VolumeEvidence {
                            slot: None,
                            sector_offset: None,
                            label,
                        });
                    }
                },
            }
        }
    }

    if let Some(partition) = open_partition.take() {
        evidence.volumes.push(partition);
    }

    evidence
}

/// Build the extraction plan for `evidence`, writing into `output_root`.
///
/// Pure and deterministic: the same evidence always yields the same plan.
/// One recognized volume extracts straight into the root; several get
/// `partition-1`, `partition-2`, ... subfolders in evidence order. Volumes
/// with no recognized filesystem are dropped when siblings were recognized;
/// if nothing at all was recognized the plan is a single unsupported volume,
/// so the condition is surfaced instead of silently producing nothing.
pub fn plan(evidence: &FilesystemEvidence, output_root: &Path) -> ReplicationPlan {
    let recognized: Vec<&VolumeEvidence> = evidence
        .volumes
        .iter()
        .filter(|volume| !volume.label.is_empty())
        .collect();

    if recognized.is_empty() {
        return ReplicationPlan {
            volumes: vec![VolumeJob {
                slot: None,
                sector_offset: None,
                label: String::new(),
                method: ExtractionMethod::Unsupported,
                output: output_root.to_path_buf(),
            }],
        };
    }

    let multiple = recognized.len() > 1;
    let volumes = recognized
        .iter()
        .enumerate()
        .map(|(index, volume)| VolumeJob {
            slot: volume.slot,
            sector_offset: volume.sector_offset,
            label: volume.label.clone(),
            method: method_for(&volume.label),
            output: if multiple {
                output_root.join(format!("partition-{}", index + 1))
            } else {
                output_root.to_path_buf()
            },
        })
        .collect();

    ReplicationPlan { volumes }
}

fn method_for(label: &str) -> ExtractionMethod {
    if label.contains("iso9660") || label.contains("udf") {
        ExtractionMethod::BulkCopy
    } else if label.contains("hfs") {
        ExtractionMethod::HfsExtract
    } else {
        ExtractionMethod::TskRecover
    }
}

/// Run every volume of the plan, returning per-volume results.
///
/// A failed volume is recorded and does not stop its siblings. Per-partition
/// output folders that end up empty are removed; the root output never is.
pub async fn execute(
    plan: &ReplicationPlan,
    image: &Path,
    output_root: &Path,
    runner: &ToolRunner,
    tools: &ToolCommands,
    limit: Duration,
) -> Result<Vec<VolumeResult>> {
    let mut results = Vec::with_capacity(plan.volumes.len());

    for job in &plan.volumes {
        if job.method == ExtractionMethod::Unsupported {
            results.push(VolumeResult {
                job: job.clone(),
                command: "(no extraction tool)".to_owned(),
                output: ToolOutput {
                    exit: 1,
                    stdout: String::new(),
                    stderr: "no recognizable filesystem in detection evidence".to_owned(),
                    duration: Duration::ZERO,
                },
            });
            continue;
        }

        std::fs::create_dir_all(&job.output).with_context(|| {
            format!("Failed to create extraction folder: {}", job.output.display())
        })?;

        let (program, args) = extraction_command(job, image, tools);
        let command = render_command(program, &args);
        tracing::info!("Extracting {} volume with: {command}", job.method);

        let output = runner.run(program, &args, limit).await;
        if !output.success() {
            tracing::warn!(
                "Extraction of {} volume failed ({})",
                job.method,
                output.outcome_note()
            );
        }

        results.push(VolumeResult {
            job: job.clone(),
            command,
            output,
        });
    }

    for job in &plan.volumes {
        if job.output != output_root && dir_is_empty(&job.output) {
            if let Err(e) = std::fs::remove_dir(&job.output) {
                tracing::warn!(
                    "Failed to remove empty folder {}: {e}",
                    job.output.display()
                );
            }
        }
    }

    Ok(results)
}

fn extraction_command<'a>(
    job: &VolumeJob,
    image: &Path,
    tools: &'a ToolCommands,
) -> (&'a str, Vec<String>) {
    match job.method {
        ExtractionMethod::BulkCopy => (
            tools.bulk_copy.as_str(),
            vec![
                "x".to_owned(),
                "-y".to_owned(),
                format!("-o{}", job.output.display()),
                image.display().to_string(),
            ],
        ),
        ExtractionMethod::HfsExtract => {
            let mut args = Vec::new();
            if let Some(slot) = job.slot {
                args.push("-partition".to_owned());
                args.push(slot.to_string());
            }
            args.push("-o".to_owned());
            args.push(job.output.display().to_string());
            args.push(image.display().to_string());
            (tools.hfs_extract.as_str(), args)
        }
        ExtractionMethod::TskRecover => {
            let mut args = vec!["-a".to_owned()];
            if let Some(offset) = job.sector_offset {
                args.push("-o".to_owned());
                args.push(offset.to_string());
            }
            args.push(image.display().to_string());
            args.push(job.output.display().to_string());
            (tools.recover.as_str(), args)
        }
        ExtractionMethod::Unsupported => unreachable!("handled before dispatch"),
    }
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
