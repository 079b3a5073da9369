//! Ingest pipeline orchestration.
//!
//! One unit moves through three phases: acquisition (content comes off the
//! carrier), characterization (the content is examined), and reporting (the
//! outcome lands in the registry and the interchange document). Which phases
//! actually run is decided from the state derived out of on-disk evidence,
//! so a crashed or re-invoked run resumes where the evidence says it
//! stopped. Marker files (`.lock`, `.complete`) are written for human
//! observers but never read back as truth.
//!
//! # Example
//!
//! ```no_run
//! use ingot::config::Settings;
//! use ingot::pipeline::{IngestPipeline, IngestRequest};
//! use ingot::unit::JobType;
//! use std::path::PathBuf;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let pipeline = IngestPipeline::new(Settings::default());
//! let summary = pipeline
//!     .run(&IngestRequest {
//!         barcode: "39002012345678".to_owned(),
//!         job_type: JobType::CopyOnly,
//!         source: PathBuf::from("/mnt/transfer"),
//!         rerun: false,
//!     })
//!     .await?;
//! println!("{}", summary.summary());
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod characterize;
pub mod state;

pub use state::UnitState;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context as _, Result};
use chrono::Utc;

use crate::config::Settings;
use crate::dedup;
use crate::error::IngotError;
use crate::gate::StageGate;
use crate::ledger::{Agent, EventKind, ItemDescriptor, Ledger, ProvenanceEvent, document};
use crate::registry::{IngestResults, Registry, RegistryRecord};
use crate::replicate;
use crate::report;
use crate::runner::ToolRunner;
use crate::unit::{IngestUnit, JobType, UnitPaths};

/// One operator request: which item, where its content comes from, and
/// whether completed work should be repeated.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub barcode: String,
    pub job_type: JobType,
    pub source: PathBuf,
    pub rerun: bool,
}

/// Report generated after a pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub barcode: String,

    /// State derived from the evidence after the run.
    pub state: UnitState,

    /// Phases this invocation actually executed.
    pub phases_run: Vec<&'static str>,

    /// Warnings generated during execution.
    pub warnings: Vec<String>,

    /// Time taken for execution.
    pub duration: std::time::Duration,
}

impl RunSummary {
    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Ingest {}: state {}, phases [{}], {} warning(s), {:.2}s",
            self.barcode,
            self.state,
            self.phases_run.join(", "),
            self.warnings.len(),
            self.duration.as_secs_f64()
        )
    }
}

/// Read-only snapshot of where a unit stands.
#[derive(Debug, Clone)]
pub struct UnitStatus {
    pub barcode: String,
    pub state: UnitState,

    /// An in-progress lock file is present.
    pub locked: bool,

    /// Total ledger events.
    pub events: usize,

    /// The registry row carries recorded results.
    pub has_results: bool,

    /// Event count per vocabulary kind, in vocabulary order.
    pub stages: Vec<(EventKind, usize)>,
}

/// Which phases an invocation asked for. `run` asks for all three.
#[derive(Debug, Clone, Copy)]
struct PhasePlan {
    acquire: bool,
    characterize: bool,
    report: bool,
}

#[derive(Default)]
struct PhaseTally {
    phases_run: Vec<&'static str>,
    warnings: Vec<String>,
}

/// Drives one unit through its phases.
pub struct IngestPipeline {
    settings: Settings,
    runner: ToolRunner,
}

impl IngestPipeline {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            runner: ToolRunner::new(),
        }
    }

    /// Full ingest: acquire, characterize, report.
    ///
    /// # Errors
    ///
    /// [`IngotError::UnknownBarcode`] when the registry has no row for the
    /// item, [`IngotError::InvalidInput`] for a malformed request,
    /// [`IngotError::AcquisitionFailed`] when the carrier yields nothing,
    /// [`IngotError::RegistryLocked`] when the outcome cannot be recorded.
    pub async fn run(&self, request: &IngestRequest) -> Result<RunSummary> {
        let unit = self.bind_unit(request)?;
        self.drive(
            unit,
            PhasePlan {
                acquire: true,
                characterize: true,
                report: true,
            },
        )
        .await
    }

    /// Acquisition only; later phases are left for separate invocations.
    ///
    /// # Errors
    ///
    /// As for [`IngestPipeline::run`], minus the reporting conditions.
    pub async fn acquire(&self, request: &IngestRequest) -> Result<RunSummary> {
        let unit = self.bind_unit(request)?;
        self.drive(
            unit,
            PhasePlan {
                acquire: true,
                characterize: false,
                report: false,
            },
        )
        .await
    }

    /// Characterization of an already-acquired unit.
    ///
    /// # Errors
    ///
    /// [`IngotError::InvalidInput`] when no unit exists or acquisition has
    /// not completed yet.
    pub async fn characterize(&self, barcode: &str, rerun: bool) -> Result<RunSummary> {
        let (unit, paths) = self.load_existing(barcode, rerun)?;
        let current = self.derived_state(&unit, &paths)?;
        if current < UnitState::Acquired {
            return Err(IngotError::InvalidInput(format!(
                "{barcode} has no completed acquisition to characterize (state: {current})"
            ))
            .into());
        }
        self.drive(
            unit,
            PhasePlan {
                acquire: false,
                characterize: true,
                report: false,
            },
        )
        .await
    }

    /// Reporting for an already-characterized unit.
    ///
    /// # Errors
    ///
    /// [`IngotError::InvalidInput`] when characterization has not completed,
    /// [`IngotError::RegistryLocked`] when the registry cannot be written.
    pub async fn report(&self, barcode: &str, rerun: bool) -> Result<RunSummary> {
        let (unit, paths) = self.load_existing(barcode, rerun)?;
        let current = self.derived_state(&unit, &paths)?;
        if current < UnitState::Characterized {
            return Err(IngotError::InvalidInput(format!(
                "{barcode} has not been characterized yet (state: {current})"
            ))
            .into());
        }
        self.drive(
            unit,
            PhasePlan {
                acquire: false,
                characterize: false,
                report: true,
            },
        )
        .await
    }

    /// Where a unit stands, from evidence alone. Never mutates anything.
    ///
    /// # Errors
    ///
    /// I/O errors reading the unit record or ledger.
    pub fn status(&self, barcode: &str) -> Result<UnitStatus> {
        let paths = UnitPaths::new(&self.settings.work_root, barcode);
        let has_results = self.results_recorded(barcode)?;

        if !paths.unit_file().exists() {
            return Ok(UnitStatus {
                barcode: barcode.to_owned(),
                state: UnitState::New,
                locked: paths.lock_file().exists(),
                events: 0,
                has_results,
                stages: Vec::new(),
            });
        }

        let unit = IngestUnit::load(&paths.unit_file())?;
        let ledger = Ledger::open(&paths.metadata_dir())?;
        let state = state::derive(&paths, unit.job_type, &ledger, has_results);
        let stages = EventKind::ALL
            .into_iter()
            .map(|kind| (kind, ledger.events_of_kind(kind).count()))
            .collect();

        Ok(UnitStatus {
            barcode: barcode.to_owned(),
            state,
            locked: paths.lock_file().exists(),
            events: ledger.len(),
            has_results,
            stages,
        })
    }

    /// Seed (or amend) a registry row so the barcode can be ingested.
    ///
    /// # Errors
    ///
    /// [`IngotError::RegistryLocked`] when the registry is being edited
    /// elsewhere.
    pub fn register(&self, barcode: &str, record: RegistryRecord) -> Result<()> {
        let mut registry = Registry::open(&self.settings.registry)?;
        registry.upsert(barcode, record);
        registry.save()?;
        tracing::info!(
            "Registered {barcode} in {}",
            self.settings.registry.display()
        );
        Ok(())
    }

    /// The registry row must exist before anything touches the disk.
    fn bind_unit(&self, request: &IngestRequest) -> Result<IngestUnit> {
        Registry::open(&self.settings.registry)?.lookup(&request.barcode)?;
        IngestUnit::bind(
            &self.settings.work_root,
            &request.barcode,
            request.job_type,
            &request.source,
            request.rerun,
        )
    }

    fn load_existing(&self, barcode: &str, rerun: bool) -> Result<(IngestUnit, UnitPaths)> {
        Registry::open(&self.settings.registry)?.lookup(barcode)?;

        let paths = UnitPaths::new(&self.settings.work_root, barcode);
        if !paths.unit_file().exists() {
            return Err(IngotError::InvalidInput(format!(
                "no ingest unit for {barcode} under {}; run acquisition first",
                self.settings.work_root.display()
            ))
            .into());
        }

        let mut unit = IngestUnit::load(&paths.unit_file())?;
        unit.rerun = rerun;
        Ok((unit, paths))
    }

    fn derived_state(&self, unit: &IngestUnit, paths: &UnitPaths) -> Result<UnitState> {
        let ledger = Ledger::open(&paths.metadata_dir())?;
        Ok(state::derive(
            paths,
            unit.job_type,
            &ledger,
            self.results_recorded(&unit.barcode)?,
        ))
    }

    fn results_recorded(&self, barcode: &str) -> Result<bool> {
        let registry = Registry::open(&self.settings.registry)?;
        Ok(registry
            .lookup(barcode)
            .is_ok_and(|record| record.results.is_some()))
    }

    async fn drive(&self, unit: IngestUnit, plan: PhasePlan) -> Result<RunSummary> {
        let start = Instant::now();
        let paths = UnitPaths::new(&self.settings.work_root, &unit.barcode);
        let mut ledger = Ledger::open(&paths.metadata_dir())?;
        let mut tally = PhaseTally::default();

        let entry = state::derive(
            &paths,
            unit.job_type,
            &ledger,
            self.results_recorded(&unit.barcode)?,
        );
        if entry == UnitState::Done && !unit.rerun {
            write_done_marker(&paths)?;
            tracing::info!(
                "{} is already done; pass the re-run flag to repeat it",
                unit.barcode
            );
            return Ok(RunSummary {
                barcode: unit.barcode,
                state: entry,
                phases_run: tally.phases_run,
                warnings: tally.warnings,
                duration: start.elapsed(),
            });
        }

        fs::write(paths.lock_file(), Utc::now().to_rfc3339())
            .with_context(|| format!("Failed to write lock: {}", paths.lock_file().display()))?;

        let outcome = self
            .phases(&unit, &paths, &mut ledger, plan, &mut tally)
            .await;

        if let Err(e) = fs::remove_file(paths.lock_file()) {
            tracing::warn!("Failed to remove lock {}: {e}", paths.lock_file().display());
        }
        outcome?;

        let state = state::derive(
            &paths,
            unit.job_type,
            &ledger,
            self.results_recorded(&unit.barcode)?,
        );
        if state == UnitState::Done {
            write_done_marker(&paths)?;
        }

        let summary = RunSummary {
            barcode: unit.barcode,
            state,
            phases_run: tally.phases_run,
            warnings: tally.warnings,
            duration: start.elapsed(),
        };
        tracing::info!("{}", summary.summary());
        Ok(summary)
    }

    async fn phases(
        &self,
        unit: &IngestUnit,
        paths: &UnitPaths,
        ledger: &mut Ledger,
        plan: PhasePlan,
        tally: &mut PhaseTally,
    ) -> Result<()> {
        let gate = StageGate::new(unit.rerun);
        let mut current = state::derive(
            paths,
            unit.job_type,
            ledger,
            self.results_recorded(&unit.barcode)?,
        );
        // A re-run repeats every requested phase regardless of evidence.
        if unit.rerun {
            current = UnitState::Loaded;
        }

        if plan.acquire && current < UnitState::Acquired {
            tracing::info!("Phase: acquire ({})", unit.job_type);
            acquire::run(unit, paths, ledger, gate, &self.settings, &self.runner).await?;
            if state::derive(paths, unit.job_type, ledger, false) < UnitState::Acquired {
                return Err(IngotError::AcquisitionFailed {
                    code: 1,
                    detail: "no usable output was produced".to_owned(),
                }
                .into());
            }
            tally.phases_run.push("acquire");
            current = UnitState::Acquired;
        } else if plan.acquire {
            tracing::info!("Acquisition already complete; skipping");
        }

        if plan.characterize && current < UnitState::Characterized {
            tracing::info!("Phase: characterize");
            characterize::run(
                unit,
                paths,
                ledger,
                gate,
                &self.settings,
                &self.runner,
                &mut tally.warnings,
            )
            .await?;
            tally.phases_run.push("characterize");
            current = UnitState::Characterized;
        } else if plan.characterize {
            tracing::info!("Characterization already complete; skipping");
        }

        if plan.report && current < UnitState::Done {
            tracing::info!("Phase: report");
            self.report_phase(unit, paths, ledger, &mut tally.warnings)?;
            tally.phases_run.push("report");
        } else if plan.report {
            tracing::info!("Reporting already complete; skipping");
        }

        Ok(())
    }

    /// Reporting: reconcile the ledger, write the outcome to the registry,
    /// and re-export the interchange document so it carries the registry
    /// event too.
    fn report_phase(
        &self,
        unit: &IngestUnit,
        paths: &UnitPaths,
        ledger: &mut Ledger,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        ledger
            .reconcile()
            .context("Failed to reconcile ledger with exported document")?;

        let mut registry = Registry::open(&self.settings.registry)?;
        if registry.is_locked() {
            return Err(IngotError::RegistryLocked(self.settings.registry.clone()).into());
        }

        let results = collect_results(unit, paths, ledger, warnings)?;
        registry.record_results(&unit.barcode, results)?;
        registry.save()?;

        ledger.append(ProvenanceEvent::success(
            EventKind::MetadataModification,
            format!("registry update {}", self.settings.registry.display()),
            format!("Ingest results recorded for {}", unit.barcode),
            Agent::internal(),
        ))?;

        document::export(
            ledger.document_path(),
            describe(unit),
            &self.settings.organization,
            ledger.events(),
        )
        .context("Failed to export provenance document")?;
        Ok(())
    }
}

/// Item descriptor for the interchange document.
pub(crate) fn describe(unit: &IngestUnit) -> ItemDescriptor {
    ItemDescriptor {
        barcode: unit.barcode.clone(),
        job_type: unit.job_type.to_string(),
        source: unit.source.display().to_string(),
    }
}

fn write_done_marker(paths: &UnitPaths) -> Result<()> {
    if paths.done_marker().exists() {
        return Ok(());
    }
    fs::write(paths.done_marker(), Utc::now().to_rfc3339()).with_context(|| {
        format!(
            "Failed to write completion marker: {}",
            paths.done_marker().display()
        )
    })
}

/// Summarize the run for the registry row.
fn collect_results(
    unit: &IngestUnit,
    paths: &UnitPaths,
    ledger: &Ledger,
    warnings: &mut Vec<String>,
) -> Result<IngestResults> {
    let (fingerprints, _) = characterize::load_fingerprints(unit, paths)?;
    let stats = dedup::analyze(&fingerprints, unit.created_at);
    let format_count = match report::format_counts(&paths.formats_file()) {
        Ok(formats) => formats.len(),
        Err(e) => {
            warnings.push(format!("format listing unusable: {e:#}"));
            0
        }
    };

    // Worst case first: the earliest nonzero capture/extraction exit.
    let outcome = ledger
        .events()
        .iter()
        .filter(|event| {
            matches!(
                event.kind,
                EventKind::Acquisition | EventKind::Replication
            )
        })
        .map(|event| event.outcome)
        .find(|&code| code != 0)
        .unwrap_or(0);

    Ok(IngestResults {
        job_type: unit.job_type.to_string(),
        method: method_text(unit, paths),
        outcome,
        total_files: stats.total_files,
        distinct_files: stats.distinct_files,
        duplicate_copies: stats.duplicate_copies,
        empty_files: stats.empty_files,
        format_count,
        total_bytes: stats.total_bytes,
        date_range: report::date_range_text(&stats),
        report: paths.report_file(),
        completed_utc: Utc::now(),
    })
}

fn method_text(unit: &IngestUnit, paths: &UnitPaths) -> String {
    match unit.job_type {
        JobType::CopyOnly => "direct copy".to_owned(),
        JobType::DvdVideo => "video rip".to_owned(),
        JobType::AudioCd => "audio rip".to_owned(),
        JobType::DiskImage => match fs::read_to_string(paths.detection_file()) {
            Ok(text) => {
                let evidence = replicate::parse_evidence(&text);
                let plan = replicate::plan(&evidence, &paths.objects_dir());
                format!("imaged; {}", plan.method_summary())
            }
            Err(_) => "imaged".to_owned(),
        },
    }
}
