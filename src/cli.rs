use anyhow::Result;
use clap::{Parser, Subcommand};
use ingot::config::{self, Settings};
use ingot::pipeline::{IngestPipeline, IngestRequest, RunSummary};
use ingot::registry::RegistryRecord;
use ingot::unit::JobType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ingot",
    about = "Ingest pipeline and provenance ledger for born-digital media"
)]
pub struct Cli {
    /// Override the working-folder root from the settings file
    #[arg(long, global = true)]
    pub work_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full ingest for one item: acquire, characterize, report
    Run {
        /// Collection-management barcode of the item
        barcode: String,

        /// How the carrier's content is acquired
        #[arg(short, long, value_enum)]
        job_type: JobType,

        /// Device node, image file, or directory the content comes from
        #[arg(short, long)]
        source: PathBuf,

        /// Repeat stages that already completed
        #[arg(long)]
        rerun: bool,
    },
    /// Acquire content from the carrier without going further
    Acquire {
        /// Collection-management barcode of the item
        barcode: String,

        /// How the carrier's content is acquired
        #[arg(short, long, value_enum)]
        job_type: JobType,

        /// Device node, image file, or directory the content comes from
        #[arg(short, long)]
        source: PathBuf,

        /// Repeat stages that already completed
        #[arg(long)]
        rerun: bool,
    },
    /// Characterize an already-acquired item
    Characterize {
        /// Collection-management barcode of the item
        barcode: String,

        /// Repeat stages that already completed
        #[arg(long)]
        rerun: bool,
    },
    /// Record the outcome in the registry and export the provenance document
    Report {
        /// Collection-management barcode of the item
        barcode: String,

        /// Repeat the reporting step even though it already completed
        #[arg(long)]
        rerun: bool,
    },
    /// Show where an item stands, from on-disk evidence alone
    Status {
        /// Collection-management barcode of the item
        barcode: String,
    },
    /// Seed or amend the registry row for an item
    Register {
        /// Collection-management barcode of the item
        barcode: String,

        /// Shipment or accession batch the item arrived with
        #[arg(long, default_value = "")]
        shipment: String,

        /// Descriptive title
        #[arg(long, default_value = "")]
        title: String,

        /// Free-form operator notes
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Write a settings file with the default values for editing
    Config {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run_command(command: Commands, work_root: Option<PathBuf>) -> Result<()> {
    let mut settings = config::load_settings();
    if let Some(root) = work_root {
        settings.work_root = root;
    }

    match command {
        Commands::Run {
            barcode,
            job_type,
            source,
            rerun,
        } => {
            handle_ingest(
                settings,
                &IngestRequest {
                    barcode,
                    job_type,
                    source,
                    rerun,
                },
                false,
            )
            .await
        }
        Commands::Acquire {
            barcode,
            job_type,
            source,
            rerun,
        } => {
            handle_ingest(
                settings,
                &IngestRequest {
                    barcode,
                    job_type,
                    source,
                    rerun,
                },
                true,
            )
            .await
        }
        Commands::Characterize { barcode, rerun } => {
            let summary = IngestPipeline::new(settings)
                .characterize(&barcode, rerun)
                .await?;
            print_summary(&summary);
            Ok(())
        }
        Commands::Report { barcode, rerun } => {
            let summary = IngestPipeline::new(settings).report(&barcode, rerun).await?;
            print_summary(&summary);
            Ok(())
        }
        Commands::Status { barcode } => handle_status(settings, &barcode),
        Commands::Register {
            barcode,
            shipment,
            title,
            notes,
        } => handle_register(settings, &barcode, shipment, title, notes),
        Commands::Config { force } => handle_config(force),
    }
}

async fn handle_ingest(
    settings: Settings,
    request: &IngestRequest,
    acquire_only: bool,
) -> Result<()> {
    let pipeline = IngestPipeline::new(settings);
    let summary = if acquire_only {
        pipeline.acquire(request).await?
    } else {
        pipeline.run(request).await?
    };
    print_summary(&summary);
    Ok(())
}

fn handle_status(settings: Settings, barcode: &str) -> Result<()> {
    let status = IngestPipeline::new(settings).status(barcode)?;

    println!("{}: {}", status.barcode, status.state);
    if status.state.is_terminal() {
        println!("  nothing further to run");
    } else if let Some(next) = status.state.next_state() {
        println!("  next: {next}");
    }
    if status.locked {
        println!("  a run is in progress (or crashed and left its lock)");
    }
    println!("  ledger events: {}", status.events);
    println!(
        "  registry results: {}",
        if status.has_results {
            "recorded"
        } else {
            "not recorded"
        }
    );
    for (kind, count) in &status.stages {
        if *count > 0 {
            println!("  {kind}: {count} event(s)");
        }
    }
    Ok(())
}

fn handle_register(
    settings: Settings,
    barcode: &str,
    shipment: String,
    title: String,
    notes: String,
) -> Result<()> {
    IngestPipeline::new(settings).register(
        barcode,
        RegistryRecord {
            shipment,
            title,
            notes,
            results: None,
        },
    )?;
    println!("Registered {barcode}.");
    Ok(())
}

fn handle_config(force: bool) -> Result<()> {
    let path = config::settings_path();
    if path.exists() && !force {
        println!(
            "Settings already exist at {}; pass --force to overwrite.",
            path.display()
        );
        return Ok(());
    }
    config::save_settings(&Settings::default())?;
    println!("Wrote default settings to {}.", path.display());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("{}", summary.summary());
    for warning in &summary.warnings {
        println!("  warning: {warning}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::parse_from([
            "ingot",
            "run",
            "39002012345678",
            "--job-type",
            "disk-image",
            "--source",
            "/dev/sr0",
            "--rerun",
        ]);
        let Commands::Run {
            barcode,
            job_type,
            source,
            rerun,
        } = cli.command
        else {
            panic!("expected the run subcommand");
        };
        assert_eq!(barcode, "39002012345678");
        assert_eq!(job_type, JobType::DiskImage);
        assert_eq!(source, PathBuf::from("/dev/sr0"));
        assert!(rerun);
    }

    #[test]
    fn test_work_root_is_global() {
        let cli = Cli::parse_from([
            "ingot",
            "status",
            "39002012345678",
            "--work-root",
            "/tmp/units",
        ]);
        assert_eq!(cli.work_root, Some(PathBuf::from("/tmp/units")));
    }
}
