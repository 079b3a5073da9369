//! # Ingot - Ingest Pipeline & Provenance Ledger
//!
//! Ingot moves born-digital media (optical discs, floppies, loose drives,
//! directory transfers) through an idempotent ingest pipeline while keeping
//! an append-only ledger of everything that happened to the content.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ingot::config::Settings;
//! use ingot::pipeline::{IngestPipeline, IngestRequest};
//! use ingot::unit::JobType;
//! use std::path::PathBuf;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pipeline = IngestPipeline::new(Settings::default());
//! let summary = pipeline
//!     .run(&IngestRequest {
//!         barcode: "39002012345678".to_owned(),
//!         job_type: JobType::DiskImage,
//!         source: PathBuf::from("/dev/sr0"),
//!         rerun: false,
//!     })
//!     .await?;
//! println!("{}", summary.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`pipeline`]: phase orchestration and the evidence-derived state machine
//! - [`ledger`]: append-only provenance events, reconciliation, and the
//!   interchange document
//! - [`fingerprint`]: crash-resumable SHA-256 fingerprinting of the output
//! - [`dedup`]: duplication and dating statistics over the fingerprints
//! - [`replicate`]: filesystem detection evidence and extraction planning
//! - [`registry`]: the collection-management item registry
//! - [`report`]: the human-readable ingest report
//!
//! ## Key Concepts
//!
//! ### Evidence over memory
//!
//! The pipeline never trusts a stored "state" field. Where a unit stands is
//! re-derived on every invocation from what is actually on disk (content,
//! ledger events, registry results), so a crashed run resumes correctly and
//! a hand-edited working folder is handled the same as a crashed one.
//!
//! ### Append-only provenance
//!
//! Every action that touches content appends a [`ledger::ProvenanceEvent`]
//! to a JSONL ledger, one line per event, flushed before the action is
//! considered done. The exported interchange document is a *view* of the
//! ledger; reconciliation merges the two when they diverge.

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod dedup;
pub mod error;
pub mod fingerprint;
pub mod gate;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod replicate;
pub mod report;
pub mod runner;
pub mod unit;
