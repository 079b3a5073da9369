//! Exported provenance interchange document.
//!
//! `provenance.json` is the hand-off form of the ledger: a self-describing
//! JSON document other systems (and humans) read. It is re-exported wholesale
//! on every successful reporting pass and replaced atomically, so a reader
//! never observes a partial write.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::ProvenanceEvent;

/// File name of the interchange document inside a metadata folder.
pub const DOCUMENT_FILE: &str = "provenance.json";

/// Bumped when the document layout changes shape.
pub const DOCUMENT_VERSION: u32 = 1;

/// The application that wrote the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
}

impl ProducerInfo {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            platform: std::env::consts::OS.to_owned(),
        }
    }
}

/// Identity of the item the events describe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Collection-management barcode.
    pub barcode: String,

    /// Job type in wire form (`disk-image`, `copy-only`, ...).
    pub job_type: String,

    /// The source path the content was taken from.
    pub source: String,
}

/// One event as it appears in the document: the event itself plus the second,
/// fixed agent reference naming the executing organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEvent {
    #[serde(flatten)]
    pub event: ProvenanceEvent,

    /// The organization on whose behalf the action was taken.
    pub organization: String,
}

/// Complete interchange document for one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceDocument {
    pub document_version: u32,
    pub created_utc: DateTime<Utc>,
    pub producer: ProducerInfo,
    pub item: ItemDescriptor,
    pub organization: String,
    pub events: Vec<DocumentEvent>,
}

/// Serialise the full event history as the interchange document, atomically
/// replacing any prior version at `path`.
pub fn export(
    path: &Path,
    item: ItemDescriptor,
    organization: &str,
    events: &[ProvenanceEvent],
) -> Result<()> {
    let document = ProvenanceDocument {
        document_version: DOCUMENT_VERSION,
        created_utc: Utc::now(),
        producer: ProducerInfo::current(),
        item,
        organization: organization.to_owned(),
        events: events
            .iter()
            .map(|event| DocumentEvent {
                event: event.clone(),
                organization: organization.to_owned(),
            })
            .collect(),
    };

    let json =
        serde_json::to_string_pretty(&document).context("Failed to serialise provenance document")?;

    // Write-then-rename so a crash mid-write never leaves a truncated document.
    let temp_path = path.with_extension("json.tmp");
    {
        let mut file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync temp file: {}", temp_path.display()))?;
    }
    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to move provenance document into place: {}",
            path.display()
        )
    })?;

    Ok(())
}

/// Load the document at `path` and return its events, stripped of the
/// per-event organization wrapper.
pub fn read_events(path: &Path) -> Result<Vec<ProvenanceEvent>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read provenance document: {}", path.display()))?;
    let document: ProvenanceDocument = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse provenance document: {}", path.display()))?;

    Ok(document.events.into_iter().map(|entry| entry.event).collect())
}

/// Load the full document at `path`.
pub fn read_document(path: &Path) -> Result<ProvenanceDocument> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read provenance document: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse provenance document: {}", path.display()))
}
