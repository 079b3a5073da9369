//! Append-only event ledger.
//!
//! The working record is a JSON-lines file (`ledger.jsonl`) under the item's
//! metadata folder: one event per line, appended and flushed as actions
//! complete so a crash loses at most the action in flight. The exported
//! interchange document can drift from the working file when an operator
//! hand-carries it between machines, so the store reconciles the two by
//! structural union before accepting new appends.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use super::document;
use super::event::{EventKind, ProvenanceEvent};

/// File name of the working event log inside a metadata folder.
pub const LEDGER_FILE: &str = "ledger.jsonl";

/// In-memory view of one item's event history, backed by `ledger.jsonl`.
#[derive(Debug)]
pub struct Ledger {
    ledger_path: PathBuf,
    document_path: PathBuf,
    events: Vec<ProvenanceEvent>,
    reconciled: bool,
}

impl Ledger {
    /// Open (or start) the ledger stored under `metadata_dir`.
    ///
    /// Unparseable lines are skipped with a warning rather than failing the
    /// load; the remaining history is still usable and the bad line stays in
    /// the file for manual inspection.
    pub fn open(metadata_dir: &Path) -> Result<Self> {
        fs::create_dir_all(metadata_dir).with_context(|| {
            format!("Failed to create metadata folder: {}", metadata_dir.display())
        })?;

        let ledger_path = metadata_dir.join(LEDGER_FILE);
        let document_path = metadata_dir.join(document::DOCUMENT_FILE);

        let mut events = Vec::new();
        if ledger_path.exists() {
            let raw = fs::read_to_string(&ledger_path)
                .with_context(|| format!("Failed to read ledger: {}", ledger_path.display()))?;

            for (index, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ProvenanceEvent>(line) {
                    Ok(event) => events.push(event),
                    Err(e) => tracing::warn!(
                        "Skipping unparseable ledger line {} in {}: {e}",
                        index + 1,
                        ledger_path.display()
                    ),
                }
            }
        }

        events.sort_by_key(|event| event.timestamp);

        Ok(Self {
            ledger_path,
            document_path,
            events,
            reconciled: false,
        })
    }

    /// All events, oldest first.
    pub fn events(&self) -> &[ProvenanceEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Events of one kind, oldest first.
    pub fn events_of_kind(&self, kind: EventKind) -> impl Iterator<Item = &ProvenanceEvent> {
        self.events.iter().filter(move |event| event.kind == kind)
    }

    /// Record a new event: reconcile if needed, keep it in memory, and append
    /// one flushed line to the working file.
    pub fn append(&mut self, event: ProvenanceEvent) -> Result<()> {
        if !self.reconciled && self.document_path.exists() {
            self.reconcile()?;
        }

        self.append_line(&event)?;
        self.events.push(event);
        self.events.sort_by_key(|e| e.timestamp);
        Ok(())
    }

    /// Merge events found only in the exported document back into the working
    /// file, so a hand-edited or hand-carried document is never silently
    /// overwritten on the next export.
    ///
    /// Union is by structural equality over whole events. A document that
    /// fails to parse is left in place and treated as empty.
    pub fn reconcile(&mut self) -> Result<()> {
        if self.reconciled {
            return Ok(());
        }

        if self.document_path.exists() {
            let document_events = match document::read_events(&self.document_path) {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(
                        "Ignoring unparseable provenance document {}: {e:#}",
                        self.document_path.display()
                    );
                    Vec::new()
                }
            };

            let mut merged = 0usize;
            for event in document_events {
                if !self.events.contains(&event) {
                    self.append_line(&event)?;
                    self.events.push(event);
                    merged += 1;
                }
            }

            if merged > 0 {
                tracing::info!(
                    "Reconciled {merged} event(s) from {} into the working ledger",
                    self.document_path.display()
                );
                self.events.sort_by_key(|e| e.timestamp);
            }
        }

        self.reconciled = true;
        Ok(())
    }

    /// Path of the exported interchange document for this item.
    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    fn append_line(&self, event: &ProvenanceEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("Failed to serialise event")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.ledger_path)
            .with_context(|| format!("Failed to open ledger: {}", self.ledger_path.display()))?;

        writeln!(file, "{line}")
            .with_context(|| format!("Failed to append to ledger: {}", self.ledger_path.display()))?;
        file.flush()?;
        file.sync_all()
            .with_context(|| format!("Failed to sync ledger: {}", self.ledger_path.display()))?;
        Ok(())
    }
}
