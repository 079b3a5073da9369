//! Provenance event records.
//!
//! Every action taken against an item (imaging a disk, scanning for malware,
//! renaming a problematic file) becomes one immutable [`ProvenanceEvent`].
//! Events are never edited or removed once appended; corrections are expressed
//! as additional events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed vocabulary of actions the ledger records.
///
/// The wire form is kebab-case (`message-digest-calculation`, `malware-scan`)
/// to match the interchange document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Content captured from the physical carrier (imaging, disc rip).
    Acquisition,
    /// Content copied or extracted into the designated output.
    Replication,
    /// Forensic examination of a carrier or image (detection, file listing).
    ForensicAnalysis,
    /// Checksums computed over the designated output.
    MessageDigestCalculation,
    /// Directory-structure documentation; doneness is tool-version gated.
    MetadataExtraction,
    /// Virus/malware scan; an attempt counts as done regardless of outcome.
    MalwareScan,
    /// Scan for personally identifiable or otherwise sensitive content.
    SensitiveDataScan,
    /// File format identification over the designated output.
    FormatIdentification,
    /// Content normalised to a preservation-friendly encoding.
    Normalization,
    /// Descriptive metadata changed outside the content itself.
    MetadataModification,
    /// A file renamed during transfer (problematic characters).
    FilenameChange,
}

impl EventKind {
    /// Every kind, in vocabulary order. Used for status displays.
    pub const ALL: [Self; 11] = [
        Self::Acquisition,
        Self::Replication,
        Self::ForensicAnalysis,
        Self::MessageDigestCalculation,
        Self::MetadataExtraction,
        Self::MalwareScan,
        Self::SensitiveDataScan,
        Self::FormatIdentification,
        Self::Normalization,
        Self::MetadataModification,
        Self::FilenameChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquisition => "acquisition",
            Self::Replication => "replication",
            Self::ForensicAnalysis => "forensic-analysis",
            Self::MessageDigestCalculation => "message-digest-calculation",
            Self::MetadataExtraction => "metadata-extraction",
            Self::MalwareScan => "malware-scan",
            Self::SensitiveDataScan => "sensitive-data-scan",
            Self::FormatIdentification => "format-identification",
            Self::Normalization => "normalization",
            Self::MetadataModification => "metadata-modification",
            Self::FilenameChange => "filename-change",
        }
    }

}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The software (or routine) that performed an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Agent {
    /// Tool or program name (e.g. `ddrescue`, `clamscan`).
    pub name: String,

    /// Version string as reported by the tool, or `"unknown"`.
    pub version: String,
}

impl Agent {
    pub fn tool(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Agent for work this crate performs itself (copying, hashing).
    pub fn internal() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// One immutable record of an action taken on an item.
///
/// Structural equality covers every field including `id`, so re-reading the
/// same serialised event dedupes exactly while two distinct events that happen
/// to share a payload remain distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvenanceEvent {
    /// Unique per event; part of structural identity.
    pub id: Uuid,

    /// What class of action this was.
    pub kind: EventKind,

    /// When the action completed (UTC).
    pub timestamp: DateTime<Utc>,

    /// Process exit status; `0` is success by convention.
    pub outcome: i64,

    /// Short qualifier for the outcome ("completed", "timed out", ...).
    pub outcome_note: String,

    /// The command line (or internal routine) that produced the event.
    pub command: String,

    /// Free-text detail: counts, paths, versions.
    pub note: String,

    /// The software that acted.
    pub agent: Agent,
}

impl ProvenanceEvent {
    pub fn new(
        kind: EventKind,
        command: impl Into<String>,
        note: impl Into<String>,
        outcome: i64,
        outcome_note: impl Into<String>,
        agent: Agent,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            outcome,
            outcome_note: outcome_note.into(),
            command: command.into(),
            note: note.into(),
            agent,
        }
    }

    /// Convenience constructor for a successful action.
    pub fn success(
        kind: EventKind,
        command: impl Into<String>,
        note: impl Into<String>,
        agent: Agent,
    ) -> Self {
        Self::new(kind, command, note, 0, "completed", agent)
    }

    /// Convenience constructor for a failed action.
    pub fn failure(
        kind: EventKind,
        command: impl Into<String>,
        note: impl Into<String>,
        outcome: i64,
        outcome_note: impl Into<String>,
        agent: Agent,
    ) -> Self {
        Self::new(kind, command, note, outcome, outcome_note, agent)
    }

    pub fn is_success(&self) -> bool {
        self.outcome == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_form_round_trip() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let parsed: EventKind = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_structural_equality_survives_serde() {
        let event = ProvenanceEvent::success(
            EventKind::Acquisition,
            "ddrescue -d /dev/sr0 unit.img unit.map",
            "1 image produced",
            Agent::tool("ddrescue", "1.28"),
        );

        let json = serde_json::to_string(&event).unwrap();
        let back: ProvenanceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_identical_payloads_remain_distinct_events() {
        let a = ProvenanceEvent::success(
            EventKind::MalwareScan,
            "clamscan -r objects",
            "no findings",
            Agent::tool("clamscan", "1.3.1"),
        );
        let b = ProvenanceEvent::success(
            EventKind::MalwareScan,
            "clamscan -r objects",
            "no findings",
            Agent::tool("clamscan", "1.3.1"),
        );

        assert_ne!(a, b, "distinct events must differ even with equal payloads");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_failure_preserves_exit_code() {
        let event = ProvenanceEvent::failure(
            EventKind::Replication,
            "tsk_recover -a unit.img objects",
            String::new(),
            1,
            "exit status 1",
            Agent::tool("tsk_recover", "4.12.1"),
        );

        assert!(!event.is_success());
        assert_eq!(event.outcome, 1);
        assert_eq!(event.outcome_note, "exit status 1");
    }
}
