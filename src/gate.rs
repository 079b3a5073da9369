//! Stage doneness decisions.
//!
//! A characterization pass may be run many times against the same item; the
//! gate consults the ledger to decide which stages already happened. Policy
//! differs by kind: most stages are done once they have succeeded, a malware
//! scan is done once it was *attempted* (a failed scanner should not block
//! ingest forever), and directory documentation is done only when produced by
//! the currently installed tool version.

use crate::ledger::{EventKind, Ledger};

/// Decides whether a characterization stage needs to run.
#[derive(Debug, Clone, Copy)]
pub struct StageGate {
    rerun: bool,
}

impl StageGate {
    /// A gate with `rerun` set reports every stage as not-done, forcing a
    /// fresh pass that appends new events alongside the old ones.
    pub fn new(rerun: bool) -> Self {
        Self { rerun }
    }

    /// Has `kind` already happened for this item?
    pub fn is_done(&self, ledger: &Ledger, kind: EventKind) -> bool {
        if self.rerun {
            return false;
        }

        match kind {
            EventKind::MalwareScan => self.is_attempted(ledger, kind),
            // Version-gated; use `is_documented` with the probed tool version.
            EventKind::MetadataExtraction => false,
            _ => ledger.events_of_kind(kind).any(|event| event.is_success()),
        }
    }

    /// Was `kind` tried at all, successfully or not? Acquisition steps pair
    /// this with an output check so a partial-but-usable result is not
    /// repeated.
    pub fn is_attempted(&self, ledger: &Ledger, kind: EventKind) -> bool {
        if self.rerun {
            return false;
        }

        ledger.events_of_kind(kind).next().is_some()
    }

    /// Is the directory structure already documented by the tool version
    /// currently installed? A version bump invalidates prior documentation.
    pub fn is_documented(&self, ledger: &Ledger, tool_version: &str) -> bool {
        if self.rerun {
            return false;
        }

        ledger
            .events_of_kind(EventKind::MetadataExtraction)
            .any(|event| event.is_success() && event.agent.version == tool_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Agent, ProvenanceEvent};
    use std::path::Path;

    fn ledger_with(dir: &Path, events: Vec<ProvenanceEvent>) -> Ledger {
        let mut ledger = Ledger::open(dir).unwrap();
        for event in events {
            ledger.append(event).unwrap();
        }
        ledger
    }

    #[test]
    fn test_success_gated_stage() {
        let dir = tempfile::tempdir().unwrap();
        let gate = StageGate::new(false);

        let failed = ledger_with(
            &dir.path().join("failed"),
            vec![ProvenanceEvent::failure(
                EventKind::MessageDigestCalculation,
                "sha256",
                String::new(),
                1,
                "exit status 1",
                Agent::internal(),
            )],
        );
        assert!(!gate.is_done(&failed, EventKind::MessageDigestCalculation));

        let succeeded = ledger_with(
            &dir.path().join("succeeded"),
            vec![ProvenanceEvent::success(
                EventKind::MessageDigestCalculation,
                "sha256",
                "12 files",
                Agent::internal(),
            )],
        );
        assert!(gate.is_done(&succeeded, EventKind::MessageDigestCalculation));
    }

    #[test]
    fn test_malware_scan_attempt_counts_as_done() {
        let dir = tempfile::tempdir().unwrap();
        let gate = StageGate::new(false);

        let attempted = ledger_with(
            &dir.path().join("attempted"),
            vec![ProvenanceEvent::failure(
                EventKind::MalwareScan,
                "clamscan -r objects",
                String::new(),
                2,
                "exit status 2",
                Agent::tool("clamscan", "1.3.1"),
            )],
        );
        assert!(gate.is_done(&attempted, EventKind::MalwareScan));
        assert!(gate.is_attempted(&attempted, EventKind::MalwareScan));

        let untouched = ledger_with(&dir.path().join("untouched"), Vec::new());
        assert!(!gate.is_done(&untouched, EventKind::MalwareScan));
        assert!(!gate.is_attempted(&untouched, EventKind::MalwareScan));
    }

    #[test]
    fn test_documentation_invalidated_by_version_bump() {
        let dir = tempfile::tempdir().unwrap();
        let gate = StageGate::new(false);
        let ledger = ledger_with(
            dir.path(),
            vec![ProvenanceEvent::success(
                EventKind::MetadataExtraction,
                "tree objects",
                String::new(),
                Agent::tool("tree", "v2.1.1"),
            )],
        );

        assert!(gate.is_documented(&ledger, "v2.1.1"));
        assert!(!gate.is_documented(&ledger, "v2.2.0"));
        assert!(!gate.is_done(&ledger, EventKind::MetadataExtraction));
    }

    #[test]
    fn test_rerun_forces_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let gate = StageGate::new(true);
        let ledger = ledger_with(
            dir.path(),
            vec![
                ProvenanceEvent::success(
                    EventKind::MalwareScan,
                    "clamscan -r objects",
                    String::new(),
                    Agent::tool("clamscan", "1.3.1"),
                ),
                ProvenanceEvent::success(
                    EventKind::MetadataExtraction,
                    "tree objects",
                    String::new(),
                    Agent::tool("tree", "v2.1.1"),
                ),
            ],
        );

        assert!(!gate.is_done(&ledger, EventKind::MalwareScan));
        assert!(!gate.is_documented(&ledger, "v2.1.1"));
    }
}
