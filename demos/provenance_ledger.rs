//! Example: Provenance Ledger Round Trip
//!
//! This example demonstrates how to:
//! 1. Record provenance events in the append-only working ledger
//! 2. Export the interchange document other systems read
//! 3. Reconcile events that arrive via a hand-carried document
//!
//! Run with: cargo run --example provenance_ledger

use ingot::ledger::document::{self, ItemDescriptor};
use ingot::ledger::{Agent, EventKind, Ledger, ProvenanceEvent};
use tempfile::TempDir;

fn main() -> anyhow::Result<()> {
    println!("=== Ingot Provenance Ledger Example ===\n");

    // Setup: a temporary metadata folder standing in for one ingest unit
    let temp_dir = TempDir::new()?;
    let item = ItemDescriptor {
        barcode: "39002012345678".to_owned(),
        job_type: "disk-image".to_owned(),
        source: "/dev/sr0".to_owned(),
    };

    // 1. Record events as actions complete
    println!("1. Recording events in the working ledger...");
    let mut ledger = Ledger::open(temp_dir.path())?;
    ledger.append(ProvenanceEvent::success(
        EventKind::Acquisition,
        "ddrescue -d /dev/sr0 39002012345678.img 39002012345678.map",
        "1 image produced",
        Agent::tool("ddrescue", "1.28"),
    ))?;
    ledger.append(ProvenanceEvent::success(
        EventKind::MessageDigestCalculation,
        "sha256 objects",
        "Calculated digests for 412 files",
        Agent::internal(),
    ))?;
    ledger.append(ProvenanceEvent::failure(
        EventKind::MalwareScan,
        "clamscan -r objects",
        "1 finding quarantined for review",
        1,
        "completed",
        Agent::tool("clamscan", "1.3.1"),
    ))?;
    println!("   Working ledger now holds {} events", ledger.len());
    println!("   Each append is flushed to ledger.jsonl before returning");

    // 2. Export the interchange document
    println!("\n2. Exporting the interchange document...");
    document::export(
        ledger.document_path(),
        item.clone(),
        "Example Library",
        ledger.events(),
    )?;
    println!("   Exported to: {}", ledger.document_path().display());

    // 3. Simulate a hand-carried document gaining an event elsewhere
    println!("\n3. Simulating an event recorded at another site...");
    let mut carried = document::read_events(ledger.document_path())?;
    carried.push(ProvenanceEvent::success(
        EventKind::MetadataModification,
        "(manual)",
        "Curator confirmed the title from the disc label",
        Agent::internal(),
    ));
    document::export(ledger.document_path(), item.clone(), "Example Library", &carried)?;
    println!("   Document now holds {} events; working ledger still holds 3", carried.len());

    // 4. Reconcile the document back into the working ledger
    println!("\n4. Reconciling on the original machine...");
    let mut ledger = Ledger::open(temp_dir.path())?;
    ledger.reconcile()?;
    println!("   Working ledger holds {} events after reconciliation", ledger.len());

    // 5. Show the merged history
    println!("\n5. Merged event history:");
    for event in ledger.events() {
        println!(
            "   [{}] {} (exit {}) - {}",
            event.timestamp.format("%H:%M:%S"),
            event.kind,
            event.outcome,
            event.note
        );
    }

    // 6. Re-export so the document and working ledger agree again
    println!("\n6. Re-exporting the reconciled document...");
    document::export(
        ledger.document_path(),
        item,
        "Example Library",
        ledger.events(),
    )?;
    let final_document = document::read_document(ledger.document_path())?;
    println!("   Document version: {}", final_document.document_version);
    println!("   Producer: {} {}", final_document.producer.name, final_document.producer.version);
    println!("   Events: {}", final_document.events.len());

    println!("\n=== Example Complete ===");
    println!("\nKey Takeaways:");
    println!("- Events are append-only: corrections become new events");
    println!("- The working ledger is JSONL, one flushed line per event");
    println!("- Export replaces the document atomically, never partially");
    println!("- Reconciliation is a structural union, so nothing is lost");
    println!("  when a document travels between machines");

    Ok(())
}
