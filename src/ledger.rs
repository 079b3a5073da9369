//! Append-only provenance ledger.
//!
//! Splits across three concerns: the event vocabulary and record shape
//! ([`event`]), the JSONL working copy with reconciliation ([`store`]), and
//! the exported interchange document ([`document`]).

pub mod document;
pub mod event;
pub mod store;

pub use document::{DOCUMENT_FILE, ItemDescriptor, ProvenanceDocument};
pub use event::{Agent, EventKind, ProvenanceEvent};
pub use store::{LEDGER_FILE, Ledger};
