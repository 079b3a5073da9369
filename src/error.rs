//! Error types for ingest operations.
//!
//! Most fallible paths in this crate flow through [`anyhow`] with context
//! attached at the call site. The enum here covers the conditions callers
//! actually branch on: rejecting operator input before anything touches disk,
//! refusing to write a locked registry, and telling a dead acquisition from a
//! partial one.

use std::path::PathBuf;
use thiserror::Error;

/// Failure conditions that callers match on.
#[derive(Debug, Error)]
pub enum IngotError {
    /// Operator input rejected before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No registry row exists for the requested barcode.
    #[error("barcode {0} is not in the registry")]
    UnknownBarcode(String),

    /// The registry is held open elsewhere; writes must not proceed.
    #[error("registry locked by {}", .0.display())]
    RegistryLocked(PathBuf),

    /// Acquisition exited nonzero and left nothing usable behind.
    #[error("acquisition failed (exit {code}): {detail}")]
    AcquisitionFailed { code: i64, detail: String },

    /// Statistics were requested but fingerprint collection never succeeded.
    #[error("no fingerprints available for {0}")]
    MissingFingerprints(String),
}
