//! Error taxonomy for the admission pipeline.
//!
//! Every gate failure maps onto one [`GateError`] variant. None of them is
//! fatal to a sweep: the scanner logs the diagnostic and moves on to the
//! next candidate manifest. Messages describe *what* failed on *which*
//! submission without echoing submission content beyond file names.

use std::fmt;
use std::path::PathBuf;

/// Errors produced while admitting a single candidate manifest.
#[derive(Debug)]
pub enum GateError {
    /// The external signature oracle rejected the manifest. The manifest
    /// and its artifacts stay untouched in the watch directory.
    InvalidSignature {
        /// Manifest file that failed verification.
        manifest: PathBuf,
        /// Sanitized verifier stderr; empty when the oracle said nothing.
        detail: String,
    },

    /// One or more referenced files failed their size or digest check.
    /// Carries every discrepancy found, not only the first.
    IntegrityMismatch {
        /// Manifest whose references failed.
        manifest: PathBuf,
        /// One human-readable line per failing file.
        failures: Vec<String>,
    },

    /// The manifest document is missing required fields or cannot be
    /// parsed. Treated like a signature failure: skip and log.
    MalformedManifest {
        /// Manifest file that failed to parse.
        manifest: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Directory creation, rename, or record persistence failed during
    /// admission. Partial relocation is a known limitation (no rollback);
    /// an operator reconciles manually.
    Storage {
        /// What the admitter was doing when it failed.
        context: String,
        /// Underlying I/O error text.
        source: std::io::Error,
    },
}

impl GateError {
    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature { manifest, detail } => {
                write!(f, "{}: invalid signature", manifest.display())?;
                if !detail.is_empty() {
                    write!(f, " ({detail})")?;
                }
                Ok(())
            }
            Self::IntegrityMismatch { manifest, failures } => {
                write!(
                    f,
                    "{}: {} integrity failure(s): {}",
                    manifest.display(),
                    failures.len(),
                    failures.join("; ")
                )
            }
            Self::MalformedManifest { manifest, reason } => {
                write!(f, "{}: malformed manifest: {reason}", manifest.display())
            }
            Self::Storage { context, source } => {
                write!(f, "storage error while {context}: {source}")
            }
        }
    }
}

impl std::error::Error for GateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage { source, .. } => Some(source),
            _ => None,
        }
    }
}
