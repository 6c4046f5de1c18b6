//! The single-pass incoming sweep.
//!
//! `run_once` enumerates every `*.changes` candidate in the watch
//! directory (sorted by file name so a sweep is reproducible) and drives
//! each one through the gates in order: signature, parse, integrity,
//! admission, notification. Every gate is hard: a failure skips that
//! candidate, logs one diagnostic, and the sweep continues. Nothing here
//! loops or polls; repeated sweeps are an external scheduler's job.

use crate::admit::{self, Build};
use crate::checksum;
use crate::config::GateConfig;
use crate::error::GateError;
use crate::manifest;
use crate::notify::Notifier;
use crate::signature::{SignatureOracle, Verdict};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome tally of one sweep. Per-manifest details go to the log; the
/// report is for the caller's exit summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Manifests admitted as builds.
    pub accepted: usize,
    /// Manifests rejected by a gate (signature, parse, integrity).
    pub rejected: usize,
    /// Manifests that hit storage or oracle failures mid-admission.
    pub errors: usize,
}

/// One sweep over the watch directory, with injected verification and
/// notification capabilities.
pub struct Scanner<'a> {
    config: &'a GateConfig,
    oracle: &'a dyn SignatureOracle,
    notifier: &'a dyn Notifier,
}

enum Outcome {
    Accepted(Build),
    Rejected(GateError),
    Failed(anyhow::Error),
}

impl<'a> Scanner<'a> {
    pub fn new(
        config: &'a GateConfig,
        oracle: &'a dyn SignatureOracle,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            oracle,
            notifier,
        }
    }

    /// Runs the queue once and returns the tally.
    pub fn run_once(&self) -> Result<SweepReport> {
        let candidates = candidate_manifests(&self.config.incoming_dir)?;
        let mut report = SweepReport::default();
        for candidate in candidates {
            self.debug(&format!("considering {}", candidate.display()));
            match self.process_one(&candidate) {
                Outcome::Accepted(build) => {
                    println!(
                        "✓ {} accepted as build {}",
                        file_name(&candidate),
                        build.build_id
                    );
                    report.accepted += 1;
                }
                Outcome::Rejected(GateError::IntegrityMismatch { manifest, failures }) => {
                    // One line per failing file, never just the first.
                    for failure in &failures {
                        eprintln!("✗ {}: {failure}", file_name(&manifest));
                    }
                    report.rejected += 1;
                }
                Outcome::Rejected(err) => {
                    eprintln!("✗ {err}");
                    report.rejected += 1;
                }
                Outcome::Failed(err) => {
                    eprintln!("✗ {}: {err:#}", file_name(&candidate));
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    /// Drives one candidate manifest through all gates.
    fn process_one(&self, path: &Path) -> Outcome {
        match self.oracle.verify(path) {
            Ok(Verdict::Valid) => {}
            Ok(Verdict::Invalid { detail }) => {
                return Outcome::Rejected(GateError::InvalidSignature {
                    manifest: path.to_path_buf(),
                    detail,
                });
            }
            Err(e) => return Outcome::Failed(e.context("signature oracle")),
        }
        self.debug(&format!("{}: signature valid", file_name(path)));

        let manifest = match manifest::parse(path) {
            Ok(m) => m,
            Err(e) => return Outcome::Rejected(e),
        };
        self.debug(&format!(
            "{}: {} {} with {} file(s)",
            file_name(path),
            manifest.source,
            manifest.version,
            manifest.files.len()
        ));

        let failures = checksum::verify_all(&manifest, &self.config.incoming_dir);
        if !failures.is_empty() {
            return Outcome::Rejected(GateError::IntegrityMismatch {
                manifest: path.to_path_buf(),
                failures,
            });
        }

        let build = match admit::admit(&manifest, path, self.config) {
            Ok(b) => b,
            Err(e) => return Outcome::Failed(anyhow::Error::new(e)),
        };

        // Fire-and-forget: the build stays admitted even if the mail
        // never leaves.
        if let Err(e) = self.notifier.accepted(
            &manifest,
            &build,
            &file_name(path),
            &self.config.instance,
        ) {
            eprintln!("⚠ {}: notification failed: {e:#}", file_name(path));
        }

        Outcome::Accepted(build)
    }

    fn debug(&self, msg: &str) {
        if self.config.debug {
            println!("→ {msg}");
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Enumerates `*.changes` candidates in the watch directory. Filesystem
/// enumeration order is arbitrary; the list is sorted by name so
/// processing order (and therefore build-id assignment) is reproducible.
/// Files appearing mid-sweep are picked up on the next sweep.
pub fn candidate_manifests(watch_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(watch_dir)
        .with_context(|| format!("reading watch directory {}", watch_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "changes") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
