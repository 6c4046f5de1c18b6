//! Per-artifact integrity verification.
//!
//! For every file a manifest references, the declared size must equal the
//! on-disk size exactly and the declared SHA-256 digest must equal the
//! recomputed digest of the full content (case-sensitive hex comparison).
//! Verification never short-circuits: every referenced file is checked so
//! a single sweep reports every discrepancy, not just the first.

use crate::fs_guard;
use crate::manifest::Manifest;
use sha2::{Digest, Sha256};
use std::{fs, io::Read, path::Path};

/// Hard cap on individual artifact size. Oversize counts as an integrity
/// failure for that file rather than an error.
const MAX_ARTIFACT_BYTES: u64 = 2 * 1024 * 1024 * 1024; // 2 GiB

/// Streaming SHA-256 of a file's content. Callers must have
/// stat-validated the path first (`fs_guard::stat_validated`); this
/// function opens whatever it is given.
fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let mut f = fs::File::open(path)?;
    let mut h = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        h.update(&buf[..n]);
    }
    Ok(hex::encode(h.finalize()))
}

/// Checks every referenced file of `manifest` against the on-disk content
/// under `watch_dir`. Returns one diagnostic line per failing file; an
/// empty vector means the whole manifest passed.
///
/// A file that cannot be resolved (missing, unreadable, symlink) fails its
/// check; it never aborts verification of the remaining files.
pub fn verify_all(manifest: &Manifest, watch_dir: &Path) -> Vec<String> {
    let mut failures = Vec::new();

    for file in &manifest.files {
        let path = watch_dir.join(&file.name);

        let meta = match fs_guard::stat_validated(&path) {
            Ok(m) => m,
            Err(e) => {
                failures.push(format!("{}: {e}", file.name));
                continue;
            }
        };
        if meta.len() != file.size {
            failures.push(format!(
                "{}: size {} does not match declared {}",
                file.name,
                meta.len(),
                file.size
            ));
            continue;
        }
        if meta.len() > MAX_ARTIFACT_BYTES {
            failures.push(format!(
                "{}: {} bytes exceeds artifact limit ({MAX_ARTIFACT_BYTES} bytes)",
                file.name,
                meta.len()
            ));
            continue;
        }
        match sha256_file(&path) {
            Ok(actual) if actual == file.sha256 => {}
            Ok(actual) => failures.push(format!(
                "{}: SHA-256 {actual} does not match declared {}",
                file.name, file.sha256
            )),
            Err(e) => failures.push(format!("{}: {e}", file.name)),
        }
    }

    failures
}
