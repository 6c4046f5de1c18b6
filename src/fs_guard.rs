use anyhow::{anyhow, Context, Result};
use std::{fs, fs::Metadata, path::Path};

/// Reads a file after verifying it is not a symlink and is within `max_bytes`.
///
/// Every untrusted document the gate consumes (manifests, config) goes
/// through this function. NOTE: narrow TOCTOU window between
/// `symlink_metadata()` and `fs::read()`; the check still catches accidental
/// symlinks and raises the bar for exploitation.
pub fn read_validated(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let meta = stat_validated(path)?;
    if meta.len() > max_bytes {
        return Err(anyhow!(
            "File too large: {} ({} bytes, max {max_bytes} bytes)",
            path.display(),
            meta.len(),
        ));
    }
    fs::read(path).with_context(|| format!("read {}", path.display()))
}

/// Stats a file without following symlinks, refusing symlinks outright.
///
/// The checksum gate uses this for the on-disk size of a referenced
/// artifact: a submission must never be able to point the verifier at a
/// file outside the watch directory via a planted link.
pub fn stat_validated(path: &Path) -> Result<Metadata> {
    let meta = fs::symlink_metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if meta.file_type().is_symlink() {
        return Err(anyhow!("Refusing to touch symlink: {}", path.display()));
    }
    Ok(meta)
}
