//! Changes-manifest parsing.
//!
//! A submission manifest is an RFC-822-style `Key: value` document, usually
//! clearsigned. The parser maps it into a typed [`Manifest`] at this single
//! boundary; nothing downstream ever sees the raw key/value form. Anything
//! missing or unparsable is rejected here as
//! [`GateError::MalformedManifest`].

use crate::error::GateError;
use crate::fs_guard;
use std::path::Path;

/// Maximum manifest file size (1 MB). Manifests are small metadata
/// documents; anything larger is hostile or corrupt.
const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

const PGP_MESSAGE_MARKER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const PGP_SIGNATURE_MARKER: &str = "-----BEGIN PGP SIGNATURE-----";

/// One artifact named by a manifest's checksum table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencedFile {
    /// Plain base name, relative to the watch directory.
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Declared hex-encoded SHA-256 digest (compared case-sensitively).
    pub sha256: String,
}

/// The parsed submission descriptor. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub source: String,
    pub version: String,
    pub maintainer: String,
    pub changed_by: String,
    /// Free text; empty when the field is absent.
    pub description: String,
    /// Changelog excerpt; empty when the field is absent.
    pub changes: String,
    /// Ordered as declared in the manifest.
    pub files: Vec<ReferencedFile>,
}

/// Parses a changes manifest file into a typed [`Manifest`].
pub fn parse(path: &Path) -> Result<Manifest, GateError> {
    let bytes = fs_guard::read_validated(path, MAX_MANIFEST_BYTES).map_err(|e| malformed(path, e.to_string()))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| malformed(path, "manifest is not valid UTF-8".to_string()))?;
    parse_str(path, &text)
}

fn malformed(path: &Path, reason: String) -> GateError {
    GateError::MalformedManifest {
        manifest: path.to_path_buf(),
        reason,
    }
}

fn parse_str(path: &Path, text: &str) -> Result<Manifest, GateError> {
    // (key, accumulated continuation lines) in document order.
    let mut fields: Vec<(String, Vec<String>)> = Vec::new();
    let mut in_armor_header = false;

    for line in text.lines() {
        if line == PGP_MESSAGE_MARKER {
            // Clearsigned document: skip the armor header block
            // ("Hash: SHA256" etc.) up to its terminating blank line.
            in_armor_header = true;
            fields.clear();
            continue;
        }
        if in_armor_header {
            if line.is_empty() {
                in_armor_header = false;
            }
            continue;
        }
        if line == PGP_SIGNATURE_MARKER {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            match fields.last_mut() {
                Some((_, lines)) => lines.push(line.trim_start().to_string()),
                None => {
                    return Err(malformed(path, "continuation line before any field".to_string()))
                }
            }
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(malformed(path, format!("line without a field name: {line:?}")));
        };
        let mut lines = Vec::new();
        if !value.trim().is_empty() {
            lines.push(value.trim().to_string());
        }
        fields.push((key.trim().to_ascii_lowercase(), lines));
    }

    let field = |name: &str| -> Option<String> {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, lines)| lines.join("\n"))
    };
    let required = |name: &str| -> Result<String, GateError> {
        match field(name) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(malformed(path, format!("missing required field {name:?}"))),
        }
    };

    let source = required("source")?;
    let version = required("version")?;
    let maintainer = required("maintainer")?;
    let changed_by = required("changed-by")?;
    let description = field("description").unwrap_or_default();
    let changes = field("changes").unwrap_or_default();

    let table = fields
        .iter()
        .find(|(k, _)| k == "checksums-sha256")
        .map(|(_, lines)| lines.as_slice())
        .ok_or_else(|| malformed(path, "missing required field \"checksums-sha256\"".to_string()))?;

    let mut files = Vec::new();
    for entry in table {
        files.push(parse_checksum_entry(path, entry)?);
    }
    if files.is_empty() {
        return Err(malformed(path, "checksum table lists no files".to_string()));
    }

    Ok(Manifest {
        source,
        version,
        maintainer,
        changed_by,
        description,
        changes,
        files,
    })
}

/// One checksum-table entry: `<hex-digest> <size> <name>`.
fn parse_checksum_entry(path: &Path, entry: &str) -> Result<ReferencedFile, GateError> {
    let mut parts = entry.split_whitespace();
    let (Some(digest), Some(size), Some(name), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed(path, format!("bad checksum entry: {entry:?}")));
    };
    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed(path, format!("bad SHA-256 digest for {name:?}")));
    }
    let size: u64 = size
        .parse()
        .map_err(|_| malformed(path, format!("bad size for {name:?}: {size:?}")))?;
    // File names must stay inside the watch directory.
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(malformed(path, format!("unsafe file name: {name:?}")));
    }
    Ok(ReferencedFile {
        name: name.to_string(),
        size,
        sha256: digest.to_string(),
    })
}
