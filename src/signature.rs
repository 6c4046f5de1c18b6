//! Signature verification, delegated to an external oracle.
//!
//! The gate never verifies signatures in-process: an external tool
//! (`gpgv` by default) is invoked against the manifest file and its exit
//! status is the whole contract. Zero means valid; anything else means
//! the manifest is rejected. Stdout is ignored; stderr is captured,
//! sanitized, and carried on the rejection verdict so the sweep can log
//! *why* the verifier said no.
//!
//! The oracle is a capability trait so a sweep can be tested without
//! spawning real processes.

use anyhow::{Context, Result};
use regex::Regex;
use std::{
    path::Path,
    process::{Command, Stdio},
};

/// Upper bound on captured subprocess stderr before truncation.
const MAX_TOOL_ERR_BYTES: usize = 8 * 1024; // 8KB

/// Outcome of a signature check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    /// Rejected. `detail` is the sanitized verifier stderr, possibly
    /// empty; it ends up in the operator diagnostic, never in mail.
    Invalid { detail: String },
}

/// Verdict source for manifest signatures.
pub trait SignatureOracle {
    /// Returns the oracle's verdict for the manifest. `Err` is reserved
    /// for failures to run the oracle at all (missing binary); an
    /// invalid signature is a normal outcome, never an error.
    fn verify(&self, manifest: &Path) -> Result<Verdict>;
}

/// Production oracle: spawns `gpgv <manifest>` and maps exit status 0 to
/// a valid signature.
pub struct GpgvOracle {
    program: String,
}

impl GpgvOracle {
    pub fn new() -> Self {
        Self {
            program: "gpgv".to_string(),
        }
    }

    /// Overrides the verifier binary (tests, or a gpgv wrapper that
    /// supplies the instance keyring).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GpgvOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureOracle for GpgvOracle {
    fn verify(&self, manifest: &Path) -> Result<Verdict> {
        let out = Command::new(&self.program)
            .arg(manifest)
            .stdout(Stdio::null())
            .output()
            .with_context(|| format!("running {}", self.program))?;
        if out.status.success() {
            Ok(Verdict::Valid)
        } else {
            Ok(Verdict::Invalid {
                detail: sanitize_tool_stderr(&out.stderr),
            })
        }
    }
}

/// Truncates and redacts subprocess stderr before it reaches diagnostics.
/// The gate must not leak key ids, tokens, or operator paths into logs
/// that submitters may eventually see.
pub fn sanitize_tool_stderr(stderr: &[u8]) -> String {
    let mut s = String::from_utf8_lossy(stderr).to_string();
    if s.len() > MAX_TOOL_ERR_BYTES {
        // Back off to a char boundary; lossy decoding inserts multibyte
        // replacement chars that can straddle the cut.
        let mut end = MAX_TOOL_ERR_BYTES;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
        s.push_str("\n[TRUNCATED]");
    }

    let patterns = [
        (
            r"(?i)BEGIN (RSA|EC|OPENSSH|PGP) PRIVATE KEY",
            "BEGIN [REDACTED] PRIVATE KEY",
        ),
        (
            r"(?i)(password|token)\s*[:=]\s*[^\s]+",
            "[REDACTED]=[REDACTED]",
        ),
    ];
    for (pat, repl) in patterns {
        if let Ok(re) = Regex::new(pat) {
            s = re.replace_all(&s, repl).to_string();
        }
    }

    // Redact obvious absolute paths.
    s.lines()
        .map(|line| {
            if line.trim_start().starts_with('/') {
                "[REDACTED_PATH]"
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_rejects_when_tool_exits_nonzero() {
        // `false` exists everywhere we run tests and always exits 1.
        let oracle = GpgvOracle::with_program("false");
        assert_eq!(
            oracle.verify(Path::new("whatever.changes")).unwrap(),
            Verdict::Invalid { detail: String::new() }
        );
    }

    #[test]
    fn oracle_accepts_when_tool_exits_zero() {
        let oracle = GpgvOracle::with_program("true");
        assert_eq!(
            oracle.verify(Path::new("whatever.changes")).unwrap(),
            Verdict::Valid
        );
    }

    #[test]
    fn oracle_errors_when_tool_is_missing() {
        let oracle = GpgvOracle::with_program("buildgate-no-such-verifier");
        assert!(oracle.verify(Path::new("whatever.changes")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn rejection_detail_is_sanitized_verifier_stderr() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-gpgv");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'token=abc123' >&2\necho '/root/keyring.gpg: no such keyring' >&2\nexit 2\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let oracle = GpgvOracle::with_program(script.to_string_lossy());
        let Verdict::Invalid { detail } =
            oracle.verify(Path::new("whatever.changes")).unwrap()
        else {
            panic!("expected a rejection");
        };
        assert!(!detail.contains("abc123"), "detail leaked a token: {detail}");
        assert!(!detail.contains("/root"), "detail leaked a path: {detail}");
        assert!(detail.contains("[REDACTED_PATH]"));
    }

    #[test]
    fn sanitize_truncates_long_output() {
        let big = vec![b'e'; MAX_TOOL_ERR_BYTES * 2];
        let s = sanitize_tool_stderr(&big);
        assert!(s.ends_with("[TRUNCATED]"));
        assert!(s.len() < big.len());
    }

    #[test]
    fn sanitize_truncation_respects_char_boundaries() {
        // Invalid UTF-8 decodes to 3-byte replacement chars, so the raw
        // truncation point lands mid-char. Must not panic.
        let hostile = vec![0xFFu8; MAX_TOOL_ERR_BYTES];
        let s = sanitize_tool_stderr(&hostile);
        assert!(s.ends_with("[TRUNCATED]"));
    }

    #[test]
    fn sanitize_redacts_secrets_and_paths() {
        let s = sanitize_tool_stderr(b"token=abc123\n/home/operator/keyring.gpg: no such file");
        assert!(!s.contains("abc123"));
        assert!(!s.contains("/home/operator"));
        assert!(s.contains("[REDACTED_PATH]"));
    }
}
