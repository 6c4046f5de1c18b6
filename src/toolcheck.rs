//! External tool availability detection.
//!
//! The gate delegates to two external programs: `gpgv` for signature
//! verification and `sendmail` for notification dispatch. Rather than
//! failing mid-sweep with an opaque "No such file or directory", the
//! `check` subcommand probes both up front and prints actionable
//! diagnostics.
//!
//! A tool is probed by spawning it with a version flag; a non-zero exit
//! code is acceptable (the tool exists), only a launch failure counts as
//! "unavailable".

use std::process::Command;

/// Summary of which external tools are available on `$PATH`.
#[derive(Debug, Clone)]
pub struct ToolAvailability {
    /// `gpgv` is installed and executable.
    pub gpgv: bool,
    /// `sendmail` (or a compatible MTA shim) is installed and executable.
    pub sendmail: bool,
}

impl ToolAvailability {
    /// Returns true if the gate can both verify and notify.
    pub fn all_available(&self) -> bool {
        self.gpgv && self.sendmail
    }

    /// Returns a human-readable summary of missing tools with install hints.
    pub fn missing_tools_report(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if !self.gpgv {
            missing.push(
                "gpgv: not found. Install the gnupg package (signature verification is impossible without it)."
                    .to_string(),
            );
        }
        if !self.sendmail {
            missing.push(
                "sendmail: not found. Install an MTA providing the sendmail interface (acceptance mail will fail, admissions still succeed)."
                    .to_string(),
            );
        }
        missing
    }
}

/// Probes `$PATH` for the external tools the gate delegates to.
///
/// This function never fails; a missing tool is reported as `false`.
pub fn detect_tools() -> ToolAvailability {
    ToolAvailability {
        gpgv: probe("gpgv", &["--version"]),
        sendmail: probe("sendmail", &["-V"]),
    }
}

/// Attempts to spawn `cmd args...` and returns `true` if the process
/// launched, regardless of exit code.
fn probe(cmd: &str, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}
