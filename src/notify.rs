//! Acceptance notifications.
//!
//! On admission the submitter (the changed-by identity) gets a plain-text
//! mail, CC'ing the maintainer when the two differ. Dispatch is
//! fire-and-forget through `sendmail -t`: a delivery failure never undoes
//! an admission, the sweep just logs it and moves on. Rejections produce
//! no submitter-facing mail at all, only operator diagnostics.

use crate::admit::Build;
use crate::manifest::Manifest;
use crate::signature::sanitize_tool_stderr;
use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

/// Notification sink for admission outcomes. Injected so tests can record
/// instead of spawning a mailer.
pub trait Notifier {
    /// Reports a successful admission to the submitter identities.
    fn accepted(
        &self,
        manifest: &Manifest,
        build: &Build,
        manifest_name: &str,
        instance: &str,
    ) -> Result<()>;
}

/// Composes the acceptance message: standard header/blank-line/body
/// convention, recipients taken from the manifest identities.
pub fn compose_accepted(
    manifest: &Manifest,
    from: &str,
    manifest_name: &str,
    instance: &str,
) -> String {
    let mut msg = String::new();
    msg.push_str(&format!("From: {from}\n"));
    msg.push_str(&format!("To: {}\n", manifest.changed_by));
    if manifest.maintainer != manifest.changed_by {
        msg.push_str(&format!("Cc: {}\n", manifest.maintainer));
    }
    msg.push_str(&format!("Subject: {manifest_name} ACCEPTED into {instance}\n"));
    msg.push('\n');
    msg.push_str("Accepted:\n");
    for file in &manifest.files {
        msg.push_str(&format!("{}\n", file.name));
    }
    msg.push('\n');
    msg.push_str(&format!("{}\n", manifest.description));
    msg.push_str(&format!("{}\n", manifest.changes));
    msg.push('\n');
    msg.push_str(&format!("Thank you for your contribution to {instance}.\n"));
    msg
}

/// Production notifier: pipes the composed message into `sendmail -t`,
/// which picks the envelope recipients out of the headers.
pub struct SendmailNotifier {
    from: String,
    program: String,
}

impl SendmailNotifier {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            program: "sendmail".to_string(),
        }
    }

    #[cfg(test)]
    fn with_program(from: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            program: program.into(),
        }
    }
}

impl Notifier for SendmailNotifier {
    fn accepted(
        &self,
        manifest: &Manifest,
        _build: &Build,
        manifest_name: &str,
        instance: &str,
    ) -> Result<()> {
        let msg = compose_accepted(manifest, &self.from, manifest_name, instance);

        let mut child = Command::new(&self.program)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {}", self.program))?;
        child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("no stdin handle for {}", self.program))?
            .write_all(msg.as_bytes())
            .context("writing message to mailer")?;
        let out = child.wait_with_output().context("waiting for mailer")?;
        if !out.status.success() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                self.program,
                out.status,
                sanitize_tool_stderr(&out.stderr)
            ));
        }
        Ok(())
    }
}
