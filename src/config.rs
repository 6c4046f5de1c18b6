use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum config file size (1 MB).
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

fn default_mail_from() -> String {
    "buildgate <noreply@localhost>".to_string()
}

/// Gate configuration: instance identity, directory layout, and the
/// (distribution, architecture) fan-out matrix.
///
/// The gate does not own distribution policy; `dists` and `archs` arrive
/// here already decided and are recorded verbatim into every admitted
/// build's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Display name of this instance, used in notification subjects.
    pub instance: String,
    /// Watch directory scanned for `*.changes` manifests and their artifacts.
    pub incoming_dir: PathBuf,
    /// Root of immutable per-build storage.
    pub builds_dir: PathBuf,
    /// Directory task descriptors are fanned out into.
    pub queue_dir: PathBuf,
    /// Target distributions; one task descriptor per (dist, arch) pair.
    pub dists: Vec<String>,
    /// Target architectures.
    pub archs: Vec<String>,
    /// Gates verbose per-manifest progress output.
    #[serde(default)]
    pub debug: bool,
    /// Sender address for acceptance notifications.
    #[serde(default = "default_mail_from")]
    pub mail_from: String,
}

impl GateConfig {
    /// Loads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: Self =
            serde_json::from_slice(&crate::fs_guard::read_validated(path, MAX_CONFIG_BYTES)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.dists.is_empty() {
            return Err(anyhow!("config: dists must not be empty"));
        }
        if self.archs.is_empty() {
            return Err(anyhow!("config: archs must not be empty"));
        }
        Ok(())
    }
}
