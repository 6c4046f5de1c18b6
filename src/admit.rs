//! Build admission: the commit phase of the pipeline.
//!
//! A manifest that has passed the signature and integrity gates is turned
//! into a [`Build`]: a fresh build id is allocated, the manifest and its
//! artifacts are moved (renamed, never copied) into immutable per-build
//! storage, a `build.json` metadata record is written, and one
//! [`TaskDescriptor`] per (dist, arch) pair is fanned out into the queue
//! directory for the downstream build executor.
//!
//! There is no rollback: a crash mid-relocation leaves a partially
//! populated build directory for an operator to reconcile. Any filesystem
//! failure surfaces as [`GateError::Storage`] and the sweep moves on.

use crate::config::GateConfig;
use crate::error::GateError;
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Name of the persisted id-sequence file inside the builds directory.
const COUNTER_FILE: &str = ".counter";

/// The admitted, immutably stored unit corresponding to one accepted
/// manifest. Written to `<build_dir>/build.json`; never mutated or
/// deleted by the gate afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub build_id: u64,
    /// RFC 3339, UTC, captured at admission time.
    pub timestamp: String,
    pub package: String,
    pub version: String,
    pub maintainer: String,
    pub changed_by: String,
    /// Directory holding the relocated manifest and artifacts.
    pub source_dir: PathBuf,
    /// Full distribution list configured at admission time.
    pub dists: Vec<String>,
    /// Full architecture list configured at admission time.
    pub archs: Vec<String>,
}

/// One unit of work for the downstream build executor. Ownership passes
/// entirely to the consumer once the descriptor file is written; the gate
/// never reads it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub build_id: u64,
    pub package: String,
    pub version: String,
    pub maintainer: String,
    pub changed_by: String,
    pub source_dir: PathBuf,
    pub dist: String,
    pub arch: String,
}

impl TaskDescriptor {
    /// Deterministic queue file name. Distinct builds can never collide
    /// (the id is unique); re-running the same id overwrites descriptors
    /// of identical shape, which is harmless.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}.json",
            self.build_id, self.package, self.version, self.dist, self.arch
        )
    }
}

/// Issues build identifiers backed by a persisted sequence file.
///
/// The sequence file records the last issued id; allocation takes
/// `max(sequence, existing directory count) + 1` so a missing or wiped
/// sequence file degrades to the directory-enumeration behavior. The id
/// is only *reserved* once `fs::create_dir` of the build directory
/// succeeds: if two admitters ever race to the same id, the loser's
/// `create_dir` fails with "already exists" instead of silently sharing
/// the winner's directory.
pub struct BuildCounter {
    builds_dir: PathBuf,
}

impl BuildCounter {
    pub fn new(builds_dir: impl Into<PathBuf>) -> Self {
        Self {
            builds_dir: builds_dir.into(),
        }
    }

    /// Computes the next id without reserving it.
    fn next_id(&self) -> Result<u64, GateError> {
        let persisted = fs::read_to_string(self.builds_dir.join(COUNTER_FILE))
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);

        let mut dirs = 0u64;
        let entries = fs::read_dir(&self.builds_dir)
            .map_err(|e| GateError::storage("enumerating builds directory", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| GateError::storage("enumerating builds directory", e))?;
            if entry.path().is_dir() {
                dirs += 1;
            }
        }

        Ok(persisted.max(dirs) + 1)
    }

    /// Allocates the next id and reserves it by creating its build
    /// directory. Returns the id and the created directory.
    pub fn allocate(&self) -> Result<(u64, PathBuf), GateError> {
        let id = self.next_id()?;
        let build_dir = self.builds_dir.join(id.to_string());
        fs::create_dir(&build_dir).map_err(|e| {
            GateError::storage(format!("creating build directory {}", build_dir.display()), e)
        })?;
        fs::write(self.builds_dir.join(COUNTER_FILE), format!("{id}\n"))
            .map_err(|e| GateError::storage("persisting build counter", e))?;
        Ok((id, build_dir))
    }
}

fn storage_other(context: &str, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> GateError {
    GateError::storage(context, io::Error::other(err))
}

/// Admits a verified manifest: allocates a build id, relocates the
/// manifest and every referenced artifact out of the watch directory,
/// persists the build metadata record, and fans out one task descriptor
/// per configured (dist, arch) pair.
///
/// Must only be called after the signature and integrity gates have both
/// passed. Returns the fully populated [`Build`].
pub fn admit(
    manifest: &Manifest,
    manifest_path: &Path,
    config: &GateConfig,
) -> Result<Build, GateError> {
    fs::create_dir_all(&config.builds_dir)
        .map_err(|e| GateError::storage("creating builds directory", e))?;
    fs::create_dir_all(&config.queue_dir)
        .map_err(|e| GateError::storage("creating queue directory", e))?;

    let (build_id, build_dir) = BuildCounter::new(&config.builds_dir).allocate()?;

    let source_dir = build_dir.join("source");
    fs::create_dir(&source_dir)
        .map_err(|e| GateError::storage(format!("creating {}", source_dir.display()), e))?;

    // The downstream executor runs under a different identity and must be
    // able to work inside the build directory.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&build_dir, fs::Permissions::from_mode(0o777))
            .map_err(|e| GateError::storage("setting build directory mode", e))?;
    }

    relocate(manifest_path, &source_dir)?;
    for file in &manifest.files {
        relocate(&config.incoming_dir.join(&file.name), &source_dir)?;
    }

    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| storage_other("formatting admission timestamp", e))?;

    let build = Build {
        build_id,
        timestamp,
        package: manifest.source.clone(),
        version: manifest.version.clone(),
        maintainer: manifest.maintainer.clone(),
        changed_by: manifest.changed_by.clone(),
        source_dir,
        dists: config.dists.clone(),
        archs: config.archs.clone(),
    };

    let record = serde_json::to_vec_pretty(&build)
        .map_err(|e| storage_other("encoding build record", e))?;
    fs::write(build_dir.join("build.json"), record)
        .map_err(|e| GateError::storage("writing build record", e))?;

    for dist in &config.dists {
        for arch in &config.archs {
            let task = TaskDescriptor {
                build_id,
                package: build.package.clone(),
                version: build.version.clone(),
                maintainer: build.maintainer.clone(),
                changed_by: build.changed_by.clone(),
                source_dir: build.source_dir.clone(),
                dist: dist.clone(),
                arch: arch.clone(),
            };
            let body = serde_json::to_vec_pretty(&task)
                .map_err(|e| storage_other("encoding task descriptor", e))?;
            fs::write(config.queue_dir.join(task.file_name()), body).map_err(|e| {
                GateError::storage(format!("writing task descriptor for {dist}/{arch}"), e)
            })?;
        }
    }

    Ok(build)
}

/// Atomic per-file move into the build's source directory, preserving the
/// base file name.
fn relocate(from: &Path, source_dir: &Path) -> Result<(), GateError> {
    let Some(name) = from.file_name() else {
        return Err(GateError::storage(
            format!("relocating {}", from.display()),
            io::Error::other("path has no file name"),
        ));
    };
    fs::rename(from, source_dir.join(name))
        .map_err(|e| GateError::storage(format!("relocating {}", from.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ReferencedFile;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        config: GateConfig,
        manifest: Manifest,
        manifest_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let incoming = root.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();

        let config = GateConfig {
            instance: "test-instance".into(),
            incoming_dir: incoming.clone(),
            builds_dir: root.path().join("builds"),
            queue_dir: root.path().join("queue"),
            dists: vec!["stable".into(), "testing".into()],
            archs: vec!["amd64".into(), "arm64".into()],
            debug: false,
            mail_from: "gate <gate@localhost>".into(),
        };

        let mut files = Vec::new();
        for (name, content) in [
            ("foo_1.0.tar.gz", b"tarball".as_slice()),
            ("foo_1.0.dsc", b"dsc".as_slice()),
        ] {
            fs::write(incoming.join(name), content).unwrap();
            files.push(ReferencedFile {
                name: name.into(),
                size: content.len() as u64,
                sha256: hex::encode(Sha256::digest(content)),
            });
        }
        let manifest_path = incoming.join("foo_1.0_source.changes");
        fs::write(&manifest_path, b"manifest body").unwrap();

        let manifest = Manifest {
            source: "foo".into(),
            version: "1.0".into(),
            maintainer: "Jane Doe <jane@example.org>".into(),
            changed_by: "John Roe <john@example.org>".into(),
            description: "foo - does things".into(),
            changes: "* Initial release.".into(),
            files,
        };

        Fixture {
            _root: root,
            config,
            manifest,
            manifest_path,
        }
    }

    #[test]
    fn first_admission_gets_id_one() {
        let fx = fixture();
        let build = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();
        assert_eq!(build.build_id, 1);
    }

    #[test]
    fn relocation_is_a_pure_move() {
        let fx = fixture();
        let build = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();

        // Watch directory is empty afterwards.
        assert_eq!(fs::read_dir(&fx.config.incoming_dir).unwrap().count(), 0);

        // Source directory holds the manifest plus both artifacts,
        // byte-identical.
        assert_eq!(
            fs::read(build.source_dir.join("foo_1.0_source.changes")).unwrap(),
            b"manifest body"
        );
        assert_eq!(fs::read(build.source_dir.join("foo_1.0.tar.gz")).unwrap(), b"tarball");
        assert_eq!(fs::read(build.source_dir.join("foo_1.0.dsc")).unwrap(), b"dsc");
        assert_eq!(fs::read_dir(&build.source_dir).unwrap().count(), 3);
    }

    #[test]
    fn build_record_round_trips() {
        let fx = fixture();
        let build = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();

        let record = fs::read(fx.config.builds_dir.join("1").join("build.json")).unwrap();
        let reloaded: Build = serde_json::from_slice(&record).unwrap();
        assert_eq!(reloaded, build);
        assert_eq!(reloaded.package, "foo");
        assert_eq!(reloaded.version, "1.0");
        assert_eq!(reloaded.dists, vec!["stable", "testing"]);
        assert_eq!(reloaded.archs, vec!["amd64", "arm64"]);
    }

    #[test]
    fn fan_out_covers_every_dist_arch_pair() {
        let fx = fixture();
        let build = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();

        let mut pairs = Vec::new();
        for entry in fs::read_dir(&fx.config.queue_dir).unwrap() {
            let task: TaskDescriptor =
                serde_json::from_slice(&fs::read(entry.unwrap().path()).unwrap()).unwrap();
            assert_eq!(task.build_id, build.build_id);
            assert_eq!(task.package, "foo");
            assert_eq!(task.version, "1.0");
            assert_eq!(task.source_dir, build.source_dir);
            pairs.push((task.dist, task.arch));
        }
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("stable".to_string(), "amd64".to_string()),
                ("stable".to_string(), "arm64".to_string()),
                ("testing".to_string(), "amd64".to_string()),
                ("testing".to_string(), "arm64".to_string()),
            ]
        );
    }

    #[test]
    fn task_file_names_are_deterministic() {
        let fx = fixture();
        admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();
        assert!(fx.config.queue_dir.join("1_foo_1.0_stable_amd64.json").exists());
        assert!(fx.config.queue_dir.join("1_foo_1.0_testing_arm64.json").exists());
    }

    #[test]
    fn sequential_ids_strictly_increase() {
        let fx = fixture();
        let first = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();

        // Second submission of the same package: no dedup, fresh id.
        for file in &fx.manifest.files {
            fs::write(fx.config.incoming_dir.join(&file.name), b"x").unwrap();
        }
        fs::write(&fx.manifest_path, b"manifest body").unwrap();
        let second = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();

        assert_eq!(first.build_id, 1);
        assert_eq!(second.build_id, 2);
    }

    #[test]
    fn counter_survives_deleted_build_directories() {
        let fx = fixture();
        let first = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();
        assert_eq!(first.build_id, 1);

        // An operator archiving build 1 away must not cause id reuse.
        fs::remove_dir_all(fx.config.builds_dir.join("1")).unwrap();
        fs::write(&fx.manifest_path, b"manifest body").unwrap();
        for file in &fx.manifest.files {
            fs::write(fx.config.incoming_dir.join(&file.name), b"x").unwrap();
        }
        let second = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();
        assert_eq!(second.build_id, 2);
    }

    #[test]
    fn colliding_build_directory_is_a_storage_error() {
        let fx = fixture();
        fs::create_dir_all(&fx.config.builds_dir).unwrap();
        fs::write(fx.config.builds_dir.join(COUNTER_FILE), "7\n").unwrap();
        // A racing admitter already created the directory this allocation
        // computes. The loser must fail, never share the directory.
        fs::create_dir(fx.config.builds_dir.join("8")).unwrap();
        let err = BuildCounter::new(&fx.config.builds_dir).allocate().unwrap_err();
        assert!(matches!(err, GateError::Storage { .. }));
        assert!(err.to_string().contains("creating build directory"));
    }

    #[test]
    fn wiped_counter_falls_back_to_directory_count() {
        let fx = fixture();
        let first = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();
        assert_eq!(first.build_id, 1);

        fs::remove_file(fx.config.builds_dir.join(COUNTER_FILE)).unwrap();
        fs::write(&fx.manifest_path, b"manifest body").unwrap();
        for file in &fx.manifest.files {
            fs::write(fx.config.incoming_dir.join(&file.name), b"x").unwrap();
        }
        let second = admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();
        assert_eq!(second.build_id, 2);
    }

    #[cfg(unix)]
    #[test]
    fn build_directory_is_world_writable() {
        use std::os::unix::fs::PermissionsExt;
        let fx = fixture();
        admit(&fx.manifest, &fx.manifest_path, &fx.config).unwrap();
        let mode = fs::metadata(fx.config.builds_dir.join("1"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o777);
    }
}
