//! # buildgate -- signed package-submission admission gate
//!
//! buildgate watches an incoming directory for signed submission bundles
//! (a `*.changes` manifest plus the artifact files it references),
//! verifies their authenticity and integrity, and admits verified bundles
//! into a build pipeline: each accepted manifest gets a unique build id,
//! its files are moved into immutable per-build storage, and one task
//! descriptor per (distribution, architecture) pair is written for a
//! downstream build executor. Submitters are notified of acceptance.
//!
//! ## Security Properties
//!
//! - **`#![forbid(unsafe_code)]`**: no `unsafe` blocks anywhere.
//! - **Delegated signature verification**: the gate never verifies
//!   signatures in-process; an external oracle (`gpgv`) is invoked and
//!   only its exit status is trusted. The gate's only in-process
//!   cryptographic operation is SHA-256 hashing via the `sha2` crate.
//! - **Defensive input handling**: manifests and config are read through
//!   [`fs_guard`] (symlink-refused, size-bounded); referenced file names
//!   are confined to the watch directory at the parse boundary.
//! - **Hard gates**: a submission failing any gate is skipped and logged;
//!   it can never corrupt another submission's admission or the sweep.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`fs_guard`] | Symlink-safe, size-bounded file access |
//! | [`error`] | Gate error taxonomy |
//! | [`config`] | Instance configuration |
//! | [`manifest`] | Changes-manifest parsing into typed records |
//! | [`checksum`] | Per-artifact size and SHA-256 verification |
//! | [`signature`] | External signature oracle |
//! | [`admit`] | Build-id allocation, relocation, task fan-out |
//! | [`notify`] | Acceptance mail composition and dispatch |
//! | [`scan`] | The single-pass incoming sweep |
//! | [`toolcheck`] | External tool availability probing |

#![forbid(unsafe_code)]

/// Symlink-safe, size-bounded file access. Single source of truth for all
/// untrusted file I/O in the gate.
pub mod fs_guard;

/// Error taxonomy: one variant per way a candidate manifest can fail.
pub mod error;

/// Instance configuration: identity, directory layout, fan-out matrix.
pub mod config;

/// Changes-manifest parsing. Maps the loosely-typed key/value document
/// into typed records at one boundary.
pub mod manifest;

/// Per-artifact integrity verification: exact size match and SHA-256
/// digest recomputation, accumulating every discrepancy.
pub mod checksum;

/// Signature verification, delegated to an external oracle process.
pub mod signature;

/// The admission core: build-id allocation, atomic artifact relocation,
/// build-record persistence, and task-descriptor fan-out.
pub mod admit;

/// Acceptance notifications via `sendmail -t`, fire-and-forget.
pub mod notify;

/// The single-pass incoming sweep driving all gates in order.
pub mod scan;

/// Probes for the external tools the gate delegates to.
pub mod toolcheck;
