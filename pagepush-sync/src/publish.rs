//! Detector-gated artifact publishing into the repository checkout.
//!
//! ## `publish_artifact` protocol
//!
//! 1. Read the artifact source (missing → `SourceMissing`, not fatal).
//! 2. Ask the [`ChangeDetector`] whether the destination should change.
//! 3. Skip on `Keep`; report `WouldWrite` in dry-run mode.
//! 4. Write to a temp file under `<repo>/.git/pagepush/` (a
//!    `<destination>.pagepush.tmp` sibling when there is no `.git` directory).
//! 5. Rename to the destination (atomic on POSIX).
//!
//! The temp file stays outside the work tree, so a concurrent `git add --all`
//! or `git clean` in the push lane never sees a half-written artifact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use pagepush_core::{Artifact, Config};
use pagepush_detector::{ChangeDetector, Decision};

use crate::error::{io_err, SyncError};

/// Outcome of publishing one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum WriteResult {
    /// Destination was (re)written.
    Written { path: PathBuf, reason: String },
    /// Destination already carries this content.
    Unchanged { path: PathBuf },
    /// Dry-run: the destination *would* have been written.
    WouldWrite { path: PathBuf, reason: String },
    /// The producer has not written the source yet.
    SourceMissing { source: PathBuf },
}

impl WriteResult {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }
}

/// Publish a single artifact of `config`.
pub fn publish_artifact(
    config: &Config,
    artifact: &Artifact,
    detector: &ChangeDetector,
    dry_run: bool,
) -> Result<WriteResult, SyncError> {
    let destination = config.destination_path(artifact);

    let content = match std::fs::read_to_string(&artifact.source) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!("artifact source {} does not exist yet", artifact.source.display());
            return Ok(WriteResult::SourceMissing {
                source: artifact.source.clone(),
            });
        }
        Err(err) => return Err(io_err(&artifact.source, err)),
    };

    let reason = match detector.decide(&destination, &content) {
        Decision::Keep => {
            tracing::debug!("unchanged: {}", destination.display());
            return Ok(WriteResult::Unchanged { path: destination });
        }
        Decision::Update(reason) => reason.to_string(),
    };

    if dry_run {
        tracing::info!("[dry-run] would write: {}", destination.display());
        return Ok(WriteResult::WouldWrite {
            path: destination,
            reason,
        });
    }

    atomic_write_with_tmp(&destination, &content, &tmp_path_for(config, artifact))?;
    tracing::info!("wrote: {} ({reason})", destination.display());
    Ok(WriteResult::Written {
        path: destination,
        reason,
    })
}

/// Publish every configured artifact. A missing source does not stop the
/// others; I/O failures do.
pub fn publish_all(
    config: &Config,
    detector: &ChangeDetector,
    dry_run: bool,
) -> Result<Vec<WriteResult>, SyncError> {
    config
        .artifacts
        .iter()
        .map(|artifact| publish_artifact(config, artifact, detector, dry_run))
        .collect()
}

/// Temp file used while writing `artifact` into the checkout.
fn tmp_path_for(config: &Config, artifact: &Artifact) -> PathBuf {
    let git_dir = config.repository.path.join(".git");
    if git_dir.is_dir() {
        let flat = artifact
            .destination
            .to_string_lossy()
            .replace(['/', '\\'], "__");
        return git_dir.join("pagepush").join(format!("{flat}.tmp"));
    }
    // Worktrees and submodules have a `.git` file; fall back to a sibling.
    PathBuf::from(format!(
        "{}.pagepush.tmp",
        config.destination_path(artifact).display()
    ))
}

/// Write `content` to `path` through `tmp` and a rename.
///
/// Content is written byte for byte; line endings are left alone.
fn atomic_write_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
