//! Dry-run unified diff support for `pagepush publish --diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use pagepush_core::Config;
use pagepush_detector::{ChangeDetector, Decision};

use crate::{error::io_err, SyncError};

/// What publishing one artifact would change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDiff {
    pub destination: PathBuf,
    /// Why the detector wants to update.
    pub reason: String,
    pub unified_diff: String,
}

/// Compare every artifact source with its published copy.
///
/// No files are written. Artifacts the detector would keep, whose source is
/// missing, or whose text is identical (a metadata-only refresh) are omitted.
pub fn diff_artifacts(
    config: &Config,
    detector: &ChangeDetector,
) -> Result<Vec<ArtifactDiff>, SyncError> {
    let mut diffs = Vec::new();
    for artifact in &config.artifacts {
        let Some(next) = read_or_none(&artifact.source)? else {
            continue;
        };
        let destination = config.destination_path(artifact);

        let reason = match detector.decide(&destination, &next) {
            Decision::Keep => continue,
            Decision::Update(reason) => reason.to_string(),
        };

        let existing = read_or_none(&destination)?.unwrap_or_default();
        if existing == next {
            continue;
        }

        let relative = artifact.destination.display();
        let old_header = format!("a/{relative}");
        let new_header = format!("b/{relative}");
        let unified = TextDiff::from_lines(&existing, &next)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();

        diffs.push(ArtifactDiff {
            destination,
            reason,
            unified_diff: unified,
        });
    }
    Ok(diffs)
}

fn read_or_none(path: &Path) -> Result<Option<String>, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}
