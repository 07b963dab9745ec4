//! Shared publish entrypoint used by the CLI and the daemon.

use std::path::Path;

use pagepush_core::{Artifact, Config};
use pagepush_detector::{ChangeDetector, FreshnessPolicy};

use crate::publish::{publish_all, publish_artifact, WriteResult};
use crate::SyncError;

/// Detector configured from `freshness`.
pub fn detector_for(config: &Config) -> ChangeDetector {
    ChangeDetector::new(FreshnessPolicy::from(&config.freshness))
}

/// Commit message used for an automatic push of one artifact.
pub fn commit_message_for(artifact: &Artifact) -> String {
    format!("Automated update of {}", artifact.destination.display())
}

/// Commit message covering every artifact written by a [`run`].
///
/// Destinations are listed in config order; with nothing written the message
/// is plain "Automated update".
pub fn commit_message_for_written(config: &Config, results: &[WriteResult]) -> String {
    let destinations: Vec<String> = config
        .artifacts
        .iter()
        .zip(results)
        .filter(|(_, result)| result.is_written())
        .map(|(artifact, _)| artifact.destination.display().to_string())
        .collect();

    if destinations.is_empty() {
        return "Automated update".to_string();
    }
    format!("Automated update of {}", destinations.join(", "))
}

/// Publish every artifact in `config`.
///
/// This is the canonical entrypoint for both `pagepush publish` and the
/// daemon's startup pass.
pub fn run(config: &Config, dry_run: bool) -> Result<Vec<WriteResult>, SyncError> {
    publish_all(config, &detector_for(config), dry_run)
}

/// Publish the artifacts whose source is `changed`.
///
/// Returns each artifact that was written with the commit message for it.
pub fn publish_changed(
    config: &Config,
    changed: &Path,
) -> Result<Vec<(WriteResult, String)>, SyncError> {
    let detector = detector_for(config);
    let mut written = Vec::new();
    for artifact in config.artifacts.iter().filter(|a| a.source == changed) {
        let result = publish_artifact(config, artifact, &detector, false)?;
        if result.is_written() {
            written.push((result, commit_message_for(artifact)));
        }
    }
    Ok(written)
}
