//! Destructive reset of the working copy to the remote tip.
//!
//! Steps, in order:
//! 1. Backup branch at HEAD (best-effort).
//! 2. Abort any in-progress merge or rebase (best-effort).
//! 3. Fetch the remote with prune.
//! 4. Check out the branch at the fetched remote tip and hard reset.
//! 5. Remove untracked files and directories (best-effort).
//! 6. Verify convergence.
//!
//! Failures in 3, 4 and 6 abort; the others are only logged. Regeneration is
//! the caller's job.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pagepush_core::PushTarget;

use crate::error::SyncError;
use crate::vcs::VcsClient;

pub const BACKUP_BRANCH_PREFIX: &str = "pagepush-backup-";

/// What a completed force-sync did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForceSyncReport {
    pub target: PushTarget,
    /// Side branch holding the pre-sync HEAD, when one could be created.
    pub backup_branch: Option<String>,
    pub previous_head: Option<String>,
    /// HEAD after the reset; equals the remote tip.
    pub head: String,
}

/// `pagepush-backup-20250606-190000`
pub fn backup_branch_name(now: DateTime<Utc>) -> String {
    format!("{BACKUP_BRANCH_PREFIX}{}", now.format("%Y%m%d-%H%M%S"))
}

pub(crate) fn run(vcs: &dyn VcsClient, target: &PushTarget) -> Result<ForceSyncReport, SyncError> {
    tracing::warn!(
        "force-syncing {} to {target}; local-only commits go to a backup branch",
        vcs.workdir().display()
    );

    let previous_head = vcs.rev_parse("HEAD").ok();
    let backup_branch = previous_head.as_ref().and_then(|head| {
        let name = backup_branch_name(Utc::now());
        match vcs.create_branch(&name) {
            Ok(()) => {
                tracing::info!("backed up {head} to branch {name}");
                Some(name)
            }
            Err(err) => {
                tracing::warn!("could not create backup branch {name}: {err}");
                None
            }
        }
    });

    if let Err(err) = vcs.abort_merge() {
        tracing::debug!("merge --abort: {err}");
    }
    if let Err(err) = vcs.abort_rebase() {
        tracing::debug!("rebase --abort: {err}");
    }

    vcs.fetch_prune(&target.remote).map_err(|err| {
        tracing::error!("force-sync fetch failed: {err}");
        err
    })?;
    vcs.checkout_tracking(target).map_err(|err| {
        tracing::error!("force-sync checkout of {target} failed: {err}");
        err
    })?;
    vcs.reset_hard(&target.tracking_ref()).map_err(|err| {
        tracing::error!("force-sync reset to {target} failed: {err}");
        err
    })?;

    if let Err(err) = vcs.clean_untracked() {
        tracing::warn!("could not remove untracked files: {err}");
    }

    let head = verify(vcs, target)?;
    tracing::info!("force-sync complete: HEAD is {head} ({target})");

    Ok(ForceSyncReport {
        target: target.clone(),
        backup_branch,
        previous_head,
        head,
    })
}

/// Zero ahead, zero behind, and HEAD at the remote tip.
fn verify(vcs: &dyn VcsClient, target: &PushTarget) -> Result<String, SyncError> {
    let (ahead, behind) = vcs.ahead_behind(target)?;
    if ahead != 0 || behind != 0 {
        return Err(SyncError::NotConverged {
            target: target.to_string(),
            ahead,
            behind,
        });
    }

    let head = vcs.rev_parse("HEAD")?;
    let remote = vcs.rev_parse(&target.tracking_ref())?;
    if head != remote {
        return Err(SyncError::TipMismatch {
            target: target.to_string(),
            head,
            remote,
        });
    }
    Ok(head)
}
