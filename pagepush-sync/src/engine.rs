//! The push engine: pending-change detection, commit and push, and bounded
//! recovery from rejected pushes.
//!
//! One engine owns one repository. Every public operation takes the engine's
//! lane lock for its whole duration, so git commands against the checkout
//! never interleave. The recovery counter lives on the engine and is shared by
//! every caller; it returns to zero whenever a push cycle ends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use pagepush_core::{
    config::MAX_RETRY_ATTEMPTS, BranchName, ChangeSet, Config, PushAttempt, PushOutcome,
    PushTarget, RemoteName,
};

use crate::error::SyncError;
use crate::force_sync::{self, ForceSyncReport};
use crate::hook::RegenerationHook;
use crate::vcs::{GitCli, VcsClient};

/// Tunables for [`GitSyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Remote to push to; `None` picks the first configured remote.
    pub remote: Option<RemoteName>,
    /// Branch to push; `None` uses the checked-out branch.
    pub branch: Option<BranchName>,
    pub max_retry_attempts: u32,
    /// Pause between regeneration and the retried push.
    pub settle_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            remote: None,
            branch: None,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            settle_delay: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            remote: config.repository.remote.clone(),
            branch: config.repository.branch.clone(),
            max_retry_attempts: config.push.max_retry_attempts,
            settle_delay: config.push.settle_delay(),
        }
    }
}

/// Read-only view of the repository for `pagepush --validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub branch: Option<BranchName>,
    pub remotes: Vec<RemoteName>,
    pub target: Option<PushTarget>,
    pub changes: ChangeSet,
    /// Conditions worth a look that do not make the checkout unusable.
    pub warnings: Vec<String>,
}

pub struct GitSyncEngine {
    vcs: Box<dyn VcsClient>,
    hook: Box<dyn RegenerationHook>,
    settings: EngineSettings,
    attempts: AtomicU32,
    lane: Mutex<()>,
}

impl GitSyncEngine {
    pub fn new(
        vcs: Box<dyn VcsClient>,
        hook: Box<dyn RegenerationHook>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            vcs,
            hook,
            settings,
            attempts: AtomicU32::new(0),
            lane: Mutex::new(()),
        }
    }

    /// Engine over the configured checkout using the `git` binary.
    ///
    /// Fails fast when `repository.path` is not a git working copy.
    pub fn open(config: &Config, hook: Box<dyn RegenerationHook>) -> Result<Self, SyncError> {
        let handle = config.repository_handle()?;
        Ok(Self::new(
            Box::new(GitCli::new(&handle)),
            hook,
            EngineSettings::from(config),
        ))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Recovery rounds used by the push cycle in progress.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Whether anything needs pushing.
    pub fn has_pending_changes(&self) -> Result<ChangeSet, SyncError> {
        let _lane = self.lane();
        self.pending()
    }

    /// Commit pending work and push it, recovering from a diverged remote.
    ///
    /// Never fails: every problem is folded into the returned outcome and
    /// logged with the failing command, directory and stderr.
    pub fn push(&self, commit_message: &str) -> PushAttempt {
        let _lane = self.lane();
        let started_at = Utc::now();
        let mut recoveries = 0;

        let outcome = self.push_cycle(commit_message, &mut recoveries);
        self.attempts.store(0, Ordering::SeqCst);

        match &outcome {
            PushOutcome::Success | PushOutcome::RejectedRecovered { .. } => {
                tracing::info!("push finished: {outcome}")
            }
            PushOutcome::NoChanges => tracing::info!("no changes to push"),
            PushOutcome::RejectedExhausted { .. } | PushOutcome::FatalError { .. } => {
                tracing::error!("push failed: {outcome}")
            }
        }

        PushAttempt {
            attempt_number: recoveries + 1,
            commit_message: commit_message.to_string(),
            started_at,
            outcome,
        }
    }

    /// Reset the checkout to the remote tip, then regenerate content.
    pub fn force_sync(&self) -> Result<ForceSyncReport, SyncError> {
        let _lane = self.lane();
        let target = self.resolve_target()?;
        let report = force_sync::run(self.vcs.as_ref(), &target)?;
        self.hook.regenerate()?;
        Ok(report)
    }

    /// Read-only health check.
    ///
    /// Fails only when `git status` cannot run in the checkout. A detached
    /// HEAD, an empty history or a missing remote come back as warnings.
    pub fn validate(&self) -> Result<HealthReport, SyncError> {
        let _lane = self.lane();
        self.vcs.status_porcelain()?;
        let mut warnings = Vec::new();

        let branch = match self.vcs.current_branch() {
            Ok(Some(branch)) => Some(branch),
            Ok(None) => {
                warnings.push("HEAD is detached".to_string());
                None
            }
            Err(err) => {
                warnings.push(format!("cannot determine the current branch: {err}"));
                None
            }
        };
        match self.vcs.has_head() {
            Ok(true) => {}
            Ok(false) => warnings.push("repository has no commits yet".to_string()),
            Err(err) => warnings.push(format!("cannot resolve HEAD: {err}")),
        }
        let remotes = match self.vcs.remotes() {
            Ok(remotes) => remotes,
            Err(err) => {
                warnings.push(format!("cannot list remotes: {err}"));
                Vec::new()
            }
        };
        if remotes.is_empty() {
            warnings.push("no remote configured; manual remote setup is required".to_string());
        } else if let Some(wanted) = &self.settings.remote {
            if !remotes.contains(wanted) {
                warnings.push(format!("configured remote `{wanted}` does not exist"));
            }
        }

        let target = self.resolve_target().ok();
        let changes = match self.pending() {
            Ok(changes) => changes,
            Err(err) => {
                warnings.push(format!("cannot compare with the remote: {err}"));
                ChangeSet::idle()
            }
        };

        for warning in &warnings {
            tracing::warn!("{}: {warning}", self.vcs.workdir().display());
        }
        Ok(HealthReport {
            branch,
            remotes,
            target,
            changes,
            warnings,
        })
    }

    fn lane(&self) -> MutexGuard<'_, ()> {
        self.lane.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pending(&self) -> Result<ChangeSet, SyncError> {
        if !self.vcs.status_porcelain()?.trim().is_empty() {
            let mut changes = ChangeSet::local_changes();
            changes.target = self.resolve_target().ok();
            return Ok(changes);
        }

        let target = match self.resolve_target() {
            Ok(target) => target,
            Err(SyncError::DetachedHead) => {
                tracing::info!("HEAD is detached; nothing to push");
                return Ok(ChangeSet::idle());
            }
            Err(SyncError::NoRemote) => {
                if self.vcs.has_head()? {
                    tracing::warn!(
                        "{} has commits but no usable remote; manual remote setup is required",
                        self.vcs.workdir().display()
                    );
                }
                return Ok(ChangeSet::idle());
            }
            Err(err) => return Err(err),
        };

        let mut changes = ChangeSet::idle();
        if self.vcs.remote_branch_exists(&target)? {
            let (ahead, _behind) = self.vcs.ahead_behind(&target)?;
            changes.ahead_count = Some(ahead);
        } else {
            tracing::info!("{target} does not exist yet; first publish");
            changes.remote_branch_missing = true;
        }
        changes.target = Some(target);
        Ok(changes)
    }

    fn resolve_target(&self) -> Result<PushTarget, SyncError> {
        let branch = match &self.settings.branch {
            Some(branch) => branch.clone(),
            None => self.vcs.current_branch()?.ok_or(SyncError::DetachedHead)?,
        };

        let remotes = self.vcs.remotes()?;
        let remote = match &self.settings.remote {
            Some(wanted) if remotes.contains(wanted) => wanted.clone(),
            Some(wanted) => {
                tracing::warn!("configured remote `{wanted}` does not exist");
                return Err(SyncError::NoRemote);
            }
            None => remotes.into_iter().next().ok_or(SyncError::NoRemote)?,
        };

        Ok(PushTarget { remote, branch })
    }

    fn push_cycle(&self, message: &str, recoveries: &mut u32) -> PushOutcome {
        loop {
            let changes = match self.pending() {
                Ok(changes) => changes,
                Err(err) => return fatal("could not inspect repository", err),
            };
            if !changes.push_needed() {
                return match *recoveries {
                    0 => PushOutcome::NoChanges,
                    n => PushOutcome::RejectedRecovered { recoveries: n },
                };
            }

            if changes.has_local_changes {
                if let Err(err) = self.commit_all(message) {
                    return fatal("commit failed", err);
                }
            }

            let target = match changes.target {
                Some(target) => target,
                None => match self.resolve_target() {
                    Ok(target) => target,
                    Err(err) => return fatal("no push target", err),
                },
            };

            let err = match self.vcs.push(&target) {
                Ok(()) => {
                    return match *recoveries {
                        0 => PushOutcome::Success,
                        n => PushOutcome::RejectedRecovered { recoveries: n },
                    };
                }
                Err(err) => err,
            };

            if !err.is_diverged() {
                return fatal("push failed", err.into());
            }

            let used = self.attempts.load(Ordering::SeqCst);
            if used >= self.settings.max_retry_attempts {
                return PushOutcome::RejectedExhausted {
                    reason: format!("push to {target} still rejected after {used} recovery round(s)"),
                };
            }
            let round = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            *recoveries += 1;
            tracing::warn!(
                "push to {target} rejected, remote has diverged (recovery {round}/{}): {err}",
                self.settings.max_retry_attempts
            );

            if let Err(reason) = self.recover(&target) {
                return PushOutcome::RejectedExhausted { reason };
            }
            if !self.settings.settle_delay.is_zero() {
                std::thread::sleep(self.settings.settle_delay);
            }
        }
    }

    /// Pull, escalating to force-sync, then regenerate.
    fn recover(&self, target: &PushTarget) -> Result<(), String> {
        match self.vcs.pull(target) {
            Ok(()) => tracing::info!("pulled {target}"),
            Err(err) => {
                tracing::warn!("pull from {target} failed, escalating to force-sync: {err}");
                force_sync::run(self.vcs.as_ref(), target)
                    .map_err(|err| format!("force-sync failed: {err}"))?;
            }
        }

        self.hook.regenerate().map_err(|err| {
            tracing::error!("regeneration failed during recovery: {err}");
            format!("regeneration failed: {err}")
        })
    }

    fn commit_all(&self, message: &str) -> Result<(), SyncError> {
        self.vcs.stage_all()?;
        self.vcs.commit(message)?;
        tracing::info!("committed: {message}");
        Ok(())
    }
}

fn fatal(context: &str, err: SyncError) -> PushOutcome {
    PushOutcome::FatalError {
        reason: format!("{context}: {err}"),
    }
}
