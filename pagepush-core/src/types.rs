//! Domain types shared by the detector, sync engine, daemon and CLI.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed git remote name (e.g. `origin`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteName(pub String);

impl fmt::Display for RemoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RemoteName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed local branch name (e.g. `main`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchName(pub String);

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for BranchName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BranchName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Repository handle
// ---------------------------------------------------------------------------

/// A validated local working copy of the publish repository.
///
/// Construction fails fast when the directory or its `.git` metadata is
/// missing; pagepush never initializes a repository implicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    path: PathBuf,
}

impl RepositoryHandle {
    /// Open the working copy at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let handle = Self { path: path.into() };
        handle.check()?;
        Ok(handle)
    }

    /// Re-verify that the directory and its git metadata still exist.
    pub fn check(&self) -> Result<(), ConfigError> {
        if !self.path.is_dir() {
            return Err(ConfigError::RepositoryMissing {
                path: self.path.clone(),
            });
        }
        // `.git` is a file for worktrees and submodules, so only presence matters.
        if !self.path.join(".git").exists() {
            return Err(ConfigError::NotAGitRepository {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Change detection result
// ---------------------------------------------------------------------------

/// Where a push goes: one remote and one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTarget {
    pub remote: RemoteName,
    pub branch: BranchName,
}

impl PushTarget {
    /// `<remote>/<branch>`, the remote-tracking ref name.
    pub fn tracking_ref(&self) -> String {
        format!("{}/{}", self.remote.0, self.branch.0)
    }
}

impl fmt::Display for PushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tracking_ref())
    }
}

/// Result of asking the repository whether anything needs publishing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Working tree or index differs from HEAD.
    pub has_local_changes: bool,
    /// Commits on HEAD not reachable from the remote branch, when known.
    pub ahead_count: Option<u32>,
    /// The remote exists but has no branch of this name yet (first publish).
    pub remote_branch_missing: bool,
    /// Resolved target, when the checks got far enough to determine it.
    pub target: Option<PushTarget>,
}

impl ChangeSet {
    /// Nothing to push and nothing actionable.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Uncommitted work in the working tree.
    pub fn local_changes() -> Self {
        Self {
            has_local_changes: true,
            ..Self::default()
        }
    }

    pub fn push_needed(&self) -> bool {
        self.has_local_changes
            || self.ahead_count.map(|n| n > 0).unwrap_or(false)
            || self.remote_branch_missing
    }
}

// ---------------------------------------------------------------------------
// Push attempts
// ---------------------------------------------------------------------------

/// Terminal outcome of one push-with-recovery cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum PushOutcome {
    /// Pushed on the first try.
    Success,
    /// Nothing pending; no git mutation happened.
    NoChanges,
    /// Pushed after `recoveries` pull or force-sync rounds.
    RejectedRecovered { recoveries: u32 },
    /// The remote kept diverging, or a recovery step failed.
    RejectedExhausted { reason: String },
    /// Non-recoverable failure (commit failure, auth, network, broken repo).
    FatalError { reason: String },
}

impl PushOutcome {
    /// `true` for outcomes that leave the remote up to date.
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            PushOutcome::Success | PushOutcome::NoChanges | PushOutcome::RejectedRecovered { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PushOutcome::Success => "success",
            PushOutcome::NoChanges => "no-changes",
            PushOutcome::RejectedRecovered { .. } => "rejected-recovered",
            PushOutcome::RejectedExhausted { .. } => "rejected-exhausted",
            PushOutcome::FatalError { .. } => "fatal-error",
        }
    }
}

impl fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushOutcome::RejectedRecovered { recoveries } => {
                write!(f, "{} after {recoveries} recovery round(s)", self.label())
            }
            PushOutcome::RejectedExhausted { reason } | PushOutcome::FatalError { reason } => {
                write!(f, "{}: {reason}", self.label())
            }
            _ => f.write_str(self.label()),
        }
    }
}

/// One push cycle as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAttempt {
    /// 1-based number of the push attempt that produced `outcome`.
    pub attempt_number: u32,
    pub commit_message: String,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: PushOutcome,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
