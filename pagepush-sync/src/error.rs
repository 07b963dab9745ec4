//! Error types for pagepush-sync.

use std::path::PathBuf;

use thiserror::Error;

use pagepush_core::ConfigError;

/// Stderr fragments git prints when the remote has commits we lack.
const DIVERGED_SIGNATURES: &[&str] = &[
    "non-fast-forward",
    "fetch first",
    "Updates were rejected because",
];

/// A failed `git` subprocess.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The `git` binary could not be started at all.
    #[error("failed to run `git {command}` in {cwd}: {source}")]
    Spawn {
        command: String,
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `git` ran and exited non-zero.
    #[error("`git {command}` failed in {cwd} ({status}): {stderr}")]
    Failed {
        command: String,
        cwd: PathBuf,
        status: String,
        stderr: String,
    },

    /// `git` succeeded but printed something we could not interpret.
    #[error("unexpected output from `git {command}`: {output:?}")]
    Parse { command: String, output: String },
}

impl VcsError {
    /// `true` when a push was rejected because local and remote histories
    /// diverged. Only this class of failure is worth a pull-and-retry.
    pub fn is_diverged(&self) -> bool {
        match self {
            VcsError::Failed { stderr, .. } => {
                DIVERGED_SIGNATURES.iter().any(|sig| stderr.contains(sig))
            }
            _ => false,
        }
    }

    pub fn stderr(&self) -> Option<&str> {
        match self {
            VcsError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("repository has no remote configured; add one with `git remote add`")]
    NoRemote,

    #[error("HEAD is detached; check out a branch before syncing")]
    DetachedHead,

    #[error("local branch did not converge with {target}: {ahead} ahead, {behind} behind")]
    NotConverged {
        target: String,
        ahead: u32,
        behind: u32,
    },

    #[error("HEAD {head} does not match {target} at {remote}")]
    TipMismatch {
        target: String,
        head: String,
        remote: String,
    },

    #[error("content regeneration failed: {0}")]
    Hook(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn failed(stderr: &str) -> VcsError {
        VcsError::Failed {
            command: "push --set-upstream origin main".into(),
            cwd: PathBuf::from("/srv/site"),
            status: "exit status: 1".into(),
            stderr: stderr.into(),
        }
    }

    #[rstest]
    #[case::fetch_first(" ! [rejected]        main -> main (fetch first)\nerror: failed to push some refs", true)]
    #[case::non_fast_forward("! [rejected] main -> main (non-fast-forward)", true)]
    #[case::hint("hint: Updates were rejected because the tip of your current branch is behind", true)]
    #[case::auth("remote: Permission to me/site.git denied to bot.\nfatal: unable to access", false)]
    #[case::network("fatal: Could not read from remote repository.", false)]
    fn divergence_is_read_from_stderr(#[case] stderr: &str, #[case] diverged: bool) {
        assert_eq!(failed(stderr).is_diverged(), diverged);
    }

    #[test]
    fn spawn_failure_is_not_diverged() {
        let err = VcsError::Spawn {
            command: "status --porcelain".into(),
            cwd: PathBuf::from("/srv/site"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "git not found"),
        };
        assert!(!err.is_diverged());
    }

    #[test]
    fn failure_message_names_command_and_directory() {
        let msg = failed("fatal: boom").to_string();
        assert!(msg.contains("git push --set-upstream origin main"));
        assert!(msg.contains("/srv/site"));
        assert!(msg.contains("fatal: boom"));
    }
}
